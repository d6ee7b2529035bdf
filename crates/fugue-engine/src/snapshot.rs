//! Whole-session snapshot and restore with BLAKE3 hashing.
//!
//! [`SessionSnapshot`] captures everything resumability needs: the clock and
//! pending events (inside the queue snapshot), the full world graph, the
//! ledger with its audit log, both history stacks (commands and undo tokens
//! are plain data, so they serialize), the adversary's phase and
//! construction state, and the terminal flag. A BLAKE3 hex digest over the
//! serialized state catches corruption on restore.
//!
//! The narration log is deliberately *not* captured: records are an
//! outbound stream the presentation layer drains, not session state.

use serde::{Deserialize, Serialize};

use fugue_world::entity::EntityId;
use fugue_world::graph::WorldGraph;
use fugue_world::ledger::ResourceLedger;
use fugue_world::snapshot::WorldSnapshot;

use crate::history::{CommandHistory, HistorySnapshot};
use crate::narrate::NarrationLog;
use crate::queue::{EventQueue, QueueSnapshot};
use crate::scheduler::{AlterEgo, SchedulerSnapshot};
use crate::session::Session;
use crate::SnapshotError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The hashed portion of a snapshot. Omitting any field here would break
/// resumability, so the digest covers all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionState {
    world: WorldSnapshot,
    ledger: ResourceLedger,
    queue: QueueSnapshot,
    history: HistorySnapshot,
    scheduler: SchedulerSnapshot,
    actor: EntityId,
    terminal: bool,
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// A serializable capture of a whole session, integrity-checked on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    state: SessionState,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the serialized state.
    hash: String,
}

impl SessionSnapshot {
    /// Capture a running session.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Serialize`] if the state cannot be serialized
    /// (which would indicate a bug, not a user condition).
    pub fn capture(session: &Session) -> Result<Self, SnapshotError> {
        let state = SessionState {
            world: session.graph.snapshot(),
            ledger: session.ledger.clone(),
            queue: session.queue.snapshot(),
            history: session.history.snapshot(),
            scheduler: session.alter_ego.snapshot(),
            actor: session.actor,
            terminal: session.terminal,
        };
        let hash = hash_state(&state)?;
        Ok(Self { state, hash })
    }

    /// The integrity digest.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Rebuild a running session, verifying the digest first.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::HashMismatch`] if the stored digest does not match
    /// the recomputed one (the snapshot was altered or corrupted).
    pub fn restore(self) -> Result<Session, SnapshotError> {
        let computed = hash_state(&self.state)?;
        if computed != self.hash {
            return Err(SnapshotError::HashMismatch {
                expected: self.hash,
                computed,
            });
        }
        let SessionState {
            world,
            ledger,
            queue,
            history,
            scheduler,
            actor,
            terminal,
        } = self.state;
        Ok(Session {
            graph: WorldGraph::from_snapshot(world),
            ledger,
            queue: EventQueue::from_snapshot(queue),
            history: CommandHistory::from_snapshot(history),
            alter_ego: AlterEgo::from_snapshot(scheduler),
            log: NarrationLog::new(),
            actor,
            terminal,
        })
    }
}

fn hash_state(state: &SessionState) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(state)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::GameDuration;
    use crate::command::Command;
    use crate::session::SessionConfig;
    use fugue_world::graph::{EntityProto, Scope};

    fn running_session() -> Session {
        let mut graph = WorldGraph::new();
        let flat = graph
            .spawn(EntityProto::container("flat", None), None)
            .unwrap();
        let main = graph.spawn(EntityProto::location("main"), Some(flat)).unwrap();
        let bedroom = graph
            .spawn(EntityProto::location("bedroom"), Some(flat))
            .unwrap();
        let toolbox = graph
            .spawn(EntityProto::openable("toolbox", None), Some(main)).unwrap();
        let me = graph
            .spawn(EntityProto::actor("me", Some(100)), Some(main))
            .unwrap();
        let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(main)).unwrap();

        let mut session =
            Session::new(graph, me, bedroom, toolbox, SessionConfig::default()).unwrap();
        session
            .install_stipend(25, GameDuration::days(14))
            .unwrap();
        session.perform(Command::take(lamp)).unwrap();
        session
    }

    #[test]
    fn capture_restore_round_trips_observable_state() {
        let mut original = running_session();
        original.drain_narration();

        let snapshot = SessionSnapshot::capture(&original).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let mut restored: Session = serde_json::from_str::<SessionSnapshot>(&json)
            .unwrap()
            .restore()
            .unwrap();

        assert_eq!(restored.now(), original.now());
        assert_eq!(restored.ledger(), original.ledger());
        assert_eq!(
            restored.queue().pending_len(),
            original.queue().pending_len()
        );
        assert_eq!(restored.history().undo_len(), 1);
        assert_eq!(restored.alter_ego().phase(), original.alter_ego().phase());

        // The restored history still works: undo puts the lamp back.
        let lamp = restored
            .graph()
            .find_first("lamp", Scope::Graph)
            .unwrap();
        restored.undo().unwrap();
        assert_ne!(
            restored.graph().parent(lamp).unwrap(),
            Some(restored.actor())
        );
    }

    #[test]
    fn tampered_snapshot_is_refused() {
        let original = running_session();
        let snapshot = SessionSnapshot::capture(&original).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        json["state"]["terminal"] = serde_json::Value::Bool(true);
        let tampered: SessionSnapshot = serde_json::from_value(json).unwrap();

        let err = tampered.restore().unwrap_err();
        assert!(matches!(err, SnapshotError::HashMismatch { .. }));
    }

    #[test]
    fn digest_is_stable_for_identical_state() {
        let original = running_session();
        let a = SessionSnapshot::capture(&original).unwrap();
        let b = SessionSnapshot::capture(&original).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
