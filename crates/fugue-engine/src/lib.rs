//! Fugue Engine -- the simulation core of a turn-structured interactive
//! fiction game.
//!
//! Two actors compete over the shared world in [`fugue_world`]: a player
//! issuing reversible [`Command`](command::Command)s through the
//! [`CommandPipeline`](pipeline::CommandPipeline), and an autonomous
//! adversary ([`AlterEgo`](scheduler::AlterEgo)) that acts only when the
//! player's vitality is exhausted. Between them sits a time-ordered
//! [`EventQueue`](queue::EventQueue) resolving scheduled deliveries against
//! the monotonic game [`Clock`](clock::Clock). A [`Session`](session::Session)
//! ties one playthrough together -- no globals, so tests run sessions side
//! by side.
//!
//! # Quick Start
//!
//! ```
//! use fugue_engine::prelude::*;
//! use fugue_world::prelude::*;
//!
//! let mut graph = WorldGraph::new();
//! let den = graph.spawn(EntityProto::location("den"), None).unwrap();
//! let shed = graph.spawn(EntityProto::location("shed"), None).unwrap();
//! let me = graph.spawn(EntityProto::actor("me", Some(100)), Some(den)).unwrap();
//! let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(den)).unwrap();
//!
//! let mut session = Session::new(graph, me, shed, den, SessionConfig::default()).unwrap();
//! let result = session.perform(Command::take(lamp)).unwrap();
//! assert!(result.success);
//!
//! session.undo().unwrap();
//! assert_ne!(session.graph().parent(lamp).unwrap(), Some(me));
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod command;
pub mod device;
pub mod history;
pub mod narrate;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod snapshot;

use clock::GameTime;
use queue::EventHandle;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the event queue and clock.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Scheduling requires a trigger strictly after the current clock.
    #[error("trigger {trigger} is not in the future of {now}")]
    NotInFuture { trigger: GameTime, now: GameTime },

    /// The clock only moves forward.
    #[error("cannot advance backward to {target} from {now}")]
    MovedBackward { target: GameTime, now: GameTime },

    /// The handle's event already fired or was already cancelled. Callers
    /// log and move on; this is never fatal.
    #[error("event {handle:?} was already resolved")]
    AlreadyResolved { handle: EventHandle },
}

/// Errors produced by reversing a command.
#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    /// Dependent state moved on: an event the command scheduled already
    /// fired, or an entity it touched was destroyed. The undo changed
    /// nothing; the history entry is discarded.
    #[error("cannot reverse `{label}`: {reason}")]
    Irreversible { label: String, reason: String },
}

/// Errors produced by the undo/redo stacks.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error(transparent)]
    Undo(#[from] UndoError),

    /// The redone command no longer passes its preconditions; it stays on
    /// the redo stack.
    #[error("redo failed: {message}")]
    RedoFailed { message: String },
}

/// Errors produced at the session boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The device is active. The session accepts nothing further.
    #[error("the device is active; the session is over")]
    Terminal,

    /// Sessions must be driven through an actor-capable entity.
    #[error("the controlling entity is not an actor")]
    NotAnActor,

    /// Not a known device component name.
    #[error("unknown device component `{0}`")]
    UnknownComponent(String),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors produced by session snapshot capture/restore.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The stored digest does not match the recomputed one.
    #[error("snapshot hash mismatch: stored {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{Clock, GameDuration, GameTime};
    pub use crate::command::{Command, CommandResult, Effect, Precondition};
    pub use crate::device::{ComponentStatus, ConstructionState, COMPONENTS};
    pub use crate::history::{CommandHistory, HistoryEntry};
    pub use crate::narrate::{Narration, NarrationLog};
    pub use crate::pipeline::{BatchOutcome, CommandPipeline, UndoToken};
    pub use crate::queue::{EventHandle, EventPayload, EventQueue};
    pub use crate::scheduler::{AlterEgo, TURN_DURATION};
    pub use crate::session::{Session, SessionConfig};
    pub use crate::snapshot::SessionSnapshot;
    pub use crate::{HistoryError, QueueError, SessionError, SnapshotError, UndoError};
}
