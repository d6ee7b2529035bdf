//! One game session: the explicit simulation context.
//!
//! A [`Session`] owns the world graph, ledger, event queue, history,
//! narration log and adversary for one playthrough -- there is no ambient
//! global state, so tests run as many independent sessions as they like.
//!
//! The per-turn control flow lives in [`Session::perform`]: execute the
//! command through the pipeline (which advances the clock by the command's
//! time cost and resolves due events on the way), record the reversible
//! outcome in history, and then -- strictly after all event firings -- hand
//! the adversary exactly one turn if the command left vitality at zero.
//! Waking up restores vitality, otherwise the zero edge would re-trigger on
//! the next command and "exactly once per edge" would mean nothing.
//!
//! Once the adversary activates its device the session is terminal: every
//! further command, undo or redo is refused with
//! [`SessionError::Terminal`](crate::SessionError::Terminal).

use tracing::debug;

use fugue_world::entity::EntityId;
use fugue_world::graph::{Scope, WorldGraph};
use fugue_world::ledger::ResourceLedger;

use crate::clock::{GameDuration, GameTime};
use crate::command::{Command, CommandResult};
use crate::device::COMPONENTS;
use crate::history::{CommandHistory, HistoryEntry};
use crate::narrate::{Narration, NarrationLog};
use crate::pipeline::{BatchOutcome, CommandPipeline};
use crate::queue::{EventHandle, EventPayload, EventQueue};
use crate::scheduler::AlterEgo;
use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables fixed at session creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum undoable entries before the oldest is evicted.
    pub history_depth: usize,
    /// Where the clock starts.
    pub start_time: GameTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_depth: 50,
            start_time: GameTime::EPOCH,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running game: shared world state, both actors, and the glue between
/// them. See the module docs for the turn order.
#[derive(Debug)]
pub struct Session {
    pub(crate) graph: WorldGraph,
    pub(crate) ledger: ResourceLedger,
    pub(crate) queue: EventQueue,
    pub(crate) history: CommandHistory,
    pub(crate) alter_ego: AlterEgo,
    pub(crate) log: NarrationLog,
    pub(crate) actor: EntityId,
    pub(crate) terminal: bool,
}

impl Session {
    /// Start a session over a prepared world.
    ///
    /// `actor` is the player entity; `build_site` is the location the
    /// adversary assembles in (and the barricade stall watches); and
    /// `supply_drop` is where its orders are delivered.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAnActor`] if `actor` lacks the actor capability.
    pub fn new(
        graph: WorldGraph,
        actor: EntityId,
        build_site: EntityId,
        supply_drop: EntityId,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if !graph.caps(actor).map(|c| c.actor).unwrap_or(false) {
            return Err(SessionError::NotAnActor);
        }
        Ok(Self {
            graph,
            ledger: ResourceLedger::new(),
            queue: EventQueue::starting_at(config.start_time),
            history: CommandHistory::new(config.history_depth),
            alter_ego: AlterEgo::new(build_site, supply_drop),
            log: NarrationLog::new(),
            actor,
            terminal: false,
        })
    }

    // -- accessors ----------------------------------------------------------

    /// The shared world graph.
    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    /// Mutable world access for setup and tests. Live gameplay mutation goes
    /// through [`perform`](Self::perform).
    pub fn graph_mut(&mut self) -> &mut WorldGraph {
        &mut self.graph
    }

    /// The actor's resources.
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Replace the ledger during setup.
    pub fn set_ledger(&mut self, ledger: ResourceLedger) {
        self.ledger = ledger;
    }

    /// The current instant.
    pub fn now(&self) -> GameTime {
        self.queue.now()
    }

    /// The event queue (scheduling is done by commands, not directly).
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// The player entity.
    pub fn actor(&self) -> EntityId {
        self.actor
    }

    /// The adversary's observable state.
    pub fn alter_ego(&self) -> &AlterEgo {
        &self.alter_ego
    }

    /// Undo/redo bookkeeping.
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Whether the device went live and the session stopped accepting
    /// commands.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Pending narration records (without consuming them).
    pub fn narration(&self) -> &[Narration] {
        self.log.records()
    }

    /// Drain narration for the presentation layer.
    pub fn drain_narration(&mut self) -> Vec<Narration> {
        self.log.drain()
    }

    // -- setup helpers ------------------------------------------------------

    /// Install a recurring income event: `amount` credited every `every`,
    /// first arriving one period from now.
    pub fn install_stipend(
        &mut self,
        amount: i64,
        every: GameDuration,
    ) -> Result<EventHandle, SessionError> {
        let trigger = self.queue.now() + every;
        Ok(self.queue.schedule(
            trigger,
            EventPayload::CreditFunds {
                amount,
                repeat_every: Some(every),
            },
        )?)
    }

    // -- the player turn ----------------------------------------------------

    /// Execute one player command and run the full turn that follows it.
    ///
    /// The returned result's `undo_token` has been moved into history (when
    /// present); use [`undo`](Self::undo) to reverse the command.
    ///
    /// # Errors
    ///
    /// [`SessionError::Terminal`] once the device is active.
    pub fn perform(&mut self, command: Command) -> Result<CommandResult, SessionError> {
        if self.terminal {
            return Err(SessionError::Terminal);
        }
        let recorded = command.clone();
        let mut result = self.pipeline().execute(command);
        if result.success {
            if let Some(token) = result.undo_token.take() {
                self.history.push(HistoryEntry {
                    command: recorded,
                    token,
                });
            }
        }
        self.run_adversary_if_depleted();
        Ok(result)
    }

    /// Execute a fixed command sequence with all-or-nothing semantics. On
    /// success each member lands in history individually; on failure the
    /// pipeline has already rolled every member back.
    pub fn perform_batch(&mut self, commands: Vec<Command>) -> Result<BatchOutcome, SessionError> {
        if self.terminal {
            return Err(SessionError::Terminal);
        }
        let recorded: Vec<Command> = commands.clone();
        let mut outcome = self.pipeline().execute_batch(commands);
        if outcome.success {
            for (command, result) in recorded.into_iter().zip(outcome.results.iter_mut()) {
                if let Some(token) = result.undo_token.take() {
                    self.history.push(HistoryEntry { command, token });
                }
            }
        }
        self.run_adversary_if_depleted();
        Ok(outcome)
    }

    /// Reverse the most recent undoable command. Returns its label.
    ///
    /// # Errors
    ///
    /// [`SessionError::Terminal`] after activation, otherwise whatever the
    /// history reports (nothing to undo, or the entry went irreversible --
    /// in which case it has been discarded).
    pub fn undo(&mut self) -> Result<String, SessionError> {
        if self.terminal {
            return Err(SessionError::Terminal);
        }
        let Session {
            graph,
            ledger,
            queue,
            history,
            log,
            actor,
            ..
        } = self;
        let mut pipeline = CommandPipeline {
            graph,
            ledger,
            queue,
            log,
            actor: *actor,
        };
        let label = history.undo(&mut pipeline)?;
        self.log.push(Narration::Undone {
            label: label.clone(),
        });
        Ok(label)
    }

    /// Replay the most recently undone command as a fresh execution.
    ///
    /// # Errors
    ///
    /// [`SessionError::Terminal`] after activation, otherwise whatever the
    /// history reports.
    pub fn redo(&mut self) -> Result<CommandResult, SessionError> {
        if self.terminal {
            return Err(SessionError::Terminal);
        }
        let Session {
            graph,
            ledger,
            queue,
            history,
            log,
            actor,
            ..
        } = self;
        let mut pipeline = CommandPipeline {
            graph,
            ledger,
            queue,
            log,
            actor: *actor,
        };
        let result = history.redo(&mut pipeline)?;
        self.log.push(Narration::Redone {
            label: "redo".to_owned(),
        });
        self.run_adversary_if_depleted();
        Ok(result)
    }

    /// Tear a built device component apart, setting the adversary's
    /// progress back. Irreversible, so it never enters history.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownComponent`] for a name outside the component
    /// set. A missing artifact surfaces as a failed result, not an error.
    pub fn dismantle(&mut self, component: &str) -> Result<CommandResult, SessionError> {
        if self.terminal {
            return Err(SessionError::Terminal);
        }
        if !COMPONENTS.contains(&component) {
            return Err(SessionError::UnknownComponent(component.to_owned()));
        }
        let Some(artifact) = self.graph.find_first(component, Scope::Graph) else {
            return Ok(CommandResult::failed(format!(
                "dismantle: no `{component}` has been built"
            )));
        };
        let result = self.pipeline().execute(Command::dismantle(artifact));
        if result.success {
            self.alter_ego.construction_mut().mark_missing(component);
        }
        self.run_adversary_if_depleted();
        Ok(result)
    }

    // -- internals ----------------------------------------------------------

    fn pipeline(&mut self) -> CommandPipeline<'_> {
        CommandPipeline {
            graph: &mut self.graph,
            ledger: &mut self.ledger,
            queue: &mut self.queue,
            log: &mut self.log,
            actor: self.actor,
        }
    }

    /// The adversary's activation edge: runs strictly after every event
    /// firing of the preceding advance, at most once per player turn.
    fn run_adversary_if_depleted(&mut self) {
        if self.terminal || !self.ledger.is_depleted() {
            return;
        }
        debug!("vitality depleted, the adversary takes a turn");
        let mut pipeline = CommandPipeline {
            graph: &mut self.graph,
            ledger: &mut self.ledger,
            queue: &mut self.queue,
            log: &mut self.log,
            actor: self.actor,
        };
        self.alter_ego.take_turn(&mut pipeline);
        self.ledger.restore_vitality();
        if self.alter_ego.construction().is_activated() {
            self.terminal = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fugue_world::graph::EntityProto;
    use fugue_world::ledger::INITIAL_VITALITY;

    fn starter() -> (Session, EntityId, EntityId) {
        let mut graph = WorldGraph::new();
        let flat = graph
            .spawn(EntityProto::container("flat", None), None)
            .unwrap();
        let main = graph.spawn(EntityProto::location("main"), Some(flat)).unwrap();
        let bedroom = graph
            .spawn(EntityProto::location("bedroom"), Some(flat))
            .unwrap();
        let toolbox = graph
            .spawn(EntityProto::openable("toolbox", None), Some(main))
            .unwrap();
        let me = graph
            .spawn(EntityProto::actor("me", Some(100)), Some(main))
            .unwrap();
        let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(main)).unwrap();
        let session =
            Session::new(graph, me, bedroom, toolbox, SessionConfig::default()).unwrap();
        (session, me, lamp)
    }

    #[test]
    fn rejects_non_actor() {
        let mut graph = WorldGraph::new();
        let den = graph.spawn(EntityProto::location("den"), None).unwrap();
        let rock = graph.spawn(EntityProto::item("rock", 1), Some(den)).unwrap();
        let err = Session::new(graph, rock, den, den, SessionConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::NotAnActor));
    }

    #[test]
    fn perform_records_history_and_undo_reverses() {
        let (mut session, me, lamp) = starter();
        let result = session.perform(Command::take(lamp)).unwrap();
        assert!(result.success);
        assert!(result.undo_token.is_none(), "token moved into history");
        assert_eq!(session.history().undo_len(), 1);
        assert_eq!(session.graph().parent(lamp).unwrap(), Some(me));

        let label = session.undo().unwrap();
        assert_eq!(label, "take");
        assert_ne!(session.graph().parent(lamp).unwrap(), Some(me));
        assert!(session
            .narration()
            .iter()
            .any(|r| matches!(r, Narration::Undone { .. })));
    }

    #[test]
    fn vitality_zero_triggers_exactly_one_adversary_turn() {
        let (mut session, ..) = starter();
        // Ponder long enough to flatten vitality (5h * 10 = 50).
        let result = session.perform(Command::ponder(5)).unwrap();
        assert!(result.success);

        // The adversary ran once: phase 1, vitality restored by waking up.
        assert_eq!(session.alter_ego().phase(), 1);
        assert_eq!(session.ledger().vitality(), INITIAL_VITALITY);

        // A harmless follow-up command does not re-trigger it.
        session.perform(Command::ponder(1)).unwrap();
        assert_eq!(session.alter_ego().phase(), 1);
    }

    #[test]
    fn stipend_credits_on_schedule() {
        let (mut session, ..) = starter();
        let before = session.ledger().balance();
        session
            .install_stipend(40, GameDuration::hours(3))
            .unwrap();

        session.perform(Command::ponder(4)).unwrap();
        // 4h of pondering covers the 3h trigger once; 10 vitality remains,
        // so the adversary stays asleep.
        assert_eq!(session.alter_ego().phase(), 0);
        assert_eq!(session.ledger().balance(), before + 40);
    }

    #[test]
    fn terminal_refuses_everything() {
        let (mut session, ..) = starter();
        session.terminal = true;
        assert!(matches!(
            session.perform(Command::ponder(1)),
            Err(SessionError::Terminal)
        ));
        assert!(matches!(session.undo(), Err(SessionError::Terminal)));
        assert!(matches!(session.redo(), Err(SessionError::Terminal)));
    }

    #[test]
    fn dismantle_validates_component_names() {
        let (mut session, ..) = starter();
        assert!(matches!(
            session.dismantle("weather-machine"),
            Err(SessionError::UnknownComponent(_))
        ));
        let result = session.dismantle("frame").unwrap();
        assert!(!result.success, "nothing built yet");
    }

    #[test]
    fn dismantle_sets_construction_back() {
        let (mut session, ..) = starter();
        // Seed frame ingredients where the adversary will find them.
        let main = session.graph().location_of(session.actor()).unwrap().unwrap();
        for (name, bulk) in [("plank", 20), ("brackets", 8), ("nails", 5), ("hammer", 15)] {
            session
                .graph_mut()
                .spawn(EntityProto::item(name, bulk), Some(main))
                .unwrap();
        }

        // Two flattening turns: survey, then the frame build.
        session.perform(Command::ponder(5)).unwrap();
        session.perform(Command::ponder(5)).unwrap();
        assert!(session.alter_ego().construction().is_built("frame"));

        // Walk to the build site; the artifact must be in reach to tear down.
        let bedroom = session.graph().find_first("bedroom", Scope::Graph).unwrap();
        session.perform(Command::go(bedroom)).unwrap();

        let result = session.dismantle("frame").unwrap();
        assert!(result.success, "{}", result.message);
        assert!(!session.alter_ego().construction().is_built("frame"));
        assert!(session.graph().find_first("frame", Scope::Graph).is_none());
    }

    #[test]
    fn batch_members_land_in_history_individually() {
        let (mut session, _me, lamp) = starter();
        let coin = {
            let main = session.graph().location_of(lamp).unwrap().unwrap();
            session
                .graph_mut()
                .spawn(EntityProto::item("coin", 1), Some(main))
                .unwrap()
        };

        let outcome = session
            .perform_batch(vec![Command::take(lamp), Command::take(coin)])
            .unwrap();
        assert!(outcome.success);
        assert_eq!(session.history().undo_len(), 2);

        session.undo().unwrap();
        session.undo().unwrap();
        assert_eq!(session.history().undo_len(), 0);
    }
}
