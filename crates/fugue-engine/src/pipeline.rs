//! The command pipeline: all-or-nothing execution with captured inverses.
//!
//! [`CommandPipeline::execute`] consumes a [`Command`] by value. It first
//! evaluates every precondition against the current state; any failure
//! returns a failed [`CommandResult`] with zero mutation. On success it
//! applies the effects in order, capturing one [`UndoOp`] inverse per effect
//! *at execution time* (what the inverse must restore depends on the state
//! the effect found), drains the vitality cost, and advances the clock by
//! the time cost -- which resolves any events that came due.
//!
//! If an effect fails partway (say a container filled up), the already
//! applied prefix is rolled back before the failure is reported: partial
//! application is never observable, at either the command or the batch
//! granularity.
//!
//! # Undo
//!
//! [`CommandPipeline::undo`] consumes the [`UndoToken`] and applies the
//! captured inverses in exact reverse order. It refuses with
//! [`UndoError::Irreversible`] when dependent state has moved on -- an event
//! the command scheduled already fired, or an entity it touched was
//! destroyed -- and it validates before mutating, so a refused undo changes
//! nothing. Undo never rewinds the clock: time is monotonic, and the token
//! reverses entity moves, ledger deltas and scheduled events only.

use serde::{Deserialize, Serialize};
use tracing::warn;

use fugue_world::entity::EntityId;
use fugue_world::graph::{SubtreeSnapshot, WorldGraph};
use fugue_world::ledger::ResourceLedger;
use fugue_world::{LedgerError, WorldError};

use crate::clock::{GameDuration, GameTime};
use crate::command::{Body, Command, CommandResult, Effect, Precondition};
use crate::narrate::{Narration, NarrationLog};
use crate::queue::{EventHandle, EventPayload, EventQueue};
use crate::{QueueError, UndoError};

// ---------------------------------------------------------------------------
// UndoOp
// ---------------------------------------------------------------------------

/// One captured inverse. A token holds these in forward-execution order;
/// undo applies them back to front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum UndoOp {
    /// Put a moved entity back where it was, sibling position included
    /// (sibling order is observable through `find`).
    MoveBack {
        entity: EntityId,
        prev_parent: Option<EntityId>,
        prev_index: usize,
    },
    /// Remove a spawned entity.
    Despawn { entity: EntityId },
    /// Rebuild a destroyed subtree (with fresh handles) where it stood.
    Respawn {
        snapshot: SubtreeSnapshot,
        parent: Option<EntityId>,
        index: usize,
    },
    /// Restore a previous open state.
    SetOpen { entity: EntityId, open: bool },
    /// Restore a previous seal state.
    SetSealed { location: EntityId, sealed: bool },
    /// Restore a previous obstruction state.
    SetObstructed {
        location: EntityId,
        obstructed: bool,
    },
    /// Refund a debit.
    Credit { amount: i64 },
    /// Claw back a credit.
    Debit { amount: i64 },
    /// Restore vitality to an exact prior value.
    RewindVitality { prev: i64 },
    /// Remove an event this command scheduled. Fails if it already fired.
    CancelEvent { handle: EventHandle },
    /// Re-place a cancelled event (roll-forward bookkeeping only).
    ScheduleAt {
        trigger: GameTime,
        payload: EventPayload,
    },
}

// ---------------------------------------------------------------------------
// UndoToken
// ---------------------------------------------------------------------------

/// Opaque capture of everything needed to reverse one successful command.
/// Consumed by [`CommandPipeline::undo`]; a token spent is a token gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoToken {
    pub(crate) label: String,
    pub(crate) ops: Vec<UndoOp>,
}

impl UndoToken {
    /// Label of the command this token reverses.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Handles of the events the command scheduled. The adversary tracks
    /// its pending orders through these.
    pub fn scheduled_events(&self) -> Vec<EventHandle> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                UndoOp::CancelEvent { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// EffectError
// ---------------------------------------------------------------------------

/// Internal union of the ways a forward effect or inverse can fail.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EffectError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Result of [`CommandPipeline::execute_batch`]: per-member results plus the
/// overall verdict. On failure every previously executed member has been
/// undone (their tokens are taken) before this returns.
#[derive(Debug)]
pub struct BatchOutcome {
    pub success: bool,
    pub message: String,
    pub results: Vec<CommandResult>,
}

// ---------------------------------------------------------------------------
// CommandPipeline
// ---------------------------------------------------------------------------

/// Borrowed view over the shared state a command runs against. Both actors
/// -- the parser-driven player path and the autonomous scheduler -- execute
/// through this same pipeline, under the same contracts.
#[derive(Debug)]
pub struct CommandPipeline<'a> {
    pub graph: &'a mut WorldGraph,
    pub ledger: &'a mut ResourceLedger,
    pub queue: &'a mut EventQueue,
    pub log: &'a mut NarrationLog,
    /// The entity whose body executes the command.
    pub actor: EntityId,
}

impl CommandPipeline<'_> {
    /// Execute a command. Consuming `command` by value is what makes a
    /// command single-shot: the same instance cannot be executed twice.
    pub fn execute(&mut self, command: Command) -> CommandResult {
        let Command { label, body } = command;
        match body {
            Body::Simple {
                preconditions,
                time_cost,
                vitality_cost,
                effects,
                reversible,
            } => self.execute_simple(
                label,
                &preconditions,
                time_cost,
                vitality_cost,
                effects,
                reversible,
            ),
            Body::Group { members } => self.execute_group(label, members),
        }
    }

    fn execute_simple(
        &mut self,
        label: String,
        preconditions: &[Precondition],
        time_cost: GameDuration,
        vitality_cost: i64,
        effects: Vec<Effect>,
        reversible: bool,
    ) -> CommandResult {
        for precondition in preconditions {
            if let Err(reason) = precondition.check(self.graph, self.ledger, self.actor) {
                return CommandResult::failed(format!("{label}: {reason}"));
            }
        }

        let mark = self.log.len();
        let mut ops: Vec<UndoOp> = Vec::new();
        for effect in effects {
            match self.apply_effect(&effect) {
                Ok(op) => ops.push(op),
                Err(err) => {
                    // Preconditions passed but the world still said no
                    // (capacity races within a multi-effect command). Roll
                    // the applied prefix back; nothing partial escapes.
                    self.roll_back(&ops);
                    self.log.truncate(mark);
                    return CommandResult::failed(format!("{label}: {err}"));
                }
            }
        }

        if vitality_cost != 0 {
            let prev = self.ledger.vitality();
            self.ledger.drain_vitality(vitality_cost);
            ops.push(UndoOp::RewindVitality { prev });
        }
        if !time_cost.is_zero() {
            let target = self.queue.now() + time_cost;
            self.queue
                .advance(target, &mut *self.graph, &mut *self.ledger, &mut *self.log)
                .expect("forward clock advance cannot fail");
        }

        let records = self.log.records()[mark..].to_vec();
        let undo_token = reversible.then(|| UndoToken {
            label: label.clone(),
            ops,
        });
        CommandResult {
            success: true,
            message: String::new(),
            records,
            undo_token,
        }
    }

    /// Execute a promoted group. All-or-nothing at group granularity: a
    /// member failure undoes every member executed so far, in reverse, then
    /// reports. Records from rolled-back members stay in the shared log
    /// (events fired during member turns are real and are not reversed);
    /// the failed result is what tells the presentation the group failed.
    fn execute_group(&mut self, label: String, members: Vec<Command>) -> CommandResult {
        let mut member_tokens: Vec<UndoToken> = Vec::new();
        let mut records = Vec::new();
        let mut group_reversible = true;

        for member in members {
            let member_label = member.label().to_owned();
            let mut result = self.execute(member);
            records.append(&mut result.records);
            if !result.success {
                for token in member_tokens.drain(..).rev() {
                    if let Err(err) = self.undo(token) {
                        warn!(%err, "rolling back a failed macro left residue");
                    }
                }
                return CommandResult::failed(format!(
                    "{label}: member `{member_label}` failed: {}",
                    result.message
                ));
            }
            match result.undo_token.take() {
                Some(token) => member_tokens.push(token),
                None => group_reversible = false,
            }
        }

        let undo_token = group_reversible.then(|| UndoToken {
            label: label.clone(),
            ops: member_tokens.into_iter().flat_map(|t| t.ops).collect(),
        });
        CommandResult {
            success: true,
            message: String::new(),
            records,
            undo_token,
        }
    }

    /// Execute a fixed sequence with all-or-nothing semantics at the batch
    /// granularity. Unlike a macro, the members remain individually visible:
    /// on success each result still carries its own token.
    pub fn execute_batch(&mut self, commands: Vec<Command>) -> BatchOutcome {
        let mut results: Vec<CommandResult> = Vec::new();
        for command in commands {
            let label = command.label().to_owned();
            let result = self.execute(command);
            let ok = result.success;
            let message = result.message.clone();
            results.push(result);
            if !ok {
                let failed_at = results.len() - 1;
                for prev in results[..failed_at].iter_mut().rev() {
                    if let Some(token) = prev.undo_token.take() {
                        if let Err(err) = self.undo(token) {
                            warn!(%err, "batch rollback left residue");
                        }
                    }
                }
                return BatchOutcome {
                    success: false,
                    message: format!("batch stopped at `{label}`: {message}"),
                    results,
                };
            }
        }
        BatchOutcome {
            success: true,
            message: String::new(),
            results,
        }
    }

    /// Reverse one successful command. Validates the whole token first and
    /// refuses without mutating when any inverse is out of reach; a residual
    /// failure during application rolls the undone prefix forward again, so
    /// an undo either completes or leaves the world as it found it.
    pub fn undo(&mut self, token: UndoToken) -> Result<(), UndoError> {
        for op in token.ops.iter().rev() {
            if let Err(reason) = self.check_undo_op(op) {
                return Err(UndoError::Irreversible {
                    label: token.label.clone(),
                    reason,
                });
            }
        }

        let mut redone: Vec<UndoOp> = Vec::new();
        for op in token.ops.iter().rev() {
            match self.apply_undo_op(op) {
                Ok(inverse) => redone.push(inverse),
                Err(err) => {
                    for inverse in redone.iter().rev() {
                        if let Err(roll_err) = self.apply_undo_op(inverse) {
                            warn!(%roll_err, "roll-forward after failed undo also failed");
                        }
                    }
                    return Err(UndoError::Irreversible {
                        label: token.label.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    // -- effect application -------------------------------------------------

    /// Apply one forward effect, push its narration, and return the inverse
    /// that reverses it.
    fn apply_effect(&mut self, effect: &Effect) -> Result<UndoOp, EffectError> {
        match effect {
            Effect::MoveEntity { entity, dest } => {
                let entity_name = self.graph.name(*entity)?.to_owned();
                let dest_name = self.graph.name(*dest)?.to_owned();
                let prev_parent = self.graph.parent(*entity)?;
                let prev_index = self.graph.position_in_parent(*entity)?;
                self.graph.move_entity(*entity, *dest)?;
                self.log.push(Narration::Moved {
                    entity: entity_name,
                    to: dest_name,
                });
                Ok(UndoOp::MoveBack {
                    entity: *entity,
                    prev_parent,
                    prev_index,
                })
            }
            Effect::TakeEntity { entity } => {
                let entity_name = self.graph.name(*entity)?.to_owned();
                let prev_parent = self.graph.parent(*entity)?;
                let prev_index = self.graph.position_in_parent(*entity)?;
                self.graph.move_entity(*entity, self.actor)?;
                self.log.push(Narration::Taken { entity: entity_name });
                Ok(UndoOp::MoveBack {
                    entity: *entity,
                    prev_parent,
                    prev_index,
                })
            }
            Effect::MoveActor { dest } => {
                let caps = self.graph.caps(*dest)?;
                if !caps.location {
                    return Err(WorldError::NotALocation {
                        name: self.graph.name(*dest)?.to_owned(),
                    }
                    .into());
                }
                let dest_name = self.graph.name(*dest)?.to_owned();
                let prev_parent = self.graph.parent(self.actor)?;
                let prev_index = self.graph.position_in_parent(self.actor)?;
                self.graph.move_entity(self.actor, *dest)?;
                self.log.push(Narration::Entered {
                    location: dest_name,
                });
                Ok(UndoOp::MoveBack {
                    entity: self.actor,
                    prev_parent,
                    prev_index,
                })
            }
            Effect::SpawnItem { proto, dest } => {
                let id = self.graph.spawn(proto.clone(), Some(*dest))?;
                Ok(UndoOp::Despawn { entity: id })
            }
            Effect::DestroyEntity { entity } => {
                let entity_name = self.graph.name(*entity)?.to_owned();
                let snapshot = self.graph.subtree_snapshot(*entity)?;
                let parent = self.graph.parent(*entity)?;
                let index = self.graph.position_in_parent(*entity)?;
                self.graph.destroy(*entity)?;
                self.log.push(Narration::Destroyed {
                    entity: entity_name,
                });
                Ok(UndoOp::Respawn {
                    snapshot,
                    parent,
                    index,
                })
            }
            Effect::SetOpen { entity, open } => {
                let name = self.graph.name(*entity)?.to_owned();
                let prev = self.graph.set_open(*entity, *open)?;
                self.log.push(if *open {
                    Narration::Opened { entity: name }
                } else {
                    Narration::Closed { entity: name }
                });
                Ok(UndoOp::SetOpen {
                    entity: *entity,
                    open: prev,
                })
            }
            Effect::SetSealed { location, sealed } => {
                let name = self.graph.name(*location)?.to_owned();
                let prev = self.graph.set_sealed(*location, *sealed)?;
                self.log.push(if *sealed {
                    Narration::Sealed { location: name }
                } else {
                    Narration::SealCleared { location: name }
                });
                Ok(UndoOp::SetSealed {
                    location: *location,
                    sealed: prev,
                })
            }
            Effect::SetObstructed {
                location,
                obstructed,
            } => {
                let name = self.graph.name(*location)?.to_owned();
                let prev = self.graph.set_obstructed(*location, *obstructed)?;
                self.log.push(if *obstructed {
                    Narration::Obstructed { location: name }
                } else {
                    Narration::ObstructionCleared { location: name }
                });
                Ok(UndoOp::SetObstructed {
                    location: *location,
                    obstructed: prev,
                })
            }
            Effect::Credit { amount } => {
                self.ledger.credit(*amount);
                self.log.push(Narration::FundsCredited { amount: *amount });
                Ok(UndoOp::Debit { amount: *amount })
            }
            Effect::Debit { amount } => {
                self.ledger.debit(*amount)?;
                self.log.push(Narration::FundsDebited { amount: *amount });
                Ok(UndoOp::Credit { amount: *amount })
            }
            Effect::GainVitality { amount } => {
                let prev = self.ledger.vitality();
                let now = self.ledger.gain_vitality(*amount);
                self.log.push(Narration::VitalityGained { to: now });
                Ok(UndoOp::RewindVitality { prev })
            }
            Effect::ScheduleEvent { after, payload } => {
                let trigger = self.queue.now() + *after;
                let handle = self.queue.schedule(trigger, payload.clone())?;
                if let EventPayload::DeliverItem { item, .. } = payload {
                    self.log.push(Narration::OrderPlaced {
                        item: item.name.clone(),
                        eta: trigger,
                    });
                }
                Ok(UndoOp::CancelEvent { handle })
            }
        }
    }

    /// Best-effort reversal of a partially applied effect prefix. These
    /// inverses were captured moments ago against the same state, so failure
    /// here is a programmer error; it is logged rather than propagated
    /// because the command is already being reported as failed.
    fn roll_back(&mut self, ops: &[UndoOp]) {
        for op in ops.iter().rev() {
            if let Err(err) = self.apply_undo_op(op) {
                warn!(%err, "rollback of a failed command left residue");
            }
        }
    }

    // -- undo ops -----------------------------------------------------------

    /// Cheap pre-flight: would this inverse still apply?
    fn check_undo_op(&self, op: &UndoOp) -> Result<(), String> {
        match op {
            UndoOp::MoveBack {
                entity,
                prev_parent,
                ..
            } => {
                if !self.graph.contains(*entity) {
                    return Err("a moved entity was destroyed in the interim".to_owned());
                }
                if let Some(p) = prev_parent {
                    if !self.graph.contains(*p) {
                        return Err("the previous container was destroyed".to_owned());
                    }
                }
                Ok(())
            }
            UndoOp::Despawn { entity } => {
                if self.graph.contains(*entity) {
                    Ok(())
                } else {
                    Err("a spawned entity was destroyed in the interim".to_owned())
                }
            }
            UndoOp::Respawn { parent, .. } => match parent {
                Some(p) if !self.graph.contains(*p) => {
                    Err("the destroyed entity's container is itself gone".to_owned())
                }
                _ => Ok(()),
            },
            UndoOp::SetOpen { entity, .. } => {
                if self.graph.contains(*entity) {
                    Ok(())
                } else {
                    Err("the opened entity was destroyed".to_owned())
                }
            }
            UndoOp::SetSealed { location, .. } | UndoOp::SetObstructed { location, .. } => {
                if self.graph.contains(*location) {
                    Ok(())
                } else {
                    Err("the location was destroyed".to_owned())
                }
            }
            UndoOp::Debit { amount } => {
                if self.ledger.can_afford(*amount) {
                    Ok(())
                } else {
                    Err("the credited funds were already spent".to_owned())
                }
            }
            UndoOp::Credit { .. } | UndoOp::RewindVitality { .. } | UndoOp::ScheduleAt { .. } => {
                Ok(())
            }
            UndoOp::CancelEvent { handle } => {
                if self.queue.is_pending(*handle) {
                    Ok(())
                } else {
                    Err("a scheduled event already fired".to_owned())
                }
            }
        }
    }

    /// Apply one inverse and return *its* inverse, for roll-forward.
    fn apply_undo_op(&mut self, op: &UndoOp) -> Result<UndoOp, EffectError> {
        match op {
            UndoOp::MoveBack {
                entity,
                prev_parent,
                prev_index,
            } => {
                let current_parent = self.graph.parent(*entity)?;
                let current_index = self.graph.position_in_parent(*entity)?;
                self.graph.reattach_at(*entity, *prev_parent, *prev_index)?;
                Ok(UndoOp::MoveBack {
                    entity: *entity,
                    prev_parent: current_parent,
                    prev_index: current_index,
                })
            }
            UndoOp::Despawn { entity } => {
                let snapshot = self.graph.subtree_snapshot(*entity)?;
                let parent = self.graph.parent(*entity)?;
                let index = self.graph.position_in_parent(*entity)?;
                self.graph.destroy(*entity)?;
                Ok(UndoOp::Respawn {
                    snapshot,
                    parent,
                    index,
                })
            }
            UndoOp::Respawn {
                snapshot,
                parent,
                index,
            } => {
                let id = self.graph.restore_subtree_at(snapshot, *parent, *index)?;
                Ok(UndoOp::Despawn { entity: id })
            }
            UndoOp::SetOpen { entity, open } => {
                let prev = self.graph.set_open(*entity, *open)?;
                Ok(UndoOp::SetOpen {
                    entity: *entity,
                    open: prev,
                })
            }
            UndoOp::SetSealed { location, sealed } => {
                let prev = self.graph.set_sealed(*location, *sealed)?;
                Ok(UndoOp::SetSealed {
                    location: *location,
                    sealed: prev,
                })
            }
            UndoOp::SetObstructed {
                location,
                obstructed,
            } => {
                let prev = self.graph.set_obstructed(*location, *obstructed)?;
                Ok(UndoOp::SetObstructed {
                    location: *location,
                    obstructed: prev,
                })
            }
            UndoOp::Credit { amount } => {
                self.ledger.credit(*amount);
                Ok(UndoOp::Debit { amount: *amount })
            }
            UndoOp::Debit { amount } => {
                self.ledger.debit(*amount)?;
                Ok(UndoOp::Credit { amount: *amount })
            }
            UndoOp::RewindVitality { prev } => {
                let current = self.ledger.vitality();
                self.ledger.rewind_vitality(*prev);
                Ok(UndoOp::RewindVitality { prev: current })
            }
            UndoOp::CancelEvent { handle } => {
                let (trigger, payload) = self.queue.take(*handle)?;
                Ok(UndoOp::ScheduleAt { trigger, payload })
            }
            UndoOp::ScheduleAt { trigger, payload } => {
                let handle = self.queue.schedule(*trigger, payload.clone())?;
                Ok(UndoOp::CancelEvent { handle })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fugue_world::graph::{EntityProto, Scope};
    use fugue_world::ledger::INITIAL_BALANCE;

    struct Fixture {
        graph: WorldGraph,
        ledger: ResourceLedger,
        queue: EventQueue,
        log: NarrationLog,
        den: EntityId,
        me: EntityId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut graph = WorldGraph::new();
            let den = graph.spawn(EntityProto::location("den"), None).unwrap();
            let me = graph
                .spawn(EntityProto::actor("me", Some(100)), Some(den))
                .unwrap();
            Self {
                graph,
                ledger: ResourceLedger::new(),
                queue: EventQueue::new(),
                log: NarrationLog::new(),
                den,
                me,
            }
        }

        fn pipeline(&mut self) -> CommandPipeline<'_> {
            CommandPipeline {
                graph: &mut self.graph,
                ledger: &mut self.ledger,
                queue: &mut self.queue,
                log: &mut self.log,
                actor: self.me,
            }
        }
    }

    #[test]
    fn precondition_failure_mutates_nothing() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 200), Some(fx.den))
            .unwrap();
        let before = fx.graph.snapshot();

        let result = fx.pipeline().execute(Command::take(lamp));
        assert!(!result.success);
        assert!(result.message.contains("too heavy"));
        assert!(result.undo_token.is_none());
        assert_eq!(fx.graph.snapshot(), before);
        assert!(fx.log.is_empty());
    }

    #[test]
    fn execute_then_undo_restores_state() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();
        let vitality_before = fx.ledger.vitality();

        let mut result = fx.pipeline().execute(Command::take(lamp));
        assert!(result.success);
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.me));
        assert_eq!(fx.ledger.vitality(), vitality_before - 1);

        let token = result.undo_token.take().unwrap();
        fx.pipeline().undo(token).unwrap();
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.den));
        assert_eq!(fx.ledger.vitality(), vitality_before);
    }

    #[test]
    fn undo_does_not_rewind_the_clock() {
        let mut fx = Fixture::new();
        let before = fx.queue.now();
        let mut result = fx.pipeline().execute(Command::ponder(2));
        assert!(result.success);
        let after = fx.queue.now();
        assert!(after > before);

        let token = result.undo_token.take().unwrap();
        fx.pipeline().undo(token).unwrap();
        assert_eq!(fx.queue.now(), after, "time is monotonic through undo");
        assert_eq!(fx.ledger.vitality(), fugue_world::ledger::INITIAL_VITALITY);
    }

    #[test]
    fn mid_effect_failure_rolls_back_prefix() {
        let mut fx = Fixture::new();
        let thimble = fx
            .graph
            .spawn(EntityProto::container("thimble", Some(1)), Some(fx.den))
            .unwrap();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();

        // First effect succeeds (credit), second fails (lamp exceeds the
        // thimble's capacity). The credit must be rolled back.
        let cmd = Command::simple("stash")
            .then(Effect::Credit { amount: 7 })
            .then(Effect::MoveEntity {
                entity: lamp,
                dest: thimble,
            });
        let result = fx.pipeline().execute(cmd);
        assert!(!result.success);
        assert_eq!(fx.ledger.balance(), INITIAL_BALANCE);
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.den));
        assert!(fx.log.is_empty(), "rolled-back narration is dropped");
    }

    #[test]
    fn undo_of_scheduled_event_cancels_it() {
        let mut fx = Fixture::new();
        let cmd = Command::order(
            EntityProto::item("coil", 2),
            18,
            GameDuration::days(1),
            fx.den,
        );
        let mut result = fx.pipeline().execute(cmd);
        assert!(result.success);
        assert_eq!(fx.queue.pending_len(), 1);
        assert_eq!(fx.ledger.balance(), INITIAL_BALANCE - 18);

        let token = result.undo_token.take().unwrap();
        assert_eq!(token.scheduled_events().len(), 1);
        fx.pipeline().undo(token).unwrap();
        assert_eq!(fx.queue.pending_len(), 0);
        assert_eq!(fx.ledger.balance(), INITIAL_BALANCE);
    }

    #[test]
    fn undo_after_event_fired_is_irreversible() {
        let mut fx = Fixture::new();
        let cmd = Command::order(
            EntityProto::item("coil", 2),
            18,
            GameDuration::hours(1),
            fx.den,
        );
        let mut result = fx.pipeline().execute(cmd);
        let token = result.undo_token.take().unwrap();

        // Let the delivery land.
        let now = fx.queue.now();
        fx.queue
            .advance(
                now + GameDuration::hours(2),
                &mut fx.graph,
                &mut fx.ledger,
                &mut fx.log,
            )
            .unwrap();
        assert!(fx.graph.find_first("coil", Scope::Graph).is_some());

        let balance_before_undo = fx.ledger.balance();
        let err = fx.pipeline().undo(token).unwrap_err();
        assert!(matches!(err, UndoError::Irreversible { .. }));
        // The refused undo changed nothing.
        assert_eq!(fx.ledger.balance(), balance_before_undo);
        assert!(fx.graph.find_first("coil", Scope::Graph).is_some());
    }

    #[test]
    fn undo_after_entity_destroyed_is_irreversible() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();
        let mut result = fx.pipeline().execute(Command::take(lamp));
        let token = result.undo_token.take().unwrap();

        fx.graph.destroy(lamp).unwrap();
        let err = fx.pipeline().undo(token).unwrap_err();
        assert!(matches!(err, UndoError::Irreversible { .. }));
    }

    #[test]
    fn destroy_undo_restores_subtree() {
        let mut fx = Fixture::new();
        let snack = fx
            .graph
            .spawn(EntityProto::item("snack", 1), Some(fx.den))
            .unwrap();
        let mut result = fx.pipeline().execute(Command::eat(snack, 20));
        assert!(result.success);
        assert!(!fx.graph.contains(snack));

        let token = result.undo_token.take().unwrap();
        fx.pipeline().undo(token).unwrap();
        // Restored under a fresh handle, same name and place.
        let restored = fx.graph.find_first("snack", Scope::Subtree(fx.den)).unwrap();
        assert_ne!(restored, snack);
        assert_eq!(fx.graph.parent(restored).unwrap(), Some(fx.den));
    }

    #[test]
    fn irreversible_commands_yield_no_token() {
        let mut fx = Fixture::new();
        let junk = fx
            .graph
            .spawn(EntityProto::item("junk", 1), Some(fx.den))
            .unwrap();
        let result = fx.pipeline().execute(Command::dismantle(junk));
        assert!(result.success);
        assert!(result.undo_token.is_none());
        assert!(!fx.graph.contains(junk));
    }

    #[test]
    fn macro_failure_undoes_executed_members() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();
        let heavy = fx
            .graph
            .spawn(EntityProto::item("anvil", 500), Some(fx.den))
            .unwrap();

        let cmd = Command::macro_of(
            "grab everything",
            vec![Command::take(lamp), Command::take(heavy)],
        );
        let result = fx.pipeline().execute(cmd);
        assert!(!result.success);
        assert!(result.message.contains("take"));
        // The lamp went back.
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.den));
        assert_eq!(fx.graph.parent(heavy).unwrap(), Some(fx.den));
    }

    #[test]
    fn macro_success_undoes_as_one_unit() {
        let mut fx = Fixture::new();
        let chest = fx
            .graph
            .spawn(EntityProto::openable("chest", None), Some(fx.den))
            .unwrap();
        fx.graph.set_open(chest, true).unwrap();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(chest))
            .unwrap();
        fx.graph.set_open(chest, false).unwrap();

        let cmd = Command::macro_of(
            "loot the chest",
            vec![Command::open(chest), Command::take(lamp), Command::close(chest)],
        );
        let mut result = fx.pipeline().execute(cmd);
        assert!(result.success, "{}", result.message);
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.me));
        assert!(!fx.graph.is_open(chest).unwrap());

        let token = result.undo_token.take().unwrap();
        fx.pipeline().undo(token).unwrap();
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(chest));
        assert!(!fx.graph.is_open(chest).unwrap());
    }

    #[test]
    fn batch_rolls_back_on_member_failure() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();
        let heavy = fx
            .graph
            .spawn(EntityProto::item("anvil", 500), Some(fx.den))
            .unwrap();

        let outcome = fx
            .pipeline()
            .execute_batch(vec![Command::take(lamp), Command::take(heavy)]);
        assert!(!outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(fx.graph.parent(lamp).unwrap(), Some(fx.den));
    }

    #[test]
    fn batch_success_keeps_member_tokens() {
        let mut fx = Fixture::new();
        let lamp = fx
            .graph
            .spawn(EntityProto::item("lamp", 10), Some(fx.den))
            .unwrap();
        let coin = fx
            .graph
            .spawn(EntityProto::item("coin", 1), Some(fx.den))
            .unwrap();

        let outcome = fx
            .pipeline()
            .execute_batch(vec![Command::take(lamp), Command::take(coin)]);
        assert!(outcome.success);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.success && r.undo_token.is_some()));
    }
}
