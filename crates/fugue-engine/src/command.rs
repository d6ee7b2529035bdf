//! Commands: atomic, preconditioned, reversible actions as plain data.
//!
//! A [`Command`] is immutable once constructed: a label, a composable list of
//! [`Precondition`]s evaluated uniformly before anything runs, a time and
//! vitality cost, and an ordered list of [`Effect`]s. Commands carry no
//! closures -- both the player's parser and the autonomous adversary build
//! the same data shapes, so both actors are bound by identical precondition
//! and undo contracts, and every command serializes into history snapshots.
//!
//! Execution consumes the command by value (see
//! [`CommandPipeline::execute`](crate::pipeline::CommandPipeline::execute)),
//! so running the same instance twice is a type error rather than undefined
//! behavior. Redo clones a fresh instance instead.
//!
//! A macro is a command whose body is an ordered group of member commands:
//! it executes all-or-nothing and occupies a single history entry.

use serde::{Deserialize, Serialize};

use fugue_world::entity::EntityId;
use fugue_world::graph::{EntityProto, WorldGraph};
use fugue_world::ledger::ResourceLedger;

use crate::clock::GameDuration;
use crate::narrate::Narration;
use crate::pipeline::UndoToken;
use crate::queue::EventPayload;

/// Heaviest single entity the actor will pick up.
pub const CARRY_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Precondition
// ---------------------------------------------------------------------------

/// A single applicability check, evaluated against the current world and
/// ledger before any effect runs. Commands carry a list of these; the
/// pipeline evaluates them in order and refuses the command on the first
/// failure, mutating nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// The actor stands in this exact location.
    ActorAt { location: EntityId },
    /// The actor's current location is not sealed shut.
    ActorFree,
    /// The entity is in the actor's inventory or the actor's location, with
    /// every openable on the path open.
    CanReach { entity: EntityId },
    /// The entity is somewhere in the actor's inventory.
    Holding { entity: EntityId },
    /// The entity's bulk is within [`CARRY_LIMIT`].
    Portable { entity: EntityId },
    /// The entity is an openable in the open state.
    IsOpen { entity: EntityId },
    /// The entity is an openable in the closed state.
    IsClosed { entity: EntityId },
    /// The entity is a location.
    IsLocation { entity: EntityId },
    /// The location's confinement seal is not engaged.
    NotSealed { location: EntityId },
    /// The ledger can cover a debit of this amount.
    Affordable { amount: i64 },
    /// The entity is live.
    Exists { entity: EntityId },
}

impl Precondition {
    /// Evaluate against the current state. `Err` carries a terse diagnostic
    /// reason (not player-facing prose).
    pub fn check(
        &self,
        graph: &WorldGraph,
        ledger: &ResourceLedger,
        actor: EntityId,
    ) -> Result<(), String> {
        match self {
            Precondition::ActorAt { location } => {
                let here = graph
                    .location_of(actor)
                    .map_err(|e| e.to_string())?;
                if here == Some(*location) {
                    Ok(())
                } else {
                    Err(format!(
                        "must be in `{}`",
                        graph.name(*location).unwrap_or("<gone>")
                    ))
                }
            }
            Precondition::ActorFree => {
                let here = graph
                    .location_of(actor)
                    .map_err(|e| e.to_string())?;
                match here {
                    Some(loc) if graph.is_sealed(loc).map_err(|e| e.to_string())? => Err(format!(
                        "`{}` is sealed shut",
                        graph.name(loc).unwrap_or("<gone>")
                    )),
                    _ => Ok(()),
                }
            }
            Precondition::CanReach { entity } => check_reach(graph, actor, *entity),
            Precondition::Holding { entity } => {
                if !graph.contains(*entity) {
                    return Err("that is gone".to_owned());
                }
                let mut cursor = graph.parent(*entity).map_err(|e| e.to_string())?;
                while let Some(p) = cursor {
                    if p == actor {
                        return Ok(());
                    }
                    cursor = graph.parent(p).map_err(|e| e.to_string())?;
                }
                Err(format!(
                    "not holding `{}`",
                    graph.name(*entity).unwrap_or("<gone>")
                ))
            }
            Precondition::Portable { entity } => {
                let bulk = graph.bulk(*entity).map_err(|e| e.to_string())?;
                if bulk <= CARRY_LIMIT {
                    Ok(())
                } else {
                    Err(format!(
                        "`{}` is too heavy to carry",
                        graph.name(*entity).unwrap_or("<gone>")
                    ))
                }
            }
            Precondition::IsOpen { entity } => {
                if graph.is_open(*entity).map_err(|e| e.to_string())? {
                    Ok(())
                } else {
                    Err(format!(
                        "`{}` is closed",
                        graph.name(*entity).unwrap_or("<gone>")
                    ))
                }
            }
            Precondition::IsClosed { entity } => {
                if graph.is_open(*entity).map_err(|e| e.to_string())? {
                    Err(format!(
                        "`{}` is already open",
                        graph.name(*entity).unwrap_or("<gone>")
                    ))
                } else {
                    Ok(())
                }
            }
            Precondition::IsLocation { entity } => {
                let caps = graph.caps(*entity).map_err(|e| e.to_string())?;
                if caps.location {
                    Ok(())
                } else {
                    Err(format!(
                        "`{}` is not somewhere to stand",
                        graph.name(*entity).unwrap_or("<gone>")
                    ))
                }
            }
            Precondition::NotSealed { location } => {
                if graph.is_sealed(*location).map_err(|e| e.to_string())? {
                    Err(format!(
                        "`{}` is sealed shut",
                        graph.name(*location).unwrap_or("<gone>")
                    ))
                } else {
                    Ok(())
                }
            }
            Precondition::Affordable { amount } => {
                if ledger.can_afford(*amount) {
                    Ok(())
                } else {
                    Err(format!(
                        "cannot afford {amount}, balance is {}",
                        ledger.balance()
                    ))
                }
            }
            Precondition::Exists { entity } => {
                if graph.contains(*entity) {
                    Ok(())
                } else {
                    Err("that is gone".to_owned())
                }
            }
        }
    }
}

/// Reachability: inside the actor's inventory, or in the actor's location,
/// with every openable between here and there open.
fn check_reach(graph: &WorldGraph, actor: EntityId, entity: EntityId) -> Result<(), String> {
    if !graph.contains(entity) {
        return Err("that is gone".to_owned());
    }
    // Inventory first.
    let mut cursor = graph.parent(entity).map_err(|e| e.to_string())?;
    while let Some(p) = cursor {
        if p == actor {
            return graph
                .reachable(entity, actor)
                .map_err(|e| e.to_string())
                .and_then(|ok| {
                    if ok {
                        Ok(())
                    } else {
                        Err("got to dig a little deeper".to_owned())
                    }
                });
        }
        cursor = graph.parent(p).map_err(|e| e.to_string())?;
    }
    // Otherwise: same location, open path.
    let here = graph.location_of(actor).map_err(|e| e.to_string())?;
    let there = graph.location_of(entity).map_err(|e| e.to_string())?;
    let name = graph.name(entity).unwrap_or("<gone>");
    match (here, there) {
        (Some(h), Some(t)) if h == t => {
            if graph.reachable(entity, h).map_err(|e| e.to_string())? {
                Ok(())
            } else {
                Err(format!("`{name}` is shut away inside something"))
            }
        }
        _ => Err(format!("`{name}` is not here")),
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// One forward mutation. The pipeline applies effects in order and captures
/// an inverse for each at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Move an entity into a container.
    MoveEntity { entity: EntityId, dest: EntityId },
    /// Move an entity into the executing actor's inventory.
    TakeEntity { entity: EntityId },
    /// Move the executing actor to a location.
    MoveActor { dest: EntityId },
    /// Create a fresh entity inside `dest`.
    SpawnItem { proto: EntityProto, dest: EntityId },
    /// Destroy an entity and everything it contains.
    DestroyEntity { entity: EntityId },
    /// Open or close an openable.
    SetOpen { entity: EntityId, open: bool },
    /// Engage or clear a location's confinement seal.
    SetSealed { location: EntityId, sealed: bool },
    /// Flag or clear a location's obstruction.
    SetObstructed { location: EntityId, obstructed: bool },
    /// Credit the ledger.
    Credit { amount: i64 },
    /// Debit the ledger (guarded; fails the command if unaffordable).
    Debit { amount: i64 },
    /// Regain vitality.
    GainVitality { amount: i64 },
    /// Place an event on the queue, `after` from now.
    ScheduleEvent {
        after: GameDuration,
        payload: EventPayload,
    },
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Body {
    Simple {
        preconditions: Vec<Precondition>,
        time_cost: GameDuration,
        vitality_cost: i64,
        effects: Vec<Effect>,
        reversible: bool,
    },
    Group {
        members: Vec<Command>,
    },
}

/// An atomic, preconditioned, reversible action. See the module docs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub(crate) label: String,
    pub(crate) body: Body,
}

impl Command {
    /// An empty simple command: no preconditions, no costs, no effects.
    /// Compose with [`require`](Self::require), [`then`](Self::then) and
    /// [`costing`](Self::costing).
    pub fn simple(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: Body::Simple {
                preconditions: Vec::new(),
                time_cost: GameDuration::ZERO,
                vitality_cost: 0,
                effects: Vec::new(),
                reversible: true,
            },
        }
    }

    /// Promote an ordered command sequence to a single first-class command:
    /// one label, all-or-nothing execution, one history entry, whole-group
    /// undo.
    pub fn macro_of(label: impl Into<String>, members: Vec<Command>) -> Self {
        Self {
            label: label.into(),
            body: Body::Group { members },
        }
    }

    /// Append a precondition. No effect on macros (members carry their own).
    pub fn require(mut self, precondition: Precondition) -> Self {
        if let Body::Simple { preconditions, .. } = &mut self.body {
            preconditions.push(precondition);
        }
        self
    }

    /// Append a forward effect. No effect on macros.
    pub fn then(mut self, effect: Effect) -> Self {
        if let Body::Simple { effects, .. } = &mut self.body {
            effects.push(effect);
        }
        self
    }

    /// Set the time and vitality costs. No effect on macros (members carry
    /// their own).
    pub fn costing(mut self, time: GameDuration, vitality: i64) -> Self {
        if let Body::Simple {
            time_cost,
            vitality_cost,
            ..
        } = &mut self.body
        {
            *time_cost = time;
            *vitality_cost = vitality;
        }
        self
    }

    /// Mark the command as not reversible: it executes normally but yields
    /// no undo token and never enters history.
    pub fn irreversible(mut self) -> Self {
        if let Body::Simple { reversible, .. } = &mut self.body {
            *reversible = false;
        }
        self
    }

    /// The command's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this is a promoted command group.
    pub fn is_macro(&self) -> bool {
        matches!(self.body, Body::Group { .. })
    }

    // -- canned player verbs ------------------------------------------------
    //
    // The parsing layer resolves free text to entity handles and picks one
    // of these constructors; the adversary builds its own commands from the
    // same parts.

    /// Walk to a location.
    pub fn go(dest: EntityId) -> Self {
        Self::simple("go")
            .require(Precondition::IsLocation { entity: dest })
            .require(Precondition::ActorFree)
            .require(Precondition::NotSealed { location: dest })
            .costing(GameDuration::minutes(5), 1)
            .then(Effect::MoveActor { dest })
    }

    /// Pick something up.
    pub fn take(item: EntityId) -> Self {
        Self::simple("take")
            .require(Precondition::CanReach { entity: item })
            .require(Precondition::Portable { entity: item })
            .costing(GameDuration::minutes(2), 1)
            .then(Effect::TakeEntity { entity: item })
    }

    /// Put a held item into a container.
    pub fn put(item: EntityId, container: EntityId) -> Self {
        Self::simple("put")
            .require(Precondition::Holding { entity: item })
            .require(Precondition::CanReach { entity: container })
            .require(Precondition::IsOpen { entity: container })
            .costing(GameDuration::minutes(2), 1)
            .then(Effect::MoveEntity {
                entity: item,
                dest: container,
            })
    }

    /// Open an openable.
    pub fn open(target: EntityId) -> Self {
        Self::simple("open")
            .require(Precondition::CanReach { entity: target })
            .require(Precondition::IsClosed { entity: target })
            .costing(GameDuration::minutes(1), 0)
            .then(Effect::SetOpen {
                entity: target,
                open: true,
            })
    }

    /// Close an openable.
    pub fn close(target: EntityId) -> Self {
        Self::simple("close")
            .require(Precondition::CanReach { entity: target })
            .require(Precondition::IsOpen { entity: target })
            .costing(GameDuration::minutes(1), 0)
            .then(Effect::SetOpen {
                entity: target,
                open: false,
            })
    }

    /// Sit and think. Costs nothing but time and vitality.
    pub fn ponder(hours: u64) -> Self {
        Self::simple("ponder").costing(GameDuration::hours(hours), 10 * hours as i64)
    }

    /// Eat something for a vitality boost. The food is gone afterward.
    pub fn eat(food: EntityId, boost: i64) -> Self {
        Self::simple("eat")
            .require(Precondition::CanReach { entity: food })
            .costing(GameDuration::minutes(20), 0)
            .then(Effect::DestroyEntity { entity: food })
            .then(Effect::GainVitality { amount: boost })
    }

    /// Phone in an order: pay now, delivery arrives `lead` later in `dest`.
    pub fn order(item: EntityProto, cost: i64, lead: GameDuration, dest: EntityId) -> Self {
        let label = format!("order {}", item.name);
        Self::simple(label)
            .require(Precondition::Affordable { amount: cost })
            .costing(GameDuration::minutes(20), 2)
            .then(Effect::Debit { amount: cost })
            .then(Effect::ScheduleEvent {
                after: lead,
                payload: EventPayload::DeliverItem { item, dest },
            })
    }

    /// Seal the actor's refuge shut from the inside, consuming the boards
    /// and fasteners. There is no taking this back.
    pub fn seal(location: EntityId, boards: EntityId, fasteners: EntityId) -> Self {
        Self::simple("seal the refuge")
            .require(Precondition::ActorAt { location })
            .require(Precondition::NotSealed { location })
            .require(Precondition::Holding { entity: boards })
            .require(Precondition::Holding { entity: fasteners })
            .costing(GameDuration::hours(2), 20)
            .then(Effect::DestroyEntity { entity: boards })
            .then(Effect::DestroyEntity { entity: fasteners })
            .then(Effect::SetSealed {
                location,
                sealed: true,
            })
            .irreversible()
    }

    /// Pile furniture against a location's doorway.
    pub fn barricade(location: EntityId) -> Self {
        Self::simple("barricade")
            .require(Precondition::IsLocation { entity: location })
            .costing(GameDuration::hours(1), 15)
            .then(Effect::SetObstructed {
                location,
                obstructed: true,
            })
    }

    /// Tear an entity apart. Destroys it and everything inside, for good.
    pub fn dismantle(target: EntityId) -> Self {
        Self::simple("dismantle")
            .require(Precondition::CanReach { entity: target })
            .costing(GameDuration::minutes(30), 5)
            .then(Effect::DestroyEntity { entity: target })
            .irreversible()
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

/// What came back from executing a command.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command applied. `false` means *nothing* mutated.
    pub success: bool,
    /// Terse diagnostic, empty on success. Not player-facing prose.
    pub message: String,
    /// Structured narration records produced by this command's effects (and
    /// any events that fired during its clock advance).
    pub records: Vec<Narration>,
    /// Present only on reversible success. The session moves this into
    /// history; pipeline-level callers may hold it and undo directly.
    pub undo_token: Option<UndoToken>,
}

impl CommandResult {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            records: Vec::new(),
            undo_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fugue_world::graph::Scope;

    fn small_world() -> (WorldGraph, EntityId, EntityId, EntityId) {
        let mut graph = WorldGraph::new();
        let den = graph.spawn(EntityProto::location("den"), None).unwrap();
        let me = graph
            .spawn(EntityProto::actor("me", Some(100)), Some(den))
            .unwrap();
        let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(den)).unwrap();
        (graph, den, me, lamp)
    }

    #[test]
    fn reach_requires_same_location() {
        let (mut graph, den, me, lamp) = small_world();
        let ledger = ResourceLedger::new();
        let attic = graph.spawn(EntityProto::location("attic"), None).unwrap();

        let ok = Precondition::CanReach { entity: lamp }.check(&graph, &ledger, me);
        assert!(ok.is_ok());

        graph.move_entity(lamp, attic).unwrap();
        let err = Precondition::CanReach { entity: lamp }
            .check(&graph, &ledger, me)
            .unwrap_err();
        assert!(err.contains("not here"));
        let _ = den;
    }

    #[test]
    fn reach_blocked_by_closed_container() {
        let (mut graph, den, me, lamp) = small_world();
        let ledger = ResourceLedger::new();
        let chest = graph
            .spawn(EntityProto::openable("chest", None), Some(den))
            .unwrap();
        graph.set_open(chest, true).unwrap();
        graph.move_entity(lamp, chest).unwrap();
        graph.set_open(chest, false).unwrap();

        let err = Precondition::CanReach { entity: lamp }
            .check(&graph, &ledger, me)
            .unwrap_err();
        assert!(err.contains("shut away"));
    }

    #[test]
    fn holding_walks_nested_inventory() {
        let (mut graph, _den, me, lamp) = small_world();
        let ledger = ResourceLedger::new();
        let pouch = graph
            .spawn(EntityProto::container("pouch", None), Some(me))
            .unwrap();
        graph.move_entity(lamp, pouch).unwrap();

        assert!(Precondition::Holding { entity: lamp }
            .check(&graph, &ledger, me)
            .is_ok());
    }

    #[test]
    fn affordable_reports_balance() {
        let graph = WorldGraph::new();
        let ledger = ResourceLedger::with_values(50, 10);
        let actor = EntityId::new(0, 0);
        let err = Precondition::Affordable { amount: 11 }
            .check(&graph, &ledger, actor)
            .unwrap_err();
        assert!(err.contains("balance is 10"));
    }

    #[test]
    fn builders_compose() {
        let (graph, _den, _me, lamp) = small_world();
        let cmd = Command::take(lamp);
        assert_eq!(cmd.label(), "take");
        assert!(!cmd.is_macro());

        let macro_cmd = Command::macro_of("fetch", vec![Command::take(lamp)]);
        assert!(macro_cmd.is_macro());

        // Commands are plain data: they serialize.
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        let _ = graph;
    }

    #[test]
    fn find_scope_sees_spawned_items() {
        // Sanity-check the Scope re-export used throughout verb construction.
        let (graph, den, ..) = small_world();
        assert!(graph.find_first("lamp", Scope::Subtree(den)).is_some());
    }
}
