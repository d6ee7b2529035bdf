//! Fugue World -- shared world-graph primitives for the simulation core.
//!
//! This crate holds the state that both actors (the player's command pipeline
//! and the autonomous adversary) compete over: an arena of entities related
//! by exclusive ownership ([`graph::WorldGraph`]), and the player's two
//! audited scalar resources ([`ledger::ResourceLedger`]). Generational
//! handles make stale references detectable instead of dangling.
//!
//! # Quick Start
//!
//! ```
//! use fugue_world::prelude::*;
//!
//! let mut graph = WorldGraph::new();
//! let den = graph.spawn(EntityProto::location("den"), None).unwrap();
//! let me = graph.spawn(EntityProto::actor("me", Some(100)), Some(den)).unwrap();
//! let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(den)).unwrap();
//!
//! graph.move_entity(lamp, me).unwrap();
//! assert_eq!(graph.find_first("lamp", Scope::Subtree(me)), Some(lamp));
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod graph;
pub mod ledger;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by world-graph operations. Each names the entity that
/// rejected the operation; none leaves the graph partially mutated.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The handle's slot was recycled or never allocated.
    #[error("entity {id} is stale or was never allocated")]
    StaleEntity { id: entity::EntityId },

    /// The target cannot hold other entities.
    #[error("`{name}` cannot hold other entities")]
    NotAContainer { name: String },

    /// The target has no open/closed state.
    #[error("`{name}` has no open/closed state")]
    NotOpenable { name: String },

    /// Seals and obstructions only apply to locations.
    #[error("`{name}` is not a location")]
    NotALocation { name: String },

    /// The target is an openable in the closed state.
    #[error("`{name}` is closed")]
    Closed { name: String },

    /// The target's cumulative-bulk limit would be exceeded.
    #[error("`{name}` cannot fit that: {need} bulk on top of {used} used, capacity {capacity}")]
    CapacityExceeded {
        name: String,
        capacity: u32,
        used: u32,
        need: u32,
    },

    /// The move would make an entity its own ancestor.
    #[error("moving `{name}` there would create an ownership cycle")]
    WouldCycle { name: String },
}

/// Errors produced by ledger mutations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A guarded debit found the balance short.
    #[error("cannot afford {needed}: only {available} available")]
    InsufficientFunds { needed: i64, available: i64 },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::EntityId;
    pub use crate::graph::{CapabilitySet, EntityProto, FindIter, Scope, SubtreeSnapshot, WorldGraph};
    pub use crate::ledger::{DeltaKind, LedgerDelta, ResourceLedger};
    pub use crate::snapshot::WorldSnapshot;
    pub use crate::{LedgerError, WorldError};
}
