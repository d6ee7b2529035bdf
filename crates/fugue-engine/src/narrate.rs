//! Structured narration records for the presentation layer.
//!
//! The core never formats player-facing prose. Instead, every observable
//! consequence -- a command effect, a fired event, an adversary action --
//! appends a typed [`Narration`] record (kind + parameters) to the session's
//! [`NarrationLog`]. The excluded presentation layer drains the log and
//! renders whatever text it likes.

use serde::{Deserialize, Serialize};

use crate::clock::GameTime;

// ---------------------------------------------------------------------------
// Narration
// ---------------------------------------------------------------------------

/// One narration record. Parameters are display names, not handles, so the
/// record stays meaningful even after the entities involved are gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Narration {
    /// An entity was moved into a container.
    Moved { entity: String, to: String },
    /// The actor picked something up.
    Taken { entity: String },
    /// The actor changed location.
    Entered { location: String },
    /// An openable was opened.
    Opened { entity: String },
    /// An openable was closed.
    Closed { entity: String },
    /// A location's confinement seal was engaged.
    Sealed { location: String },
    /// A location's confinement seal was cleared.
    SealCleared { location: String },
    /// A location was barricaded.
    Obstructed { location: String },
    /// A location's barricade was cleared.
    ObstructionCleared { location: String },
    /// An entity (and its contents) was destroyed.
    Destroyed { entity: String },
    /// Currency came in.
    FundsCredited { amount: i64 },
    /// Currency went out.
    FundsDebited { amount: i64 },
    /// Vitality was regained.
    VitalityGained { to: i64 },
    /// A scheduled parcel arrived.
    ItemDelivered { item: String, dest: String },
    /// An order was placed for future delivery.
    OrderPlaced { item: String, eta: GameTime },
    /// The adversary finished a device component.
    ComponentBuilt { component: String },
    /// The device went live. Terminal.
    DeviceActivated,
    /// The adversary spent its whole turn breaking out of a stall.
    AdversaryStalled { location: String },
    /// A command was reversed.
    Undone { label: String },
    /// A reversed command was replayed.
    Redone { label: String },
}

// ---------------------------------------------------------------------------
// NarrationLog
// ---------------------------------------------------------------------------

/// Accumulates [`Narration`] records in occurrence order until the
/// presentation layer drains them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationLog {
    records: Vec<Narration>,
}

impl NarrationLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: Narration) {
        self.records.push(record);
    }

    /// All records since the last drain, oldest first.
    pub fn records(&self) -> &[Narration] {
        &self.records
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take every pending record, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Narration> {
        std::mem::take(&mut self.records)
    }

    /// Drop records past `len`. Used when a failed command rolls back its
    /// partially applied effects: their narration goes with them.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }
}
