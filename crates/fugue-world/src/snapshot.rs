//! Whole-graph snapshot and restore.
//!
//! [`WorldSnapshot`] captures the arena exactly -- slot generations, free
//! list, records, root order -- so a restored graph accepts the same handles
//! that were live at capture time. This is what makes session persistence
//! work: undo tokens and pending events hold [`EntityId`]s, and those must
//! stay valid across a save/load round trip.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, SlotAllocator};
use crate::graph::{Record, WorldGraph};

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// A serializable copy of the full world graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    alloc: SlotAllocator,
    records: Vec<Option<Record>>,
    roots: Vec<EntityId>,
}

impl WorldGraph {
    /// Capture the graph, handles and all.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            alloc: self.alloc.clone(),
            records: self.records.clone(),
            roots: self.roots.clone(),
        }
    }

    /// Rebuild a graph from a snapshot. Handles captured before the snapshot
    /// were taken remain valid against the restored graph.
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            alloc: snapshot.alloc,
            records: snapshot.records,
            roots: snapshot.roots,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityProto, Scope};

    #[test]
    fn snapshot_preserves_handles_and_order() {
        let mut graph = WorldGraph::new();
        let den = graph.spawn(EntityProto::location("den"), None).unwrap();
        let chest = graph
            .spawn(EntityProto::openable("chest", None), Some(den))
            .unwrap();
        let coin = graph
            .spawn(EntityProto::item("coin", 1), Some(chest))
            .unwrap();

        // Destroy and respawn something so generations diverge from zero.
        graph.destroy(coin).unwrap();
        let coin2 = graph
            .spawn(EntityProto::item("coin", 1), Some(chest))
            .unwrap();
        assert_ne!(coin, coin2);

        let snap = graph.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let restored = WorldGraph::from_snapshot(serde_json::from_str(&json).unwrap());

        assert!(restored.contains(coin2));
        assert!(!restored.contains(coin), "stale handles stay stale");
        assert_eq!(restored.name(chest).unwrap(), "chest");
        assert_eq!(restored.find_first("coin", Scope::Graph), Some(coin2));
        assert_eq!(restored.roots(), graph.roots());
    }
}
