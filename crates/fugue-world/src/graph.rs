//! The ownership forest: entities, capabilities, containment, search.
//!
//! Every game object -- locations, containers, items, the player actor -- is
//! an [`Entity`](EntityId) in one arena, tagged with a [`CapabilitySet`]
//! instead of sitting in a class hierarchy. An entity has at most one parent
//! (its container or location); children are kept in insertion order, which
//! makes traversal deterministic. The graph is a forest by construction:
//! [`WorldGraph::move_entity`] refuses any attachment that would make an
//! entity its own ancestor.
//!
//! # Search
//!
//! [`WorldGraph::find`] returns a lazy iterator over name matches in preorder
//! (children before siblings, stable by insertion). It deliberately does
//! *not* filter on open/closed state -- callers that need "reachable through
//! open containers only" combine it with [`WorldGraph::reachable`].
//!
//! ```
//! use fugue_world::prelude::*;
//!
//! let mut graph = WorldGraph::new();
//! let room = graph.spawn(EntityProto::location("den"), None).unwrap();
//! let chest = graph
//!     .spawn(EntityProto::openable("chest", None), Some(room))
//!     .unwrap();
//! let coin = graph
//!     .spawn(EntityProto::item("coin", 1), Some(chest))
//!     .unwrap();
//!
//! // find sees through the closed chest; reachable does not.
//! assert_eq!(graph.find_first("coin", Scope::Subtree(room)), Some(coin));
//! assert!(!graph.reachable(coin, room).unwrap());
//!
//! graph.set_open(chest, true).unwrap();
//! assert!(graph.reachable(coin, room).unwrap());
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entity::{EntityId, SlotAllocator};
use crate::WorldError;

// ---------------------------------------------------------------------------
// CapabilitySet
// ---------------------------------------------------------------------------

/// What an entity can do, as an explicit flag set rather than a type
/// hierarchy. A location is always a container; an actor is always a
/// location-grade container (it can hold an inventory and stand somewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Can hold child entities.
    pub container: bool,
    /// Has a binary open/closed state gating reachability of contents.
    pub openable: bool,
    /// A valid place for an actor to stand; carries seal/obstruction flags.
    pub location: bool,
    /// Represents the player actor.
    pub actor: bool,
}

impl CapabilitySet {
    /// A plain item: no capabilities.
    pub fn item() -> Self {
        Self::default()
    }

    /// A container without a lid.
    pub fn container() -> Self {
        Self {
            container: true,
            ..Self::default()
        }
    }

    /// A container with an open/closed state.
    pub fn openable() -> Self {
        Self {
            container: true,
            openable: true,
            ..Self::default()
        }
    }

    /// A place the actor can stand in.
    pub fn location() -> Self {
        Self {
            container: true,
            location: true,
            ..Self::default()
        }
    }

    /// The player actor.
    pub fn actor() -> Self {
        Self {
            container: true,
            location: true,
            actor: true,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// EntityProto
// ---------------------------------------------------------------------------

/// A blueprint for spawning an entity. Also the payload shape used by
/// delivery events, which create their item at fire time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProto {
    /// Display name; also the key used by [`WorldGraph::find`].
    pub name: String,
    /// Scalar weight cost, counted against container capacity.
    pub bulk: u32,
    /// Capability flags.
    pub caps: CapabilitySet,
    /// Cumulative-bulk limit for containers (`None` = unlimited).
    pub capacity: Option<u32>,
    /// Initial open state; only meaningful for openables.
    pub open: bool,
}

impl EntityProto {
    /// A plain item with the given bulk.
    pub fn item(name: impl Into<String>, bulk: u32) -> Self {
        Self {
            name: name.into(),
            bulk,
            caps: CapabilitySet::item(),
            capacity: None,
            open: false,
        }
    }

    /// An always-open container.
    pub fn container(name: impl Into<String>, capacity: Option<u32>) -> Self {
        Self {
            name: name.into(),
            bulk: 0,
            caps: CapabilitySet::container(),
            capacity,
            open: false,
        }
    }

    /// An openable container, starting closed.
    pub fn openable(name: impl Into<String>, capacity: Option<u32>) -> Self {
        Self {
            name: name.into(),
            bulk: 0,
            caps: CapabilitySet::openable(),
            capacity,
            open: false,
        }
    }

    /// A location the actor can stand in.
    pub fn location(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bulk: 0,
            caps: CapabilitySet::location(),
            capacity: None,
            open: false,
        }
    }

    /// The player actor, with an inventory capacity.
    pub fn actor(name: impl Into<String>, capacity: Option<u32>) -> Self {
        Self {
            name: name.into(),
            bulk: 0,
            caps: CapabilitySet::actor(),
            capacity,
            open: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Arena-resident state for one live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub(crate) name: String,
    pub(crate) bulk: u32,
    pub(crate) caps: CapabilitySet,
    pub(crate) capacity: Option<u32>,
    pub(crate) open: bool,
    pub(crate) sealed: bool,
    pub(crate) obstructed: bool,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Where a [`WorldGraph::find`] search looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Every tree in the graph, roots included.
    Graph,
    /// The descendants of one entity (the entity itself is not a candidate).
    Subtree(EntityId),
}

// ---------------------------------------------------------------------------
// SubtreeSnapshot
// ---------------------------------------------------------------------------

/// A serializable copy of an entity and all of its descendants, used by the
/// command pipeline to make `destroy` reversible. Restoring allocates fresh
/// handles; old handles to the destroyed subtree stay stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtreeSnapshot {
    name: String,
    bulk: u32,
    caps: CapabilitySet,
    capacity: Option<u32>,
    open: bool,
    sealed: bool,
    obstructed: bool,
    children: Vec<SubtreeSnapshot>,
}

impl SubtreeSnapshot {
    /// Display name of the snapshotted root.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// WorldGraph
// ---------------------------------------------------------------------------

/// The shared mutable world: one arena of entities related by exclusive
/// ownership. All structural mutation goes through [`spawn`](Self::spawn),
/// [`move_entity`](Self::move_entity), [`deliver`](Self::deliver) and
/// [`destroy`](Self::destroy), each of which either completes fully or
/// leaves the graph untouched.
#[derive(Debug, Clone, Default)]
pub struct WorldGraph {
    pub(crate) alloc: SlotAllocator,
    pub(crate) records: Vec<Option<Record>>,
    pub(crate) roots: Vec<EntityId>,
}

impl WorldGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            alloc: SlotAllocator::new(),
            records: Vec::new(),
            roots: Vec::new(),
        }
    }

    // -- record access ------------------------------------------------------

    fn record(&self, id: EntityId) -> Result<&Record, WorldError> {
        if !self.alloc.is_alive(id) {
            return Err(WorldError::StaleEntity { id });
        }
        Ok(self.records[id.index() as usize]
            .as_ref()
            .expect("live slot holds a record"))
    }

    fn record_mut(&mut self, id: EntityId) -> Result<&mut Record, WorldError> {
        if !self.alloc.is_alive(id) {
            return Err(WorldError::StaleEntity { id });
        }
        Ok(self.records[id.index() as usize]
            .as_mut()
            .expect("live slot holds a record"))
    }

    /// Whether the handle refers to a live entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.alloc.is_alive(id)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.alloc.live_count()
    }

    /// The root entities, in insertion order.
    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    // -- field accessors ----------------------------------------------------

    /// Display name.
    pub fn name(&self, id: EntityId) -> Result<&str, WorldError> {
        Ok(&self.record(id)?.name)
    }

    /// Own bulk (excluding contents).
    pub fn bulk(&self, id: EntityId) -> Result<u32, WorldError> {
        Ok(self.record(id)?.bulk)
    }

    /// Capability flags.
    pub fn caps(&self, id: EntityId) -> Result<CapabilitySet, WorldError> {
        Ok(self.record(id)?.caps)
    }

    /// Cumulative-bulk capacity limit, if any.
    pub fn capacity(&self, id: EntityId) -> Result<Option<u32>, WorldError> {
        Ok(self.record(id)?.capacity)
    }

    /// Open state. Always `true` for non-openable containers.
    pub fn is_open(&self, id: EntityId) -> Result<bool, WorldError> {
        let rec = self.record(id)?;
        Ok(!rec.caps.openable || rec.open)
    }

    /// Whether a location's confinement seal is engaged.
    pub fn is_sealed(&self, id: EntityId) -> Result<bool, WorldError> {
        Ok(self.record(id)?.sealed)
    }

    /// Whether a location is flagged as obstructed.
    pub fn is_obstructed(&self, id: EntityId) -> Result<bool, WorldError> {
        Ok(self.record(id)?.obstructed)
    }

    /// Parent entity, `None` for roots.
    pub fn parent(&self, id: EntityId) -> Result<Option<EntityId>, WorldError> {
        Ok(self.record(id)?.parent)
    }

    /// Direct children, in insertion order.
    pub fn children(&self, id: EntityId) -> Result<&[EntityId], WorldError> {
        Ok(&self.record(id)?.children)
    }

    // -- state flips --------------------------------------------------------

    /// Set the open state of an openable. Returns the previous state.
    pub fn set_open(&mut self, id: EntityId, open: bool) -> Result<bool, WorldError> {
        let rec = self.record_mut(id)?;
        if !rec.caps.openable {
            return Err(WorldError::NotOpenable {
                name: rec.name.clone(),
            });
        }
        Ok(std::mem::replace(&mut rec.open, open))
    }

    /// Engage or clear a location's confinement seal. Returns the previous state.
    pub fn set_sealed(&mut self, id: EntityId, sealed: bool) -> Result<bool, WorldError> {
        let rec = self.record_mut(id)?;
        if !rec.caps.location {
            return Err(WorldError::NotALocation {
                name: rec.name.clone(),
            });
        }
        Ok(std::mem::replace(&mut rec.sealed, sealed))
    }

    /// Flag or clear a location's obstruction. Returns the previous state.
    pub fn set_obstructed(&mut self, id: EntityId, obstructed: bool) -> Result<bool, WorldError> {
        let rec = self.record_mut(id)?;
        if !rec.caps.location {
            return Err(WorldError::NotALocation {
                name: rec.name.clone(),
            });
        }
        Ok(std::mem::replace(&mut rec.obstructed, obstructed))
    }

    // -- derived queries ----------------------------------------------------

    /// Bulk of an entity plus everything it transitively contains.
    pub fn subtree_bulk(&self, id: EntityId) -> Result<u32, WorldError> {
        let mut total = 0u32;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let rec = self.record(next)?;
            total = total.saturating_add(rec.bulk);
            stack.extend(rec.children.iter().copied());
        }
        Ok(total)
    }

    /// The nearest location in the entity's ancestor chain (the "room" an
    /// entity is in). `None` if the entity floats outside any location.
    pub fn location_of(&self, id: EntityId) -> Result<Option<EntityId>, WorldError> {
        let mut cursor = self.record(id)?.parent;
        while let Some(p) = cursor {
            let rec = self.record(p)?;
            if rec.caps.location {
                return Ok(Some(p));
            }
            cursor = rec.parent;
        }
        Ok(None)
    }

    /// The top of the entity's ownership chain (itself, if a root).
    pub fn root_of(&self, id: EntityId) -> Result<EntityId, WorldError> {
        let mut current = id;
        while let Some(p) = self.record(current)?.parent {
            current = p;
        }
        Ok(current)
    }

    /// Whether every openable strictly between `id` and `from` (exclusive) is
    /// open -- i.e. whether `id` can be touched without opening anything.
    pub fn reachable(&self, id: EntityId, from: EntityId) -> Result<bool, WorldError> {
        let mut cursor = self.record(id)?.parent;
        while let Some(p) = cursor {
            if p == from {
                return Ok(true);
            }
            let rec = self.record(p)?;
            if rec.caps.openable && !rec.open {
                return Ok(false);
            }
            cursor = rec.parent;
        }
        Ok(true)
    }

    // -- search -------------------------------------------------------------

    /// Lazy iterator over entities named `name` inside `scope`, in
    /// deterministic preorder: children before siblings, stable by insertion.
    /// Matches are not unique; callers pick an occurrence by further
    /// constraint (e.g. [`reachable`](Self::reachable)) or take the first.
    pub fn find<'a>(&'a self, name: &'a str, scope: Scope) -> FindIter<'a> {
        let mut stack = Vec::new();
        match scope {
            Scope::Graph => stack.extend(self.roots.iter().rev().copied()),
            Scope::Subtree(root) => {
                if let Ok(rec) = self.record(root) {
                    stack.extend(rec.children.iter().rev().copied());
                }
            }
        }
        FindIter {
            graph: self,
            name,
            stack,
        }
    }

    /// First match of [`find`](Self::find), if any.
    pub fn find_first(&self, name: &str, scope: Scope) -> Option<EntityId> {
        self.find(name, scope).next()
    }

    // -- structural mutation ------------------------------------------------

    /// Spawn an entity from a blueprint, optionally inside a parent.
    ///
    /// Spawning is an authoring-level operation: it enforces that the parent
    /// is a container with room to spare, but does not care whether the
    /// parent is closed (worlds are built with food already in the fridge).
    ///
    /// # Errors
    ///
    /// [`WorldError::NotAContainer`] or [`WorldError::CapacityExceeded`] for
    /// an unsuitable parent; [`WorldError::StaleEntity`] for a dead one.
    pub fn spawn(
        &mut self,
        proto: EntityProto,
        parent: Option<EntityId>,
    ) -> Result<EntityId, WorldError> {
        if let Some(p) = parent {
            self.check_container(p)?;
            self.check_capacity(p, proto.bulk, None)?;
        }

        let id = self.alloc.allocate();
        let idx = id.index() as usize;
        if idx >= self.records.len() {
            self.records.resize_with(idx + 1, || None);
        }
        self.records[idx] = Some(Record {
            name: proto.name,
            bulk: proto.bulk,
            caps: proto.caps,
            capacity: proto.capacity,
            open: proto.open,
            sealed: false,
            obstructed: false,
            parent,
            children: Vec::new(),
        });

        match parent {
            Some(p) => self
                .record_mut(p)
                .expect("parent checked above")
                .children
                .push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Move an entity into a new parent container.
    ///
    /// Validates everything first -- liveness, container capability, the
    /// closed gate, the cycle rule, capacity -- then performs the
    /// detach/attach as one step, so no partial state is ever observable.
    /// Moving an entity onto its current parent is a no-op.
    ///
    /// # Errors
    ///
    /// [`WorldError::Closed`] if the target is a closed openable;
    /// [`WorldError::CapacityExceeded`] if the target's cumulative bulk
    /// limit would be exceeded; [`WorldError::WouldCycle`] if the target
    /// sits inside the moved entity's own subtree.
    pub fn move_entity(&mut self, id: EntityId, new_parent: EntityId) -> Result<(), WorldError> {
        let rec = self.record(id)?;
        if rec.parent == Some(new_parent) {
            return Ok(());
        }
        self.check_container(new_parent)?;

        // Cycle rule: the target must not be the entity or live inside it.
        let mut cursor = Some(new_parent);
        while let Some(p) = cursor {
            if p == id {
                return Err(WorldError::WouldCycle {
                    name: self.record(id)?.name.clone(),
                });
            }
            cursor = self.record(p)?.parent;
        }

        let target = self.record(new_parent)?;
        if target.caps.openable && !target.open {
            return Err(WorldError::Closed {
                name: target.name.clone(),
            });
        }
        self.check_capacity(new_parent, self.subtree_bulk(id)?, Some(id))?;

        self.detach(id);
        self.attach(id, Some(new_parent));
        Ok(())
    }

    /// Index of an entity within its parent's child list (or among the
    /// roots). Sibling order is observable through [`find`](Self::find), so
    /// undo needs to restore it exactly.
    pub fn position_in_parent(&self, id: EntityId) -> Result<usize, WorldError> {
        let rec = self.record(id)?;
        let list = match rec.parent {
            Some(p) => &self.record(p)?.children,
            None => &self.roots,
        };
        Ok(list
            .iter()
            .position(|c| *c == id)
            .expect("entity is present in its parent's child list"))
    }

    /// Put an entity back under `parent` at a specific sibling `index`
    /// (clamped to the list length), or among the roots for `None`.
    ///
    /// This is the undo arm of [`move_entity`](Self::move_entity): it
    /// enforces the container, cycle and capacity rules but not the closed
    /// gate -- restoring prior state is not a player reaching into a box.
    pub fn reattach_at(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
        index: usize,
    ) -> Result<(), WorldError> {
        self.record(id)?;
        if let Some(p) = parent {
            self.check_container(p)?;
            let mut cursor = Some(p);
            while let Some(x) = cursor {
                if x == id {
                    return Err(WorldError::WouldCycle {
                        name: self.record(id)?.name.clone(),
                    });
                }
                cursor = self.record(x)?.parent;
            }
            if self.record(id)?.parent != Some(p) {
                self.check_capacity(p, self.subtree_bulk(id)?, Some(id))?;
            }
        }
        self.detach(id);
        self.attach_at(id, parent, index);
        Ok(())
    }

    /// Spawn a delivered parcel into `dest`, falling back to the nearest
    /// enclosing location when `dest` is closed or full -- couriers leave
    /// parcels at the door rather than taking them away again.
    ///
    /// Returns the new entity and where it actually landed.
    pub fn deliver(
        &mut self,
        proto: &EntityProto,
        dest: EntityId,
    ) -> Result<(EntityId, EntityId), WorldError> {
        let fits = self.check_container(dest).is_ok()
            && self.is_open(dest)?
            && self.check_capacity(dest, proto.bulk, None).is_ok();

        let target = if fits {
            dest
        } else {
            let fallback = match self.location_of(dest)? {
                Some(loc) => loc,
                None => self.root_of(dest)?,
            };
            warn!(
                item = %proto.name,
                dest = %self.record(dest)?.name,
                fallback = %self.record(fallback)?.name,
                "delivery destination unavailable, leaving parcel at enclosing location"
            );
            fallback
        };

        let id = self.spawn(proto.clone(), Some(target))?;
        Ok((id, target))
    }

    /// Destroy an entity and its whole subtree. All handles into the subtree
    /// go stale. Not reversible at this layer; callers that need undo capture
    /// a [`subtree_snapshot`](Self::subtree_snapshot) first.
    pub fn destroy(&mut self, id: EntityId) -> Result<(), WorldError> {
        self.record(id)?;
        self.detach(id);

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let idx = next.index() as usize;
            if let Some(rec) = self.records[idx].take() {
                stack.extend(rec.children);
            }
            self.alloc.free(next);
        }
        Ok(())
    }

    // -- snapshot / restore of subtrees -------------------------------------

    /// Capture an entity and all descendants as a serializable tree.
    pub fn subtree_snapshot(&self, id: EntityId) -> Result<SubtreeSnapshot, WorldError> {
        let rec = self.record(id)?;
        let mut children = Vec::with_capacity(rec.children.len());
        for child in &rec.children {
            children.push(self.subtree_snapshot(*child)?);
        }
        Ok(SubtreeSnapshot {
            name: rec.name.clone(),
            bulk: rec.bulk,
            caps: rec.caps,
            capacity: rec.capacity,
            open: rec.open,
            sealed: rec.sealed,
            obstructed: rec.obstructed,
            children,
        })
    }

    /// Rebuild a captured subtree under `parent` at a specific sibling
    /// index, with fresh handles.
    pub fn restore_subtree_at(
        &mut self,
        snap: &SubtreeSnapshot,
        parent: Option<EntityId>,
        index: usize,
    ) -> Result<EntityId, WorldError> {
        let id = self.restore_subtree(snap, parent)?;
        self.detach(id);
        self.attach_at(id, parent, index);
        Ok(id)
    }

    /// Rebuild a captured subtree under `parent` (or as a new root), with
    /// fresh handles. Bypasses the closed gate, like [`spawn`](Self::spawn).
    pub fn restore_subtree(
        &mut self,
        snap: &SubtreeSnapshot,
        parent: Option<EntityId>,
    ) -> Result<EntityId, WorldError> {
        let id = self.spawn(
            EntityProto {
                name: snap.name.clone(),
                bulk: snap.bulk,
                caps: snap.caps,
                capacity: snap.capacity,
                open: snap.open,
            },
            parent,
        )?;
        {
            let rec = self.record_mut(id)?;
            rec.sealed = snap.sealed;
            rec.obstructed = snap.obstructed;
        }
        for child in &snap.children {
            self.restore_subtree(child, Some(id))?;
        }
        Ok(id)
    }

    // -- internals ----------------------------------------------------------

    fn check_container(&self, id: EntityId) -> Result<(), WorldError> {
        let rec = self.record(id)?;
        if !rec.caps.container {
            return Err(WorldError::NotAContainer {
                name: rec.name.clone(),
            });
        }
        Ok(())
    }

    /// Verify `need` more bulk fits into `id`, optionally ignoring one child
    /// (for moves within the same container hierarchy).
    fn check_capacity(
        &self,
        id: EntityId,
        need: u32,
        ignore: Option<EntityId>,
    ) -> Result<(), WorldError> {
        let rec = self.record(id)?;
        let Some(capacity) = rec.capacity else {
            return Ok(());
        };
        let mut used = 0u32;
        for child in &rec.children {
            if Some(*child) == ignore {
                continue;
            }
            used = used.saturating_add(self.subtree_bulk(*child)?);
        }
        if used.saturating_add(need) > capacity {
            return Err(WorldError::CapacityExceeded {
                name: rec.name.clone(),
                capacity,
                used,
                need,
            });
        }
        Ok(())
    }

    fn detach(&mut self, id: EntityId) {
        let parent = self.records[id.index() as usize]
            .as_ref()
            .and_then(|r| r.parent);
        match parent {
            Some(p) => {
                if let Some(rec) = self.records[p.index() as usize].as_mut() {
                    rec.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    fn attach(&mut self, id: EntityId, parent: Option<EntityId>) {
        if let Some(rec) = self.records[id.index() as usize].as_mut() {
            rec.parent = parent;
        }
        match parent {
            Some(p) => {
                if let Some(rec) = self.records[p.index() as usize].as_mut() {
                    rec.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
    }

    fn attach_at(&mut self, id: EntityId, parent: Option<EntityId>, index: usize) {
        if let Some(rec) = self.records[id.index() as usize].as_mut() {
            rec.parent = parent;
        }
        match parent {
            Some(p) => {
                if let Some(rec) = self.records[p.index() as usize].as_mut() {
                    let at = index.min(rec.children.len());
                    rec.children.insert(at, id);
                }
            }
            None => {
                let at = index.min(self.roots.len());
                self.roots.insert(at, id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FindIter
// ---------------------------------------------------------------------------

/// Lazy preorder name search over the graph. See [`WorldGraph::find`].
#[derive(Debug)]
pub struct FindIter<'a> {
    graph: &'a WorldGraph,
    name: &'a str,
    stack: Vec<EntityId>,
}

impl Iterator for FindIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Ok(rec) = self.graph.record(id) else {
                continue;
            };
            // Children before siblings: push in reverse so the first child
            // is visited next.
            self.stack.extend(rec.children.iter().rev().copied());
            if rec.name == self.name {
                return Some(id);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
