//! Node store: per-group priority cells and the parent/child links between them
//!
//! Groups live in a generational arena. Structure (slots, links) sits behind
//! one `RwLock`; the priority values themselves are atomics in a shared
//! [`NodeCell`], so readers holding a [`NodeHandle`] never touch a lock.

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{NodeId, DEFAULT_PRIORITY};

/// The two numbers a group carries
#[derive(Debug)]
pub struct NodeCell {
    priority: AtomicI64,
    effective_priority: AtomicI64,
}

impl NodeCell {
    fn new(priority: i64, effective_priority: i64) -> Self {
        Self {
            priority: AtomicI64::new(priority),
            effective_priority: AtomicI64::new(effective_priority),
        }
    }

    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    pub fn effective_priority(&self) -> i64 {
        self.effective_priority.load(Ordering::Acquire)
    }

    pub(crate) fn set_priority(&self, value: i64) {
        self.priority.store(value, Ordering::Release);
    }

    pub(crate) fn set_effective_priority(&self, value: i64) {
        self.effective_priority.store(value, Ordering::Release);
    }
}

/// Lock-free read handle to one group's values
///
/// Stays readable after the group is destroyed; it then reports the last
/// values the group held.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    cell: Arc<NodeCell>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn priority(&self) -> i64 {
        self.cell.priority()
    }

    pub fn effective_priority(&self) -> i64 {
        self.cell.effective_priority()
    }
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) cell: Arc<NodeCell>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Slot table behind the store lock
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
    max_groups: Option<usize>,
}

impl Arena {
    pub(crate) fn entry(&self, id: NodeId) -> Result<&Entry> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(Error::NotFound(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut Entry> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(Error::NotFound(id))
    }

    pub(crate) fn cell(&self, id: NodeId) -> Result<&NodeCell> {
        self.entry(id).map(|entry| entry.cell.as_ref())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pre-order walk below `start`, first child first. `start` itself is
    /// not yielded.
    pub(crate) fn descendants(&self, start: NodeId) -> Result<Descendants<'_>> {
        let entry = self.entry(start)?;
        Ok(Descendants {
            arena: self,
            stack: entry.children.iter().rev().map(|&id| (id, 1)).collect(),
        })
    }

    fn insert(&mut self, parent: Option<NodeId>, cell: NodeCell) -> Result<NodeId> {
        if let Some(limit) = self.max_groups {
            if self.len >= limit {
                return Err(Error::AllocationFailure(format!(
                    "group limit reached (limit: {})",
                    limit
                )));
            }
        }

        // Reserve everything up front so a failure leaves the tree untouched.
        if self.free.is_empty() {
            self.slots.try_reserve(1).map_err(|e| {
                Error::AllocationFailure(format!("cannot grow group table: {}", e))
            })?;
        }
        if let Some(parent) = parent {
            self.entry_mut(parent)?
                .children
                .try_reserve(1)
                .map_err(|e| {
                    Error::AllocationFailure(format!("cannot grow child list: {}", e))
                })?;
        }

        let entry = Entry {
            cell: Arc::new(cell),
            parent,
            children: Vec::new(),
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    Error::AllocationFailure("group index space exhausted".to_string())
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                NodeId::new(index, 0)
            }
        };

        match parent {
            Some(parent) => self.entry_mut(parent)?.children.push(id),
            None => self.root = Some(id),
        }
        self.len += 1;

        Ok(id)
    }

    fn remove(&mut self, id: NodeId) -> Result<Entry> {
        self.entry(id)?;

        let slot = &mut self.slots[id.index()];
        let entry = slot.entry.take().ok_or(Error::NotFound(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.len -= 1;

        match entry.parent {
            Some(parent) => {
                if let Ok(parent) = self.entry_mut(parent) {
                    parent.children.retain(|&child| child != id);
                }
            }
            None => {
                if self.root == Some(id) {
                    self.root = None;
                }
            }
        }

        for &child in &entry.children {
            if let Ok(orphan) = self.entry_mut(child) {
                orphan.parent = None;
            }
        }

        Ok(entry)
    }
}

/// Iterator returned by [`Arena::descendants`], yields `(id, depth)` with
/// depth counted from the walk's start
pub(crate) struct Descendants<'a> {
    arena: &'a Arena,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = (NodeId, usize, &'a Entry);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let entry = match self.arena.entry(id) {
            Ok(entry) => entry,
            Err(_) => panic!("corrupt hierarchy: linked group {} is missing", id),
        };
        self.stack
            .extend(entry.children.iter().rev().map(|&child| (child, depth + 1)));
        Some((id, depth, entry))
    }
}

/// Owner of every group's state
#[derive(Debug, Default)]
pub struct NodeStore {
    arena: RwLock<Arena>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses to hold more than `max_groups` groups
    pub fn with_limit(max_groups: usize) -> Self {
        Self {
            arena: RwLock::new(Arena {
                max_groups: Some(max_groups),
                ..Arena::default()
            }),
        }
    }

    /// Most groups the store will hold, root included
    pub fn limit(&self) -> Option<usize> {
        self.arena.read().max_groups
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read()
    }

    /// Create a group under `parent`, or the root when `parent` is `None`
    ///
    /// A root starts at [`DEFAULT_PRIORITY`]; any other group copies its
    /// parent's current priority and effective priority.
    pub fn create_node(&self, parent: Option<NodeId>) -> Result<NodeId> {
        let mut arena = self.arena.write();

        let cell = match parent {
            None => {
                if let Some(root) = arena.root {
                    return Err(Error::InvalidOperation(format!(
                        "hierarchy already has root group {}",
                        root
                    )));
                }
                NodeCell::new(DEFAULT_PRIORITY, DEFAULT_PRIORITY)
            }
            Some(parent) => {
                let parent_cell = arena.cell(parent)?;
                NodeCell::new(parent_cell.priority(), parent_cell.effective_priority())
            }
        };

        let id = arena.insert(parent, cell)?;
        debug!("Created group {} (parent: {:?})", id, parent);
        Ok(id)
    }

    /// Release a group and unlink it from its parent
    ///
    /// Children are expected to be gone already. Any that remain are
    /// detached: they keep their values but are no longer reached from
    /// above.
    pub fn destroy_node(&self, id: NodeId) -> Result<()> {
        let entry = self.arena.write().remove(id)?;

        if !entry.children.is_empty() {
            warn!(
                "Destroyed group {} with {} live children, detaching them",
                id,
                entry.children.len()
            );
        }
        debug!("Destroyed group {}", id);
        Ok(())
    }

    /// `(priority, effective_priority)` of a group
    pub fn get(&self, id: NodeId) -> Result<(i64, i64)> {
        let arena = self.arena.read();
        let cell = arena.cell(id)?;
        Ok((cell.priority(), cell.effective_priority()))
    }

    pub fn set_priority_raw(&self, id: NodeId, value: i64) -> Result<()> {
        self.arena.read().cell(id)?.set_priority(value);
        Ok(())
    }

    pub fn set_effective_raw(&self, id: NodeId, value: i64) -> Result<()> {
        self.arena.read().cell(id)?.set_effective_priority(value);
        Ok(())
    }

    /// Children in traversal order
    pub fn children_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.arena.read().entry(id)?.children.clone())
    }

    pub fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.arena.read().entry(id)?.parent)
    }

    pub fn handle(&self, id: NodeId) -> Result<NodeHandle> {
        let arena = self.arena.read();
        let entry = arena.entry(id)?;
        Ok(NodeHandle {
            id,
            cell: Arc::clone(&entry.cell),
        })
    }

    pub fn root(&self) -> Option<NodeId> {
        self.arena.read().root()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.read().entry(id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }
}
