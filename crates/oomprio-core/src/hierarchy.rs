//! The OOM priority hierarchy and its control surface
//!
//! [`OomHierarchy`] ties the node store, the hierarchy lock and the cpuset
//! constraint flag together. Lifecycle hooks come from whoever owns the
//! group tree; priority writes come from the control files; reads come from
//! the eviction logic and never wait on propagation.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::constraint::ConstraintFlag;
use crate::error::{Error, Result};
use crate::lock::HierarchyLock;
use crate::propagation;
use crate::store::NodeStore;
use crate::types::{
    GroupSnapshot, HierarchySnapshot, InvariantViolation, NodeId, Propagation,
    PropagationCounters, PropagationStats,
};

#[derive(Debug, Default)]
pub struct OomHierarchy {
    store: NodeStore,
    lock: HierarchyLock,
    constraint: ConstraintFlag,
    stats: PropagationStats,
}

impl OomHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy that holds at most `max_groups` groups
    pub fn with_limit(max_groups: usize) -> Self {
        Self {
            store: NodeStore::with_limit(max_groups),
            ..Self::default()
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn root(&self) -> Option<NodeId> {
        self.store.root()
    }

    pub fn group_limit(&self) -> Option<usize> {
        self.store.limit()
    }

    /// Lifecycle hook: a group was instantiated under `parent`
    ///
    /// Creating the root clears the cpuset constraint flag.
    pub fn on_group_created(&self, parent: Option<NodeId>) -> Result<NodeId> {
        let id = self.store.create_node(parent)?;
        if parent.is_none() {
            self.constraint.reset();
            info!("Root group {} created, cpuset constraint cleared", id);
        }
        Ok(id)
    }

    /// Lifecycle hook: a group was removed. No propagation happens.
    pub fn on_group_destroyed(&self, id: NodeId) -> Result<()> {
        self.store.destroy_node(id)
    }

    pub fn read_priority(&self, id: NodeId) -> Result<i64> {
        self.store.get(id).map(|(priority, _)| priority)
    }

    /// Set a group's own priority and restore the effective priority of
    /// its subtree
    ///
    /// Raising above the current effective value pushes the new value down.
    /// Lowering a group that was itself the source of its effective value
    /// re-derives the subtree from the larger of the new value and the
    /// parent's effective priority. Anything else only stores the value.
    pub fn write_priority(&self, id: NodeId, value: i64) -> Result<Propagation> {
        let guard = self.lock.lock();
        let arena = self.store.read();

        let entry = arena.entry(id)?;
        let old_priority = entry.cell.priority();
        let current_effective = entry.cell.effective_priority();
        entry.cell.set_priority(value);

        let propagation = if value > current_effective {
            let visited = propagation::increase(&guard, &arena, id, value)?;
            Propagation::Increased {
                target: value,
                visited,
            }
        } else if current_effective == old_priority && value < current_effective {
            let floor = match entry.parent {
                None => value,
                Some(parent) => {
                    let parent_effective = arena.cell(parent)?.effective_priority();
                    value.max(parent_effective)
                }
            };
            let visited = propagation::decrease(&guard, &arena, id, floor)?;
            Propagation::Decreased { floor, visited }
        } else {
            Propagation::None
        };

        drop(arena);
        drop(guard);

        debug!(
            "Group {} priority {} -> {} ({:?})",
            id, old_priority, value, propagation
        );
        self.stats.record(&propagation);
        Ok(propagation)
    }

    /// Set the cpuset constraint flag through the root group's control entry
    pub fn write_constraint(&self, id: NodeId, value: u64) -> Result<()> {
        self.ensure_root(id)?;
        self.constraint.set_raw(value)?;
        info!("cpuset constraint set to {}", value);
        Ok(())
    }

    pub fn read_constraint(&self) -> bool {
        self.constraint.get()
    }

    pub fn is_root(&self, id: NodeId) -> Result<bool> {
        let arena = self.store.read();
        arena.entry(id)?;
        Ok(arena.root() == Some(id))
    }

    pub(crate) fn ensure_root(&self, id: NodeId) -> Result<()> {
        if self.is_root(id)? {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "cpuset_constraint is only available on the root group, not {}",
                id
            )))
        }
    }

    /// Pre-order view of every group reachable from the root
    pub fn snapshot(&self) -> HierarchySnapshot {
        let arena = self.store.read();
        let mut groups = Vec::with_capacity(arena.len());

        if let Some(root) = arena.root() {
            if let Ok(entry) = arena.entry(root) {
                groups.push(GroupSnapshot {
                    id: root,
                    parent: None,
                    depth: 0,
                    priority: entry.cell.priority(),
                    effective_priority: entry.cell.effective_priority(),
                });
            }
            if let Ok(descendants) = arena.descendants(root) {
                groups.extend(descendants.map(|(id, depth, entry)| GroupSnapshot {
                    id,
                    parent: entry.parent,
                    depth,
                    priority: entry.cell.priority(),
                    effective_priority: entry.cell.effective_priority(),
                }));
            }
        }

        HierarchySnapshot {
            cpuset_constraint: self.constraint.get(),
            groups,
        }
    }

    /// Every reachable group whose effective priority is not
    /// `max(priority, effective(parent))`, or `priority` for the root
    ///
    /// Holds the hierarchy lock so no propagation is mid-flight.
    pub fn check_invariant(&self) -> Vec<InvariantViolation> {
        let _guard = self.lock.lock();
        let snapshot = self.snapshot();

        let effective: HashMap<NodeId, i64> = snapshot
            .groups
            .iter()
            .map(|group| (group.id, group.effective_priority))
            .collect();

        let mut violations = Vec::new();
        for group in &snapshot.groups {
            let expected = match group.parent.and_then(|parent| effective.get(&parent)) {
                Some(&parent_effective) => group.priority.max(parent_effective),
                None => group.priority,
            };
            if group.effective_priority != expected {
                violations.push(InvariantViolation {
                    id: group.id,
                    expected,
                    actual: group.effective_priority,
                });
            }
        }
        violations
    }

    pub fn stats(&self) -> PropagationCounters {
        self.stats.counters()
    }
}
