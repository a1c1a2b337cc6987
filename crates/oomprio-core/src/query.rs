//! Read side for the eviction logic
//!
//! Nothing here takes the hierarchy lock. A read that races a propagation
//! may see the value from before or after the write, never a torn one.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use crate::error::Result;
use crate::hierarchy::OomHierarchy;
use crate::store::NodeHandle;
use crate::types::{NodeId, DEFAULT_PRIORITY};

/// Maps a task (process, thread, container...) to its current group
pub trait GroupResolver<T: ?Sized> {
    fn group_of(&self, task: &T) -> Option<NodeId>;
}

impl<T, S> GroupResolver<T> for HashMap<T, NodeId, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn group_of(&self, task: &T) -> Option<NodeId> {
        self.get(task).copied()
    }
}

impl OomHierarchy {
    /// Effective priority of a group
    pub fn read_effective(&self, id: NodeId) -> Result<i64> {
        // Store guard lives only inside `get`.
        let (_, effective) = self.store().get(id)?;
        Ok(effective)
    }

    /// Handle for repeated reads without going through the store
    pub fn handle(&self, id: NodeId) -> Result<NodeHandle> {
        self.store().handle(id)
    }
}

/// Effective priority of the group `task` belongs to
///
/// Tasks without a live group rank at [`DEFAULT_PRIORITY`].
pub fn task_oom_priority<T, R>(hierarchy: &OomHierarchy, resolver: &R, task: &T) -> i64
where
    T: ?Sized,
    R: GroupResolver<T> + ?Sized,
{
    resolver
        .group_of(task)
        .and_then(|id| hierarchy.read_effective(id).ok())
        .unwrap_or(DEFAULT_PRIORITY)
}
