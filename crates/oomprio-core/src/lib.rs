//! OOMPrio Core Library
//!
//! Hierarchical OOM priority overrides: a tree of groups where every group's
//! effective priority is the larger of its own priority and its parent's
//! effective priority. Writes restore that invariant incrementally under one
//! hierarchy-wide lock; reads are single atomic loads and never wait.

pub mod attributes;
pub mod constraint;
pub mod error;
pub mod hierarchy;
pub mod lock;
mod propagation;
pub mod query;
pub mod store;
pub mod types;

pub use attributes::Attribute;
pub use constraint::ConstraintFlag;
pub use error::{Error, Result};
pub use hierarchy::OomHierarchy;
pub use lock::HierarchyLock;
pub use query::{task_oom_priority, GroupResolver};
pub use store::{NodeHandle, NodeStore};
pub use types::{
    GroupSnapshot, HierarchySnapshot, InvariantViolation, NodeId, Propagation,
    PropagationCounters, PropagationStats, DEFAULT_PRIORITY,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
