use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Priority given to the root group when it is created, and to tasks
/// that cannot be mapped to a live group.
pub const DEFAULT_PRIORITY: i64 = 1;

/// Handle to a group in the hierarchy
///
/// The generation changes every time a slot is reused, so a handle kept
/// past `destroy_node` never aliases a newer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// What a priority write did to the subtree below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Propagation {
    /// Only the node's own priority changed
    None,
    /// Effective priority raised to `target` across the subtree
    Increased { target: i64, visited: usize },
    /// Effective priority lowered to `floor` at the node, re-derived below it
    Decreased { floor: i64, visited: usize },
}

impl Propagation {
    pub fn visited(&self) -> usize {
        match self {
            Propagation::None => 0,
            Propagation::Increased { visited, .. } | Propagation::Decreased { visited, .. } => {
                *visited
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Propagation::None)
    }
}

/// Point-in-time view of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub priority: i64,
    pub effective_priority: i64,
}

/// Pre-order view of the whole hierarchy
///
/// Not transactional: values are loaded one at a time, so a snapshot taken
/// during a write may mix pre- and post-write values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub cpuset_constraint: bool,
    pub groups: Vec<GroupSnapshot>,
}

impl HierarchySnapshot {
    pub fn get(&self, id: NodeId) -> Option<&GroupSnapshot> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn max_depth(&self) -> usize {
        self.groups.iter().map(|g| g.depth).max().unwrap_or(0)
    }

    /// Groups ordered by effective priority, highest first. Ties keep
    /// traversal order.
    pub fn ranked(&self) -> Vec<&GroupSnapshot> {
        let mut ranked: Vec<&GroupSnapshot> = self.groups.iter().collect();
        ranked.sort_by(|a, b| b.effective_priority.cmp(&a.effective_priority));
        ranked
    }
}

/// A node whose effective priority disagrees with its parent and its own value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub id: NodeId,
    pub expected: i64,
    pub actual: i64,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group {}: effective_priority {} (expected {})",
            self.id, self.actual, self.expected
        )
    }
}

/// Running propagation counters
#[derive(Debug, Default)]
pub struct PropagationStats {
    writes: AtomicU64,
    increases: AtomicU64,
    decreases: AtomicU64,
    nodes_visited: AtomicU64,
}

impl PropagationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, propagation: &Propagation) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        match propagation {
            Propagation::None => {}
            Propagation::Increased { visited, .. } => {
                self.increases.fetch_add(1, Ordering::Relaxed);
                self.nodes_visited.fetch_add(*visited as u64, Ordering::Relaxed);
            }
            Propagation::Decreased { visited, .. } => {
                self.decreases.fetch_add(1, Ordering::Relaxed);
                self.nodes_visited.fetch_add(*visited as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn counters(&self) -> PropagationCounters {
        PropagationCounters {
            writes: self.writes.load(Ordering::Relaxed),
            increases: self.increases.load(Ordering::Relaxed),
            decreases: self.decreases.load(Ordering::Relaxed),
            nodes_visited: self.nodes_visited.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PropagationStats`] for export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationCounters {
    pub writes: u64,
    pub increases: u64,
    pub decreases: u64,
    pub nodes_visited: u64,
}
