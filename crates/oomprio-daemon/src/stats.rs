//! Statistics export for dashboards
//!
//! A JSON snapshot of the hierarchy, written after every reconcile pass so
//! an external viewer can follow effective priorities without linking the
//! core library.

use chrono::{DateTime, Utc};
use oomprio_core::PropagationCounters;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::manager::GroupManager;

/// Complete statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyStats {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Seconds since the daemon started
    pub runtime_secs: u64,

    /// Reconcile passes performed
    pub reconciles: u64,

    /// Groups reachable from the root
    pub total_groups: usize,

    /// Deepest group, root is 0
    pub max_depth: usize,

    /// Root-level cpuset constraint switch
    pub cpuset_constraint: bool,

    /// Propagation counters since start
    pub propagation: PropagationCounters,

    /// Groups by effective priority, highest (first to be reclaimed) first
    pub groups: Vec<GroupStats>,
}

/// Per-group entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub path: String,
    pub depth: usize,
    pub priority: i64,
    pub effective_priority: i64,
}

impl HierarchyStats {
    pub fn collect(manager: &GroupManager, started: DateTime<Utc>, reconciles: u64) -> Self {
        let now = Utc::now();
        let labelled = manager.snapshot_by_path();
        let hierarchy = manager.hierarchy();

        let mut groups: Vec<GroupStats> = labelled
            .iter()
            .map(|(path, group)| GroupStats {
                path: path.to_string(),
                depth: group.depth,
                priority: group.priority,
                effective_priority: group.effective_priority,
            })
            .collect();
        groups.sort_by(|a, b| b.effective_priority.cmp(&a.effective_priority));

        Self {
            timestamp: now,
            runtime_secs: (now - started).num_seconds().max(0) as u64,
            reconciles,
            total_groups: labelled.len(),
            max_depth: labelled.iter().map(|(_, g)| g.depth).max().unwrap_or(0),
            cpuset_constraint: hierarchy.read_constraint(),
            propagation: hierarchy.stats(),
            groups,
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
