use oomprio_core::{GroupSnapshot, NodeId, OomHierarchy, Propagation};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, GroupConfig};
use crate::error::{DaemonError, Result};
use crate::layout::GroupPath;

/// What one reconcile pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub destroyed: usize,
    pub updated: usize,
    pub nodes_visited: usize,
    pub constraint_changed: bool,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        *self == ApplyReport::default()
    }
}

/// Owns the shape of the hierarchy on behalf of a declared layout
///
/// Plays the group-membership manager: it creates and destroys groups
/// through the lifecycle hooks, keeping a path for each one, and forwards
/// declared priorities to the control surface.
pub struct GroupManager {
    hierarchy: Arc<OomHierarchy>,
    groups: BTreeMap<GroupPath, NodeId>,
}

impl GroupManager {
    /// Create a manager over a fresh hierarchy holding at most `max_groups`
    pub fn new(max_groups: usize) -> Result<Self> {
        let hierarchy = Arc::new(OomHierarchy::with_limit(max_groups));
        let root = hierarchy.on_group_created(None)?;

        let mut groups = BTreeMap::new();
        groups.insert(GroupPath::root(), root);

        Ok(Self { hierarchy, groups })
    }

    /// Build the hierarchy described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut manager = Self::new(config.hierarchy.max_groups)?;
        manager.apply(&config.groups, config.hierarchy.cpuset_constraint)?;
        Ok(manager)
    }

    pub fn hierarchy(&self) -> &Arc<OomHierarchy> {
        &self.hierarchy
    }

    pub fn root(&self) -> NodeId {
        self.groups[&GroupPath::root()]
    }

    pub fn id_of(&self, path: &GroupPath) -> Option<NodeId> {
        self.groups.get(path).copied()
    }

    pub fn path_of(&self, id: NodeId) -> Option<&GroupPath> {
        self.groups
            .iter()
            .find(|(_, group)| **group == id)
            .map(|(path, _)| path)
    }

    /// Known groups, parents before children
    pub fn groups(&self) -> impl Iterator<Item = (&GroupPath, NodeId)> {
        self.groups.iter().map(|(path, &id)| (path, id))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn write_priority(&self, path: &GroupPath, value: i64) -> Result<Propagation> {
        let id = self
            .id_of(path)
            .ok_or_else(|| DaemonError::UnknownGroup(path.to_string()))?;
        Ok(self.hierarchy.write_priority(id, value)?)
    }

    /// Bring the hierarchy in line with `layout`
    ///
    /// Groups missing from the layout are destroyed deepest first, new
    /// groups (and their undeclared ancestors) are created parent first,
    /// then declared priorities that differ are written. A group whose
    /// priority is dropped from the layout keeps its current value.
    pub fn apply(
        &mut self,
        layout: &[GroupConfig],
        cpuset_constraint: bool,
    ) -> Result<ApplyReport> {
        let mut desired: BTreeMap<GroupPath, Option<i64>> = BTreeMap::new();
        desired.insert(GroupPath::root(), None);
        for group in layout {
            for ancestor in group.path.ancestors() {
                desired.entry(ancestor).or_insert(None);
            }
            desired.insert(group.path.clone(), group.priority);
        }

        // Checked before anything changes so a refused layout leaves the
        // hierarchy as it was
        if let Some(limit) = self.hierarchy.group_limit() {
            if desired.len() > limit {
                return Err(oomprio_core::Error::AllocationFailure(format!(
                    "layout needs {} groups (limit: {})",
                    desired.len(),
                    limit
                ))
                .into());
            }
        }

        let mut report = ApplyReport::default();

        let mut stale: Vec<GroupPath> = self
            .groups
            .keys()
            .filter(|path| !desired.contains_key(*path))
            .cloned()
            .collect();
        stale.sort_by_key(|path| std::cmp::Reverse(path.depth()));
        for path in stale {
            if let Some(id) = self.groups.remove(&path) {
                self.hierarchy.on_group_destroyed(id)?;
                debug!("Destroyed group {} ({})", path, id);
                report.destroyed += 1;
            }
        }

        // BTreeMap order puts every parent ahead of its children.
        for path in desired.keys() {
            if self.groups.contains_key(path) {
                continue;
            }
            let parent = path
                .parent()
                .and_then(|parent| self.id_of(&parent))
                .ok_or_else(|| DaemonError::UnknownGroup(path.to_string()))?;
            let id = self.hierarchy.on_group_created(Some(parent))?;
            debug!("Created group {} ({})", path, id);
            self.groups.insert(path.clone(), id);
            report.created += 1;
        }

        for (path, priority) in &desired {
            let Some(value) = *priority else { continue };
            let id = self.groups[path];
            if self.hierarchy.read_priority(id)? == value {
                continue;
            }
            let propagation = self.hierarchy.write_priority(id, value)?;
            debug!("Set {} priority to {} ({:?})", path, value, propagation);
            report.updated += 1;
            report.nodes_visited += propagation.visited();
        }

        if self.hierarchy.read_constraint() != cpuset_constraint {
            self.hierarchy
                .write_constraint(self.root(), u64::from(cpuset_constraint))?;
            report.constraint_changed = true;
        }

        if !report.is_noop() {
            info!(
                "Layout applied: created={}, destroyed={}, updated={}, visited={}, constraint_changed={}",
                report.created,
                report.destroyed,
                report.updated,
                report.nodes_visited,
                report.constraint_changed
            );
        }
        Ok(report)
    }

    /// Snapshot of the hierarchy in traversal order, labelled by path
    pub fn snapshot_by_path(&self) -> Vec<(GroupPath, GroupSnapshot)> {
        let paths: HashMap<NodeId, &GroupPath> =
            self.groups.iter().map(|(path, &id)| (id, path)).collect();

        self.hierarchy
            .snapshot()
            .groups
            .into_iter()
            .filter_map(|group| {
                let path = paths.get(&group.id)?;
                Some(((*path).clone(), group))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(path: &str, priority: Option<i64>) -> GroupConfig {
        GroupConfig::new(path, priority).unwrap()
    }

    fn path(s: &str) -> GroupPath {
        s.parse().unwrap()
    }

    fn effective(manager: &GroupManager, p: &str) -> i64 {
        let id = manager.id_of(&path(p)).unwrap();
        manager.hierarchy().read_effective(id).unwrap()
    }

    #[test]
    fn test_new_has_root() {
        let manager = GroupManager::new(16).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.id_of(&GroupPath::root()), Some(manager.root()));
        assert_eq!(manager.path_of(manager.root()), Some(&GroupPath::root()));
    }

    #[test]
    fn test_apply_creates_implicit_parents() {
        let mut manager = GroupManager::new(16).unwrap();
        let report = manager
            .apply(&[group("/apps/web/frontend", Some(20))], false)
            .unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(effective(&manager, "/apps/web/frontend"), 20);
        assert_eq!(effective(&manager, "/apps"), 1);
    }

    #[test]
    fn test_apply_propagates_priorities() {
        let mut manager = GroupManager::new(16).unwrap();
        manager
            .apply(
                &[group("/apps", Some(10)), group("/apps/background", None)],
                false,
            )
            .unwrap();

        // Created before /apps was raised, so the value arrives by propagation
        assert_eq!(effective(&manager, "/apps/background"), 10);
    }

    #[test]
    fn test_reapply_is_noop() {
        let layout = vec![group("/a", Some(5)), group("/a/b", Some(8))];
        let mut manager = GroupManager::new(16).unwrap();
        manager.apply(&layout, true).unwrap();

        let report = manager.apply(&layout, true).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn test_apply_destroys_removed_groups() {
        let mut manager = GroupManager::new(16).unwrap();
        manager
            .apply(&[group("/a/b/c", Some(5)), group("/d", Some(2))], false)
            .unwrap();
        let stale = manager.id_of(&path("/a/b")).unwrap();

        let report = manager.apply(&[group("/d", Some(2))], false).unwrap();

        assert_eq!(report.destroyed, 3);
        assert!(manager.id_of(&path("/a")).is_none());
        assert!(!manager.hierarchy().store().contains(stale));
        assert!(manager.hierarchy().check_invariant().is_empty());
    }

    #[test]
    fn test_apply_sets_constraint() {
        let mut manager = GroupManager::new(16).unwrap();
        let report = manager.apply(&[], true).unwrap();
        assert!(report.constraint_changed);
        assert!(manager.hierarchy().read_constraint());
    }

    #[test]
    fn test_root_priority_from_layout() {
        let mut manager = GroupManager::new(16).unwrap();
        manager
            .apply(&[group("/", Some(3)), group("/x", None)], false)
            .unwrap();
        assert_eq!(effective(&manager, "/"), 3);
        assert_eq!(effective(&manager, "/x"), 3);
    }

    #[test]
    fn test_write_priority_unknown_path() {
        let manager = GroupManager::new(16).unwrap();
        let err = manager.write_priority(&path("/nope"), 3).unwrap_err();
        assert!(matches!(err, DaemonError::UnknownGroup(_)));
    }

    #[test]
    fn test_group_limit_surfaces() {
        let mut manager = GroupManager::new(2).unwrap();
        let err = manager
            .apply(&[group("/a", None), group("/b", None)], false)
            .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Hierarchy(oomprio_core::Error::AllocationFailure(_))
        ));
    }

    #[test]
    fn test_over_limit_layout_changes_nothing() {
        let mut manager = GroupManager::new(3).unwrap();
        manager.apply(&[group("/old", Some(7))], false).unwrap();
        let old = manager.id_of(&path("/old")).unwrap();

        let err = manager
            .apply(
                &[group("/a", Some(9)), group("/b", None), group("/c", None)],
                true,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            DaemonError::Hierarchy(oomprio_core::Error::AllocationFailure(_))
        ));
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.id_of(&path("/old")), Some(old));
        assert_eq!(manager.hierarchy().read_priority(old).unwrap(), 7);
        assert!(manager.id_of(&path("/a")).is_none());
        assert!(!manager.hierarchy().read_constraint());

        // A layout that fits still applies in full afterwards
        let report = manager
            .apply(&[group("/a", Some(9)), group("/b", None)], true)
            .unwrap();
        assert_eq!(report.destroyed, 1);
        assert_eq!(effective(&manager, "/a"), 9);
        assert!(manager.hierarchy().read_constraint());
    }

    #[test]
    fn test_snapshot_by_path_order() {
        let mut manager = GroupManager::new(16).unwrap();
        manager
            .apply(&[group("/b", Some(4)), group("/a/x", Some(9))], false)
            .unwrap();

        let paths: Vec<String> = manager
            .snapshot_by_path()
            .iter()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(paths, vec!["/", "/a", "/a/x", "/b"]);
    }
}
