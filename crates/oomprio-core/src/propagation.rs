//! Restoring `effective = max(priority, effective(parent))` below an edited group
//!
//! Both walks are pre-order, first child first, and must run with the
//! hierarchy lock held. A linked group that cannot be resolved mid-walk means
//! the tree is corrupt; that is a panic, not an error.

use tracing::debug;

use crate::error::Result;
use crate::lock::HierarchyGuard;
use crate::store::Arena;
use crate::types::NodeId;

/// Raise the subtree at `root` to at least `target`
///
/// `root` is set to `target` unconditionally. Descendants below `target` are
/// raised; every descendant is visited, even under one that already sat
/// above `target`. Returns the number of descendants visited.
pub(crate) fn increase(
    _guard: &HierarchyGuard<'_>,
    arena: &Arena,
    root: NodeId,
    target: i64,
) -> Result<usize> {
    arena.cell(root)?.set_effective_priority(target);

    let mut visited = 0;
    for (_, _, entry) in arena.descendants(root)? {
        if entry.cell.effective_priority() < target {
            entry.cell.set_effective_priority(target);
        }
        visited += 1;
    }

    debug!(
        "Raised group {} to {}, visited {} descendants",
        root, target, visited
    );
    Ok(visited)
}

/// Lower the subtree at `root`, starting from `floor`
///
/// Every descendant is rewritten to the larger of its own priority and its
/// parent's freshly updated effective priority, so each sibling starts from
/// the parent's floor and an override deeper down survives.
pub(crate) fn decrease(
    _guard: &HierarchyGuard<'_>,
    arena: &Arena,
    root: NodeId,
    floor: i64,
) -> Result<usize> {
    let entry = arena.entry(root)?;
    entry.cell.set_effective_priority(floor);

    let mut stack: Vec<(NodeId, i64)> =
        entry.children.iter().rev().map(|&id| (id, floor)).collect();
    let mut visited = 0;

    while let Some((id, inherited)) = stack.pop() {
        let entry = match arena.entry(id) {
            Ok(entry) => entry,
            Err(_) => panic!("corrupt hierarchy: linked group {} is missing", id),
        };

        let priority = entry.cell.priority();
        let effective = if priority > inherited { priority } else { inherited };
        entry.cell.set_effective_priority(effective);
        visited += 1;

        stack.extend(entry.children.iter().rev().map(|&child| (child, effective)));
    }

    debug!(
        "Lowered group {} to {}, visited {} descendants",
        root, floor, visited
    );
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::HierarchyLock;
    use crate::store::NodeStore;

    struct Tree {
        store: NodeStore,
        lock: HierarchyLock,
        root: NodeId,
    }

    impl Tree {
        fn new() -> Self {
            let store = NodeStore::new();
            let root = store.create_node(None).unwrap();
            Self {
                store,
                lock: HierarchyLock::new(),
                root,
            }
        }

        fn add(&self, parent: NodeId, priority: i64, effective: i64) -> NodeId {
            let id = self.store.create_node(Some(parent)).unwrap();
            self.store.set_priority_raw(id, priority).unwrap();
            self.store.set_effective_raw(id, effective).unwrap();
            id
        }

        fn effective(&self, id: NodeId) -> i64 {
            self.store.get(id).unwrap().1
        }

        fn increase(&self, id: NodeId, target: i64) -> usize {
            let guard = self.lock.lock();
            increase(&guard, &self.store.read(), id, target).unwrap()
        }

        fn decrease(&self, id: NodeId, floor: i64) -> usize {
            let guard = self.lock.lock();
            decrease(&guard, &self.store.read(), id, floor).unwrap()
        }
    }

    #[test]
    fn test_increase_leaf() {
        let tree = Tree::new();
        assert_eq!(tree.increase(tree.root, 4), 0);
        assert_eq!(tree.effective(tree.root), 4);
    }

    #[test]
    fn test_increase_only_raises() {
        let tree = Tree::new();
        let low = tree.add(tree.root, 1, 1);
        let high = tree.add(tree.root, 9, 9);
        let under_high = tree.add(high, 2, 9);

        let visited = tree.increase(tree.root, 5);

        assert_eq!(visited, 3);
        assert_eq!(tree.effective(low), 5);
        assert_eq!(tree.effective(high), 9);
        assert_eq!(tree.effective(under_high), 9);
    }

    #[test]
    fn test_increase_visits_below_higher_nodes() {
        let tree = Tree::new();
        let high = tree.add(tree.root, 9, 9);
        // Deliberately inconsistent so the walk has to reach it.
        let stale = tree.add(high, 1, 1);

        tree.increase(tree.root, 5);
        assert_eq!(tree.effective(stale), 5);
    }

    #[test]
    fn test_decrease_keeps_overrides() {
        let tree = Tree::new();
        let a = tree.add(tree.root, 5, 5);
        let b = tree.add(a, 1, 5);
        let c = tree.add(a, 8, 8);
        let d = tree.add(c, 1, 8);

        let visited = tree.decrease(a, 2);

        assert_eq!(visited, 3);
        assert_eq!(tree.effective(a), 2);
        assert_eq!(tree.effective(b), 2);
        assert_eq!(tree.effective(c), 8);
        assert_eq!(tree.effective(d), 8);
    }

    #[test]
    fn test_decrease_sibling_restarts_from_parent_floor() {
        let tree = Tree::new();
        let a = tree.add(tree.root, 6, 6);
        let first = tree.add(a, 9, 9);
        let first_child = tree.add(first, 1, 9);
        let second = tree.add(a, 1, 6);
        let second_child = tree.add(second, 1, 6);

        tree.decrease(a, 3);

        assert_eq!(tree.effective(first), 9);
        assert_eq!(tree.effective(first_child), 9);
        assert_eq!(tree.effective(second), 3);
        assert_eq!(tree.effective(second_child), 3);
    }

    #[test]
    fn test_unknown_root() {
        let tree = Tree::new();
        let missing = NodeId::new(99, 0);
        let guard = tree.lock.lock();
        assert!(increase(&guard, &tree.store.read(), missing, 1).is_err());
        assert!(decrease(&guard, &tree.store.read(), missing, 1).is_err());
    }
}
