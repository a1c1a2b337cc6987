//! Tree-wide lock serializing priority propagation

use parking_lot::{Mutex, MutexGuard};

/// One mutual-exclusion domain for the whole hierarchy
///
/// Every propagation runs under it, so no group is ever visited by two
/// traversals at once. Readers of priority values never take it.
#[derive(Debug, Default)]
pub struct HierarchyLock {
    inner: Mutex<()>,
}

/// Proof that the hierarchy lock is held
pub struct HierarchyGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl HierarchyLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> HierarchyGuard<'_> {
        HierarchyGuard {
            _guard: self.inner.lock(),
        }
    }

    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Option<HierarchyGuard<'_>> {
        self.inner
            .try_lock()
            .map(|guard| HierarchyGuard { _guard: guard })
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
