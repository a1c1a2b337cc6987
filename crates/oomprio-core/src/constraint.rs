//! Process-wide cpuset constraint switch

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Whether the eviction consumer should honour cpuset boundaries when
/// picking a victim. Only the root group's control entry may change it.
#[derive(Debug, Default)]
pub struct ConstraintFlag {
    honour: AtomicBool,
}

impl ConstraintFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.honour.load(Ordering::Acquire)
    }

    /// Set from a raw control value, which must be 0 or 1
    pub fn set_raw(&self, value: u64) -> Result<()> {
        let honour = match value {
            0 => false,
            1 => true,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "cpuset_constraint must be 0 or 1, got {}",
                    other
                )))
            }
        };
        self.honour.store(honour, Ordering::Release);
        Ok(())
    }

    pub(crate) fn reset(&self) {
        self.honour.store(false, Ordering::Release);
    }
}
