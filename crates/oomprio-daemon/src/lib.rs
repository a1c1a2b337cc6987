//! OOMPrio Daemon
//!
//! Keeps an OOM priority hierarchy in line with a declared layout and exports
//! its state for dashboards.

pub mod config;
pub mod error;
pub mod layout;
pub mod manager;
pub mod stats;

pub use config::{Config, GroupConfig};
pub use error::{DaemonError, Result};
pub use layout::GroupPath;
pub use manager::{ApplyReport, GroupManager};
pub use stats::HierarchyStats;
