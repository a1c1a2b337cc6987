use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::GroupPath;

/// Main configuration for the OOMPrio daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LogConfig,

    /// Hierarchy limits and root-level switches
    pub hierarchy: HierarchyConfig,

    /// Reconcile loop settings
    pub monitoring: MonitoringConfig,

    /// Declared groups; missing intermediate groups are created implicitly
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log directory path (default: ./logs/)
    pub log_dir: PathBuf,

    /// Daemon log file name, rotated daily (default: oomprio-daemon.log)
    pub log_file: String,

    /// Default filter when RUST_LOG is not set (default: info)
    pub level: String,
}

/// Hierarchy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Maximum number of groups including the root (default: 4096)
    pub max_groups: usize,

    /// Honour cpuset boundaries when selecting victims (default: false)
    pub cpuset_constraint: bool,
}

/// Reconcile loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between config reloads (default: 5)
    pub reconcile_interval_secs: u64,

    /// Where the JSON stats snapshot is written (default: ./logs/stats.json)
    pub stats_path: PathBuf,
}

/// One declared group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group path, `/` for the root
    pub path: GroupPath,

    /// Own priority; left as inherited at creation when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl GroupConfig {
    pub fn new(path: &str, priority: Option<i64>) -> Result<Self> {
        Ok(Self {
            path: path.parse()?,
            priority,
        })
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for Config {
    fn default() -> Self {
        let group = |path: &str, priority: i64| GroupConfig {
            path: path.parse().expect("default layout paths are valid"),
            priority: Some(priority),
        };

        Self {
            logging: LogConfig::default(),
            hierarchy: HierarchyConfig::default(),
            monitoring: MonitoringConfig::default(),
            groups: vec![
                group("/system", 1),
                group("/apps", 10),
                group("/apps/background", 50),
            ],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file: "oomprio-daemon.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_groups: 4096,
            cpuset_constraint: false,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 5,
            stats_path: PathBuf::from("./logs/stats.json"),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use oomprio_daemon::config::Config;
    ///
    /// let config = Config::load_from_file("/etc/oomprio/config.toml").unwrap();
    /// println!("Groups declared: {}", config.groups.len());
    /// ```
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Log level must be one of {:?}, got: {}",
                LOG_LEVELS, self.logging.level
            ));
        }

        if self.logging.log_file.is_empty() {
            return Err("Log file name must not be empty".to_string());
        }

        if self.hierarchy.max_groups == 0 {
            return Err("Max groups must be > 0".to_string());
        }

        if self.monitoring.reconcile_interval_secs == 0 {
            return Err("Reconcile interval must be > 0".to_string());
        }

        let mut declared = HashSet::new();
        for group in &self.groups {
            if !declared.insert(&group.path) {
                return Err(format!("Group declared twice: {}", group.path));
            }
        }

        let mut required: HashSet<GroupPath> = HashSet::new();
        required.insert(GroupPath::root());
        for group in &self.groups {
            required.extend(group.path.ancestors());
            required.insert(group.path.clone());
        }

        if required.len() > self.hierarchy.max_groups {
            return Err(format!(
                "Layout needs {} groups but max groups is {}",
                required.len(),
                self.hierarchy.max_groups
            ));
        }

        Ok(())
    }

    /// Full path to the daemon log file
    pub fn log_path(&self) -> PathBuf {
        self.logging.log_dir.join(&self.logging.log_file)
    }
}
