//! Group paths as written in the layout file

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{DaemonError, Result};

/// Slash-separated path of a group below the root, e.g. `/apps/background`
///
/// `/` alone is the root. Components follow cgroup directory naming:
/// ASCII letters, digits, `_`, `-` and `.`, but not `.` or `..` on their
/// own. Ordering is component-wise, so a parent always sorts before its
/// children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupPath {
    components: Vec<String>,
}

impl GroupPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Last component, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<GroupPath> {
        if self.is_root() {
            return None;
        }
        Some(GroupPath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Every proper ancestor, root first
    pub fn ancestors(&self) -> Vec<GroupPath> {
        (0..self.components.len())
            .map(|len| GroupPath {
                components: self.components[..len].to_vec(),
            })
            .collect()
    }

    pub fn child(&self, name: &str) -> Result<GroupPath> {
        validate_component(name)?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(GroupPath { components })
    }
}

fn validate_component(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(DaemonError::InvalidPath(format!(
            "invalid component '{}'",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(DaemonError::InvalidPath(format!(
            "invalid character '{}' in '{}'",
            bad, name
        )));
    }
    Ok(())
}

impl FromStr for GroupPath {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s.strip_prefix('/').ok_or_else(|| {
            DaemonError::InvalidPath(format!("'{}' must start with '/'", s))
        })?;

        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Ok(GroupPath::root());
        }

        let components = rest
            .split('/')
            .map(|name| validate_component(name).map(|_| name.to_string()))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| DaemonError::InvalidPath(format!("{}: {}", s, e)))?;

        Ok(GroupPath { components })
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl Serialize for GroupPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
