//! Control files exposed per group
//!
//! Values travel as text, the way cgroup control files do: reads return the
//! number, writes accept a number with surrounding whitespace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::hierarchy::OomHierarchy;
use crate::types::{NodeId, Propagation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Own priority, read/write
    Priority,
    /// Derived priority, read-only
    EffectivePriority,
    /// Process-wide 0/1 switch, root group only
    CpusetConstraint,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [
        Attribute::Priority,
        Attribute::EffectivePriority,
        Attribute::CpusetConstraint,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Priority => "priority",
            Attribute::EffectivePriority => "effective_priority",
            Attribute::CpusetConstraint => "cpuset_constraint",
        }
    }

    pub fn is_root_only(&self) -> bool {
        matches!(self, Attribute::CpusetConstraint)
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Attribute::EffectivePriority)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Attribute::ALL
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown attribute: {}", s)))
    }
}

fn parse_value<T: FromStr>(attr: Attribute, text: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    let trimmed = text.trim();
    trimmed.parse::<T>().map_err(|e| {
        Error::InvalidArgument(format!("invalid value '{}' for {}: {}", trimmed, attr, e))
    })
}

impl OomHierarchy {
    /// Control files a group exposes; the root also gets `cpuset_constraint`
    pub fn attributes_for(&self, id: NodeId) -> Result<Vec<Attribute>> {
        let root = self.is_root(id)?;
        Ok(Attribute::ALL
            .into_iter()
            .filter(|attr| root || !attr.is_root_only())
            .collect())
    }

    pub fn read_attribute(&self, id: NodeId, attr: Attribute) -> Result<String> {
        let value = match attr {
            Attribute::Priority => self.read_priority(id)?,
            Attribute::EffectivePriority => self.read_effective(id)?,
            Attribute::CpusetConstraint => {
                self.ensure_root(id)?;
                i64::from(self.read_constraint())
            }
        };
        Ok(value.to_string())
    }

    /// Write a control file. Only a `priority` write can propagate.
    pub fn write_attribute(
        &self,
        id: NodeId,
        attr: Attribute,
        text: &str,
    ) -> Result<Propagation> {
        match attr {
            Attribute::Priority => {
                let value = parse_value::<i64>(attr, text)?;
                self.write_priority(id, value)
            }
            Attribute::EffectivePriority => {
                self.store().get(id)?;
                Err(Error::InvalidOperation(format!("{} is read-only", attr)))
            }
            Attribute::CpusetConstraint => {
                self.ensure_root(id)?;
                let value = parse_value::<u64>(attr, text)?;
                self.write_constraint(id, value)?;
                Ok(Propagation::None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (OomHierarchy, NodeId, NodeId) {
        let h = OomHierarchy::new();
        let root = h.on_group_created(None).unwrap();
        let child = h.on_group_created(Some(root)).unwrap();
        (h, root, child)
    }

    #[test]
    fn test_attribute_names_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(attr.name().parse::<Attribute>().unwrap(), attr);
        }
        assert!("oom_score_adj".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_root_only_population() {
        let (h, root, child) = tree();
        assert_eq!(h.attributes_for(root).unwrap().len(), 3);
        assert_eq!(
            h.attributes_for(child).unwrap(),
            vec![Attribute::Priority, Attribute::EffectivePriority]
        );
    }

    #[test]
    fn test_write_priority_text() {
        let (h, _, child) = tree();
        let propagation = h
            .write_attribute(child, Attribute::Priority, " 15\n")
            .unwrap();
        assert!(!propagation.is_none());
        assert_eq!(h.read_attribute(child, Attribute::Priority).unwrap(), "15");
        assert_eq!(
            h.read_attribute(child, Attribute::EffectivePriority).unwrap(),
            "15"
        );
    }

    #[test]
    fn test_write_priority_rejects_garbage() {
        let (h, _, child) = tree();
        let err = h
            .write_attribute(child, Attribute::Priority, "high")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(h.read_priority(child).unwrap(), 1);
    }

    #[test]
    fn test_effective_priority_read_only() {
        let (h, _, child) = tree();
        let err = h
            .write_attribute(child, Attribute::EffectivePriority, "3")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_cpuset_constraint_text() {
        let (h, root, child) = tree();

        assert!(matches!(
            h.write_attribute(root, Attribute::CpusetConstraint, "2"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            h.write_attribute(root, Attribute::CpusetConstraint, "-1"),
            Err(Error::InvalidArgument(_))
        ));
        h.write_attribute(root, Attribute::CpusetConstraint, "1\n")
            .unwrap();
        assert_eq!(
            h.read_attribute(root, Attribute::CpusetConstraint).unwrap(),
            "1"
        );

        assert!(matches!(
            h.write_attribute(child, Attribute::CpusetConstraint, "1"),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            h.read_attribute(child, Attribute::CpusetConstraint),
            Err(Error::InvalidOperation(_))
        ));
    }
}
