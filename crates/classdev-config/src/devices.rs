//! Named device queries
//!
//! A device query names a device-class directory, an optional naming pattern
//! and a set of attribute constraints. Queries are stored as plain strings
//! here; the HAL compiles the pattern when it resolves them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Acceptable value(s) for one attribute
///
/// In TOML a constraint is either a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    /// The attribute must equal this value
    One(String),
    /// The attribute must equal one of these values
    AnyOf(Vec<String>),
}

impl Constraint {
    /// Whether an attribute's current value satisfies this constraint
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Constraint::One(expected) => expected == value,
            Constraint::AnyOf(accepted) => accepted.iter().any(|a| a == value),
        }
    }
}

impl From<&str> for Constraint {
    fn from(value: &str) -> Self {
        Constraint::One(value.to_string())
    }
}

impl From<String> for Constraint {
    fn from(value: String) -> Self {
        Constraint::One(value)
    }
}

impl From<Vec<String>> for Constraint {
    fn from(values: Vec<String>) -> Self {
        Constraint::AnyOf(values)
    }
}

impl From<&[&str]> for Constraint {
    fn from(values: &[&str]) -> Self {
        Constraint::AnyOf(values.iter().map(|v| v.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Constraint {
    fn from(values: [&str; N]) -> Self {
        Constraint::from(&values[..])
    }
}

/// A device query as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Device-class directory name, e.g. `tacho-motor`
    pub class: String,
    /// Regular expression the device directory name must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Attribute name to acceptable value(s)
    #[serde(default)]
    pub constraints: BTreeMap<String, Constraint>,
}

impl DeviceSpec {
    /// Query for any device in `class`
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            pattern: None,
            constraints: BTreeMap::new(),
        }
    }

    /// Restrict directory names to `pattern`
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Require `attribute` to satisfy `constraint`
    pub fn with_constraint(
        mut self,
        attribute: impl Into<String>,
        constraint: impl Into<Constraint>,
    ) -> Self {
        self.constraints.insert(attribute.into(), constraint.into());
        self
    }
}
