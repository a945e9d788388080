//! Provider-shaped rows and the reasons a row can be rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped row exactly as a provider returned it.
///
/// Column names vary between providers, so lookups go through a list of
/// aliases and the first present, non-null column wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProviderRow(Map<String, Value>);

impl RawProviderRow {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// First non-null value among `aliases`.
    pub fn get(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find(|v| !v.is_null())
    }

    /// First non-null value among `aliases`, if it is a string.
    pub fn str_field(&self, aliases: &[&str]) -> Option<&str> {
        self.get(aliases).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawProviderRow {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Why the transformer dropped a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidDate,
    MissingField(&'static str),
    InvalidAmount,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDate => write!(f, "invalid date format"),
            Self::MissingField(name) => write!(f, "missing required field '{name}'"),
            Self::InvalidAmount => write!(f, "amount stolen is not a finite non-negative number"),
        }
    }
}

/// A raw row paired with its rejection reason. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub row: RawProviderRow,
    pub reason: RejectReason,
}
