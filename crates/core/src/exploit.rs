//! Canonical exploit record: the normalized shape every provider maps into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical exploit record that has not been written yet.
///
/// Produced by the row transformer; storage assigns the surrogate key and
/// timestamps on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExploit {
    pub protocol: String,
    pub hack_date: DateTime<Utc>,
    /// USD, finite and non-negative.
    pub amount_stolen: f64,
    pub exploit_type: String,
    pub technique: String,
    pub related_entity: Option<String>,
    pub recovered: bool,
    pub resolution: Option<String>,
    pub audited_by: Option<String>,
    pub notes: Option<String>,
}

impl NewExploit {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            protocol: self.protocol.clone(),
            hack_date: self.hack_date,
            amount_stolen_bits: self.amount_stolen.to_bits(),
        }
    }
}

/// A persisted exploit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exploit {
    pub id: i64,
    pub protocol: String,
    pub hack_date: DateTime<Utc>,
    pub amount_stolen: f64,
    pub exploit_type: String,
    pub technique: String,
    pub related_entity: Option<String>,
    pub recovered: bool,
    pub resolution: Option<String>,
    pub audited_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Natural key used by storage to ignore repeat inserts.
///
/// Mirrors the unique index on `(protocol, hack_date, amount_stolen)`. The
/// amount is held as raw bits so the key can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub protocol: String,
    pub hack_date: DateTime<Utc>,
    pub amount_stolen_bits: u64,
}
