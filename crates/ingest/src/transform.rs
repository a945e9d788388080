//! Row transformer: one provider row in, one canonical record or a reject out.
//!
//! Pure and synchronous. A bad row never fails the batch; it becomes a
//! [`RejectedRow`] that the caller counts and logs.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use hackwatch_core::{NewExploit, RawProviderRow, RejectReason, RejectedRow};

// Column aliases, first non-null wins. Dune uses the snake_case names;
// live sources vary.
const PROTOCOL: &[&str] = &["protocol", "protocol_name", "project"];
const HACK_DATE: &[&str] = &["hack_date", "hackDate", "date", "block_time"];
const AMOUNT_STOLEN: &[&str] = &["amount_stolen_usd", "amount_stolen", "amountStolen", "amount_usd"];
const EXPLOIT_TYPE: &[&str] = &["exploit_type", "exploitType", "type"];
const TECHNIQUE: &[&str] = &["technique"];
const RELATED_ENTITY: &[&str] = &["related_entity", "relatedEntity"];
const RECOVERED: &[&str] = &["recovered"];
const RESOLUTION: &[&str] = &["resolution"];
const AUDITED_BY: &[&str] = &["audited_by", "auditedBy", "auditor"];
const NOTES: &[&str] = &["notes"];

/// Result of transforming a batch of rows.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub records: Vec<NewExploit>,
    pub rejected: Vec<RejectedRow>,
}

/// Map one raw row to a canonical record.
pub fn transform(row: &RawProviderRow) -> Result<NewExploit, RejectReason> {
    let hack_date = row
        .get(HACK_DATE)
        .and_then(Value::as_str)
        .and_then(parse_hack_date)
        .ok_or(RejectReason::InvalidDate)?;

    let protocol = row
        .str_field(PROTOCOL)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(RejectReason::MissingField("protocol"))?;

    let amount_stolen = row
        .get(AMOUNT_STOLEN)
        .and_then(parse_amount)
        .ok_or(RejectReason::InvalidAmount)?;

    Ok(NewExploit {
        protocol: protocol.to_string(),
        hack_date,
        amount_stolen,
        exploit_type: optional_text(row, EXPLOIT_TYPE).unwrap_or_default(),
        technique: optional_text(row, TECHNIQUE).unwrap_or_default(),
        related_entity: optional_text(row, RELATED_ENTITY),
        recovered: coerce_recovered(row.get(RECOVERED)),
        resolution: optional_text(row, RESOLUTION),
        audited_by: optional_text(row, AUDITED_BY),
        notes: optional_text(row, NOTES),
    })
}

/// Transform every row, splitting valid records from rejects.
///
/// `records.len() + rejected.len()` always equals the input length.
pub fn transform_batch(rows: Vec<RawProviderRow>) -> TransformOutcome {
    let mut outcome = TransformOutcome {
        records: Vec::with_capacity(rows.len()),
        rejected: Vec::new(),
    };

    for row in rows {
        match transform(&row) {
            Ok(record) => outcome.records.push(record),
            Err(reason) => {
                debug!(reason = %reason, row = ?row.fields(), "Row rejected");
                outcome.rejected.push(RejectedRow { row, reason });
            }
        }
    }

    if !outcome.rejected.is_empty() {
        let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
        for rejected in &outcome.rejected {
            *by_reason.entry(rejected.reason.to_string()).or_default() += 1;
        }
        warn!(
            rejected = outcome.rejected.len(),
            valid = outcome.records.len(),
            reasons = ?by_reason,
            "Rows rejected during transform"
        );
    }

    outcome
}

/// Booleans pass through; strings are `true` only when they equal `"true"`
/// ignoring case. Everything else, including absence, is `false`.
pub fn coerce_recovered(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Parse the date renderings providers emit, normalized to UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff][ UTC]`,
/// `YYYY-MM-DDTHH:MM:SS[.fff]` (no offset, read as UTC) and `YYYY-MM-DD`.
pub fn parse_hack_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = s.strip_suffix(" UTC").unwrap_or(s);
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    // Folds -0.0 into 0.0, which Postgres already treats as equal.
    (amount.is_finite() && amount >= 0.0).then_some(amount + 0.0)
}

fn optional_text(row: &RawProviderRow, aliases: &[&str]) -> Option<String> {
    match row.get(aliases)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
        other => Some(other.to_string()),
    }
}
