//! Shared response handling for every provider.
//!
//! All sources answer with either a rows container or an `error` field.
//! These helpers turn an HTTP response into that envelope and pull the rows
//! out, so each adapter only has to know where its rows live.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde_json::Value;

use hackwatch_core::RawProviderRow;

use super::traits::ProviderError;

/// Check the HTTP status and decode the JSON body.
pub(crate) async fn read_json(provider: &str, response: Response) -> Result<Value, ProviderError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthenticated(format!(
            "{provider} rejected the API key ({status})"
        )));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or(body);
        return Err(ProviderError::Upstream(format!("{provider} {status}: {detail}")));
    }

    response.json::<Value>().await.map_err(|e| {
        ProviderError::MalformedEnvelope(format!("{provider} returned a non-JSON body: {e}"))
    })
}

/// Extract the `error` field of an envelope, if any.
///
/// Accepts a plain string or a JSON-RPC style `{ "message": ... }` object.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

/// Pull the rows at `pointer` (JSON pointer syntax) out of an envelope.
pub(crate) fn rows_at(body: &Value, pointer: &str) -> Result<Vec<RawProviderRow>, ProviderError> {
    if let Some(message) = error_message(body) {
        return Err(ProviderError::Upstream(message));
    }

    let rows = match body.pointer(pointer) {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => {
            return Err(ProviderError::MalformedEnvelope(format!(
                "missing rows container at '{pointer}'"
            )))
        }
        Some(other) => {
            return Err(ProviderError::MalformedEnvelope(format!(
                "rows container at '{pointer}' is not an array (found {})",
                json_type(other)
            )))
        }
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(fields) => Ok(RawProviderRow::new(fields.clone())),
            other => Err(ProviderError::MalformedEnvelope(format!(
                "row {i} is not an object (found {})",
                json_type(other)
            ))),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Exponential backoff for polling long-running provider queries.
pub(crate) struct Backoff {
    delay_ms: u64,
}

impl Backoff {
    const INITIAL_DELAY_MS: u64 = 200;
    const MAX_DELAY_MS: u64 = 2000;
    const FACTOR: f64 = 1.5;

    pub(crate) fn new() -> Self {
        Self {
            delay_ms: Self::INITIAL_DELAY_MS,
        }
    }

    /// Current delay, advancing the schedule for the next call.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let current = self.delay_ms;
        self.delay_ms = ((current as f64 * Self::FACTOR) as u64).min(Self::MAX_DELAY_MS);
        Duration::from_millis(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_are_extracted_in_order() {
        let body = json!({"result": {"rows": [{"protocol": "A"}, {"protocol": "B"}]}});
        let rows = rows_at(&body, "/result/rows").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].str_field(&["protocol"]), Some("B"));
    }

    #[test]
    fn empty_rows_is_not_an_error() {
        let body = json!({"rows": []});
        assert!(rows_at(&body, "/rows").unwrap().is_empty());
    }

    #[test]
    fn missing_container_is_malformed() {
        let body = json!({"result": {}});
        let err = rows_at(&body, "/result/rows").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedEnvelope(_)));
    }

    #[test]
    fn null_container_is_malformed() {
        let body = json!({"rows": null});
        assert!(matches!(
            rows_at(&body, "/rows"),
            Err(ProviderError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn non_object_rows_are_malformed() {
        let body = json!({"rows": [{"protocol": "A"}, 7]});
        let err = rows_at(&body, "/rows").unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn error_string_wins_over_rows() {
        let body = json!({"error": "query not found", "rows": []});
        let err = rows_at(&body, "/rows").unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(ref m) if m == "query not found"));
    }

    #[test]
    fn json_rpc_error_object_message() {
        let body = json!({"jsonrpc": "2.0", "error": {"code": -32000, "message": "invalid sql"}});
        assert_eq!(error_message(&body).as_deref(), Some("invalid sql"));
    }

    #[test]
    fn null_error_is_ignored() {
        let body = json!({"error": null, "rows": [{"protocol": "A"}]});
        assert_eq!(rows_at(&body, "/rows").unwrap().len(), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays[0], 200);
        assert_eq!(delays[1], 300);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), 2000);
    }
}
