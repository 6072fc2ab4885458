//! Wire envelope types
//!
//! Every frame exchanged with the backend is a JSON object
//! `{"type": ..., "payload": {...}}`; reporter-emitted frames also carry an
//! ISO-8601 `timestamp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound: agent asks the backend to create a task
pub const CREATE_TASK: &str = "create_task";
/// Outbound: agent message for a task
pub const SDK_MESSAGE: &str = "sdk_message";
/// Inbound: user message for a task
pub const TASK_USER_MESSAGE: &str = "task_user_message";
/// Inbound: action performed within a task
pub const TASK_ACTION: &str = "task_action";
/// Both directions: task status change
pub const TASK_STATUS_UPDATE: &str = "task_status_update";

/// A `{type, payload}` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator
    #[serde(rename = "type")]
    pub kind: String,
    /// Emission time (reporter envelopes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Discriminator-specific payload
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope without a timestamp
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: None,
            payload,
        }
    }

    /// Attach an emission timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Classified inbound backend event
///
/// The payload is kept as a raw JSON object because the backend is free to
/// send partial or oddly-typed fields; the router extracts what it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    TaskUserMessage(Map<String, Value>),
    TaskAction(Map<String, Value>),
    TaskStatusUpdate(Map<String, Value>),
    /// Any other (or missing) discriminator
    Unknown(Option<String>),
}

impl BackendEvent {
    /// Classify a decoded frame. Never fails: a payload that is not an
    /// object is treated as empty.
    pub fn from_value(value: &Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str);
        let payload = || {
            value
                .get("payload")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        match kind {
            Some(TASK_USER_MESSAGE) => Self::TaskUserMessage(payload()),
            Some(TASK_ACTION) => Self::TaskAction(payload()),
            Some(TASK_STATUS_UPDATE) => Self::TaskStatusUpdate(payload()),
            other => Self::Unknown(other.map(str::to_string)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serializes_type_field() {
        let env = Envelope::new(SDK_MESSAGE, json!({"task_id": "t1"}));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"type": "sdk_message", "payload": {"task_id": "t1"}}));
    }

    #[test]
    fn test_envelope_timestamp_is_iso8601() {
        let ts = DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let env = Envelope::new(TASK_STATUS_UPDATE, json!({})).with_timestamp(ts);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["timestamp"], "2025-01-02T03:04:05Z");
    }

    #[test]
    fn test_classify_known_events() {
        let event = BackendEvent::from_value(&json!({
            "type": "task_user_message",
            "payload": {"task_id": "t1"}
        }));
        match event {
            BackendEvent::TaskUserMessage(p) => assert_eq!(p["task_id"], "t1"),
            other => panic!("Expected TaskUserMessage, got {:?}", other),
        }

        assert!(matches!(
            BackendEvent::from_value(&json!({"type": "task_action"})),
            BackendEvent::TaskAction(p) if p.is_empty()
        ));
        assert!(matches!(
            BackendEvent::from_value(&json!({"type": "task_status_update", "payload": []})),
            BackendEvent::TaskStatusUpdate(p) if p.is_empty()
        ));
    }

    #[test]
    fn test_classify_unknown_events() {
        assert_eq!(
            BackendEvent::from_value(&json!({"type": "something_else"})),
            BackendEvent::Unknown(Some("something_else".to_string()))
        );
        assert_eq!(
            BackendEvent::from_value(&json!({"payload": {}})),
            BackendEvent::Unknown(None)
        );
        assert_eq!(
            BackendEvent::from_value(&json!("just a string")),
            BackendEvent::Unknown(None)
        );
    }
}
