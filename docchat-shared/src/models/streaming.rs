use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events fanned out to chat stream listeners.
///
/// Serialized with a leading `type` discriminator (`message`, `snapshot`,
/// `heartbeat`); clients dispatch on that field alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full snapshot of one message after it was created or updated.
    Message { data: Value },
    /// Chat history at subscription time; always the first event of a stream.
    Snapshot { data: Vec<Value> },
    /// Keep-alive carrying the emission time.
    Heartbeat { timestamp: String },
}

impl StreamEvent {
    /// Wraps any serializable record in a message event.
    ///
    /// # Errors
    /// Returns an error if the record cannot be represented as JSON.
    pub fn message<T: Serialize>(record: &T) -> serde_json::Result<Self> {
        Ok(Self::Message {
            data: serde_json::to_value(record)?,
        })
    }

    /// Builds the snapshot event from the ordered chat history.
    ///
    /// # Errors
    /// Returns an error if any record cannot be represented as JSON.
    pub fn snapshot<T: Serialize>(records: &[T]) -> serde_json::Result<Self> {
        let data = records
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Self::Snapshot { data })
    }

    #[must_use]
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Snapshot { .. } => "snapshot",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    #[test]
    fn message_event_serializes_with_type_tag_first() {
        let event = StreamEvent::message(&json!({ "content": "first" })).unwrap();
        let json = serde_json::to_string(&event).unwrap();

        assert_eq!(json, r#"{"type":"message","data":{"content":"first"}}"#);
        assert!(!json.contains('\n'));
    }

    #[test]
    fn snapshot_preserves_history_order() {
        let history = vec![json!({ "content": "a" }), json!({ "content": "b" })];
        let event = StreamEvent::snapshot(&history).unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["data"][0]["content"], "a");
        assert_eq!(value["data"][1]["content"], "b");
    }

    #[test]
    fn empty_snapshot_is_an_empty_list() {
        let event = StreamEvent::snapshot::<Value>(&[]).unwrap();
        assert_eq!(event, StreamEvent::Snapshot { data: Vec::new() });
        assert_eq!(event.kind(), "snapshot");
    }

    #[test]
    fn heartbeat_carries_parseable_utc_timestamp() {
        let event = StreamEvent::heartbeat_now();
        let StreamEvent::Heartbeat { timestamp } = &event else {
            panic!("expected heartbeat");
        };

        let parsed = DateTime::parse_from_rfc3339(timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "heartbeat");
    }

    #[test]
    fn events_decode_from_wire_json() {
        let decoded: StreamEvent =
            serde_json::from_str(r#"{"type":"heartbeat","timestamp":"2025-01-01T00:00:00+00:00"}"#)
                .unwrap();

        assert_eq!(decoded.kind(), "heartbeat");
    }
}
