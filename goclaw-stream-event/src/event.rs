//! Wire-level event types: `stream` discriminant + payload.
//!
//! Variants mirror the phases of one agent turn; the envelope (session_key,
//! event_id) is applied separately so the payload stays transport-agnostic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One agent-stream event as delivered to a control-plane client.
/// The JSON shape discriminates on `stream`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Turn phase transition (`started`, `finished`, ...).
    Lifecycle { phase: String },
    /// A tool invocation and, once available, its result.
    Tool {
        name: String,
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// An incremental assistant token batch; `done` marks the final fragment.
    Assistant { delta: String, done: bool },
    /// A turn-level failure, with the classifier's reason string.
    Error { reason: String, message: String },
    /// Context compaction: how many messages were dropped from the window.
    Compaction { removed: usize },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (stream + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_tag_is_snake_case() {
        let ev = ProtocolEvent::Assistant {
            delta: "hel".to_string(),
            done: false,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["stream"], "assistant");
        assert_eq!(v["delta"], "hel");
        assert_eq!(v["done"], false);
    }

    #[test]
    fn tool_result_is_omitted_until_present() {
        let ev = ProtocolEvent::Tool {
            name: "read".to_string(),
            arguments: serde_json::json!({"path": "a.txt"}),
            result: None,
        };
        let v = ev.to_value().unwrap();
        assert!(v.get("result").is_none());
    }

    #[test]
    fn round_trips_through_the_wire_shape() {
        let ev = ProtocolEvent::Error {
            reason: "rate_limit".to_string(),
            message: "429".to_string(),
        };
        let v = ev.to_value().unwrap();
        let back: ProtocolEvent = serde_json::from_value(v).unwrap();
        match back {
            ProtocolEvent::Error { reason, .. } => assert_eq!(reason, "rate_limit"),
            other => panic!("expected error variant, got {other:?}"),
        }
    }
}
