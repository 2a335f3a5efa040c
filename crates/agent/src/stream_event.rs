//! Client-facing streaming events.
//!
//! `StreamEvent` is what a transport forwards to the client for one turn.
//! The multiplexer guarantees the sequence ends with exactly one `done`,
//! carries at most one `error`, and never shows a tool result before the
//! matching tool start.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a finished tool call: JSON when the output parses, raw text
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    Json(Value),
    Text(String),
}

impl ToolOutput {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

/// Events emitted to the client during one turn:
/// - `agent_decision` — the router picked a specialist
/// - `tool_start`     — a specialist is invoking a tool
/// - `tool_result`    — that tool returned (or failed)
/// - `message_delta`  — partial answer text
/// - `node_complete`  — a pipeline step finished
/// - `error`          — the turn failed
/// - `done`           — the stream is over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    AgentDecision {
        agent_name: String,
    },

    ToolStart {
        name: String,
        args: Value,
        id: String,
    },

    ToolResult {
        id: String,
        name: String,
        result: ToolOutput,
    },

    MessageDelta {
        content: String,
    },

    NodeComplete {
        node: String,
    },

    Error {
        message: String,
    },

    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_output_prefers_json() {
        assert_eq!(
            ToolOutput::parse(r#"{"count": 2}"#),
            ToolOutput::Json(serde_json::json!({"count": 2}))
        );
        assert_eq!(
            ToolOutput::parse("Sınav programı yayınlandı"),
            ToolOutput::Text("Sınav programı yayınlandı".into())
        );
    }

    #[test]
    fn event_serialization_tool_start() {
        let event = StreamEvent::ToolStart {
            name: "list_announcements".into(),
            args: serde_json::json!({"time_range": "1w"}),
            id: "call_1".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_start""#));
        assert!(json.contains(r#""time_range":"1w""#));
    }

    #[test]
    fn event_serialization_done_and_result() {
        let json = serde_json::to_string(&StreamEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);

        let event = StreamEvent::ToolResult {
            id: "call_1".into(),
            name: "fetch_document".into(),
            result: ToolOutput::Text("plain".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""result":{"type":"text","value":"plain"}"#));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"message_delta","content":"Merhaba"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            StreamEvent::MessageDelta {
                content: "Merhaba".into()
            }
        );
    }
}
