//! Backend chat stream decoding.
//!
//! The backend pushes one JSON object per `data:` line. Each object is decoded
//! into the closed [`UpstreamEvent`] set; anything else is dropped.

pub mod sse;

pub use sse::{upstream_event_stream, UpstreamLineParser};

use serde::Deserialize;

use crate::util::extract_sse_data_payload;

/// Which channel a `token_data` event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTarget {
    Message,
    ToolCall,
    ToolResult,
}

/// One decoded backend stream event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamEvent {
    Ingesting,
    TokenData {
        target: TokenTarget,
        #[serde(default)]
        count: u64,
        #[serde(default)]
        content: String,
    },
    Done,
    Error {
        #[serde(default)]
        message: String,
    },
    Timeout {
        #[serde(default)]
        message: String,
    },
    Rejected,
}

impl UpstreamEvent {
    /// Whether this event ends the backend stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpstreamEvent::Done
                | UpstreamEvent::Error { .. }
                | UpstreamEvent::Timeout { .. }
                | UpstreamEvent::Rejected
        )
    }
}

/// Decode one raw backend line (`data: <json>`).
///
/// Returns `None` for blank lines, comments and malformed payloads.
#[must_use]
pub fn decode_upstream_line(line: &str) -> Option<UpstreamEvent> {
    let payload = extract_sse_data_payload(line)?;
    decode_upstream_payload(payload)
}

/// Decode the JSON payload of one backend event.
#[must_use]
pub fn decode_upstream_payload(payload: &str) -> Option<UpstreamEvent> {
    match serde_json::from_str::<UpstreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(error = %err, len = payload.len(), "dropping malformed upstream event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_event_kind() {
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"ingesting","target":"message"}"#),
            Some(UpstreamEvent::Ingesting)
        );
        assert_eq!(
            decode_upstream_line(
                r#"data: {"type":"token_data","target":"message","count":3,"content":"Hi"}"#
            ),
            Some(UpstreamEvent::TokenData {
                target: TokenTarget::Message,
                count: 3,
                content: "Hi".to_string(),
            })
        );
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"done"}"#),
            Some(UpstreamEvent::Done)
        );
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"error","message":"boom"}"#),
            Some(UpstreamEvent::Error {
                message: "boom".to_string()
            })
        );
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"timeout","message":"slow"}"#),
            Some(UpstreamEvent::Timeout {
                message: "slow".to_string()
            })
        );
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"rejected"}"#),
            Some(UpstreamEvent::Rejected)
        );
    }

    #[test]
    fn decodes_tool_channels() {
        let event = decode_upstream_line(
            r#"data: {"type":"token_data","target":"tool_call","count":1,"content":"{\"name\":\"x\"}"}"#,
        );
        assert!(matches!(
            event,
            Some(UpstreamEvent::TokenData {
                target: TokenTarget::ToolCall,
                ref content,
                ..
            }) if content == r#"{"name":"x"}"#
        ));

        let event = decode_upstream_line(
            r#"data: {"type":"token_data","target":"tool_result","content":"ok"}"#,
        );
        assert!(matches!(
            event,
            Some(UpstreamEvent::TokenData {
                target: TokenTarget::ToolResult,
                count: 0,
                ..
            })
        ));
    }

    #[test]
    fn malformed_lines_are_dropped() {
        assert_eq!(decode_upstream_line("data: {not json"), None);
        assert_eq!(decode_upstream_line(r#"data: {"type":"mystery"}"#), None);
        assert_eq!(
            decode_upstream_line(r#"data: {"type":"token_data","target":"audio"}"#),
            None
        );
        assert_eq!(decode_upstream_line(""), None);
        assert_eq!(decode_upstream_line(": ping"), None);
    }

    #[test]
    fn terminal_events() {
        assert!(UpstreamEvent::Done.is_terminal());
        assert!(UpstreamEvent::Rejected.is_terminal());
        assert!(!UpstreamEvent::Ingesting.is_terminal());
    }
}
