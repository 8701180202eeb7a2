pub mod detector;
pub mod native;

pub use detector::{DetectorAction, DetectorState, StreamingToolCallDetector};
pub use native::{is_error_result, parse_tool_call};

use serde::{Deserialize, Serialize};

/// Argument mapping of a tool call.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// A function invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}
