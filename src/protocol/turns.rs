//! Conversion of client conversations into the backend's turn list.
//!
//! The backend accepts only `user` and `assistant` turns. System and developer
//! content is folded into the first user turn as a personal-context suffix.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::InstructionsConfig;

const CONTEXT_PREFIX: &str = "\n\n[Personal context: ";
const CONTEXT_SUFFIX: &str = "]";

/// Role of a client-side message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Developer,
}

impl MessageRole {
    /// Parse a wire role name. Unknown roles (`tool`, `function`, ...) yield `None`.
    #[must_use]
    pub fn from_wire(role: &str) -> Option<Self> {
        match role {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            "developer" => Some(MessageRole::Developer),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_instruction(self) -> bool {
        matches!(self, MessageRole::System | MessageRole::Developer)
    }
}

/// Role of a backend turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A client-side message in its generic multi-role shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericMessage {
    pub role: MessageRole,
    pub content: String,
}

impl GenericMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One unit of the backend conversation. Never carries a system role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl From<Turn> for GenericMessage {
    fn from(turn: Turn) -> Self {
        let role = match turn.role {
            TurnRole::User => MessageRole::User,
            TurnRole::Assistant => MessageRole::Assistant,
        };
        GenericMessage {
            role,
            content: turn.content,
        }
    }
}

/// Decide which instructions apply to a request.
///
/// - request content + `append` + a default: `default\n\nrequest`
/// - request content otherwise: the request content alone
/// - no request content: the configured default
#[must_use]
pub fn resolve_instructions(
    request: Option<&str>,
    configured_default: Option<&str>,
    append: bool,
) -> Option<String> {
    match (request, configured_default) {
        (Some(request), Some(default)) if append => Some(format!("{default}\n\n{request}")),
        (Some(request), _) => Some(request.to_string()),
        (None, default) => default.map(str::to_string),
    }
}

/// Convert a generic message list into backend turns.
///
/// The first system/developer message supplies the request-level
/// instructions; every system/developer message is dropped; the resolved
/// instructions are appended to the first user message. Order is preserved.
#[must_use]
pub fn to_turns(messages: &[GenericMessage], instructions: &InstructionsConfig) -> Vec<Turn> {
    let request_system = messages
        .iter()
        .find(|message| message.role.is_instruction())
        .map(|message| message.content.as_str());
    let resolved = resolve_instructions(
        request_system,
        instructions.default.as_deref(),
        instructions.append,
    );
    build_turns(messages, resolved.as_deref())
}

/// Convert heterogeneous `input` (a bare string or an array of items) into
/// backend turns.
///
/// A bare string becomes one user turn, with instructions resolved from
/// `instructions_override` only. For arrays, items lacking a string `role` and
/// a usable `content` are dropped; when an override is supplied and no
/// system/developer item exists, a system message carrying it is prepended
/// before running [`to_turns`].
#[must_use]
pub fn input_to_turns(
    input: &Value,
    instructions_override: Option<&str>,
    instructions: &InstructionsConfig,
) -> Vec<Turn> {
    match input {
        Value::String(text) => {
            let resolved = resolve_instructions(
                instructions_override,
                instructions.default.as_deref(),
                instructions.append,
            );
            let messages = [GenericMessage::new(MessageRole::User, text.as_str())];
            build_turns(&messages, resolved.as_deref())
        }
        Value::Array(items) => {
            let mut messages: Vec<GenericMessage> =
                items.iter().filter_map(generic_message_from_item).collect();
            if let Some(instructions_override) = instructions_override {
                if !messages.iter().any(|message| message.role.is_instruction()) {
                    messages.insert(
                        0,
                        GenericMessage::new(MessageRole::System, instructions_override),
                    );
                }
            }
            to_turns(&messages, instructions)
        }
        _ => Vec::new(),
    }
}

/// Flatten a message `content` value into text.
///
/// Strings pass through; part arrays contribute the `text` of every part that
/// has one. Other shapes are not text content.
#[must_use]
pub fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let mut text = String::new();
            for part in parts {
                match part {
                    Value::String(piece) => text.push_str(piece),
                    Value::Object(object) => {
                        if let Some(Value::String(piece)) = object.get("text") {
                            text.push_str(piece);
                        }
                    }
                    _ => {}
                }
            }
            Some(text)
        }
        _ => None,
    }
}

fn generic_message_from_item(item: &Value) -> Option<GenericMessage> {
    let object = item.as_object()?;
    let role = MessageRole::from_wire(object.get("role")?.as_str()?)?;
    let content = content_text(object.get("content")?)?;
    Some(GenericMessage { role, content })
}

fn build_turns(messages: &[GenericMessage], instructions: Option<&str>) -> Vec<Turn> {
    let suffix = instructions.filter(|text| !text.is_empty());
    let mut injected = false;
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        let role = match message.role {
            MessageRole::User => TurnRole::User,
            MessageRole::Assistant => TurnRole::Assistant,
            MessageRole::System | MessageRole::Developer => continue,
        };
        let mut content = message.content.clone();
        if role == TurnRole::User && !injected {
            injected = true;
            if let Some(suffix) = suffix {
                content.reserve(CONTEXT_PREFIX.len() + suffix.len() + CONTEXT_SUFFIX.len());
                content.push_str(CONTEXT_PREFIX);
                content.push_str(suffix);
                content.push_str(CONTEXT_SUFFIX);
            }
        }
        turns.push(Turn { role, content });
    }
    turns
}
