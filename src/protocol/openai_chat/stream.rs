use crate::error::ErrorCategory;
use crate::fc::ToolArguments;
use crate::protocol::context::ConversionContext;
use crate::protocol::error_shapes::openai_error_type;
use crate::util::{push_json_string_escaped, push_u64_decimal, push_usize_decimal};

use super::{OpenAiChatResponse, OpenAiChoice, OpenAiMessage, OpenAiToolCall, OpenAiToolCallFunction};

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Emitter for the `chat.completion.chunk` protocol.
///
/// Every chunk takes one sequence number from the context even though the
/// protocol does not put it on the wire; the `[DONE]` sentinel takes none.
/// After `done` or `error` the emitter is closed and ignores further calls.
#[derive(Debug, Default)]
pub struct ChatChunkEmitter {
    content: String,
    tool_calls: Vec<OpenAiToolCall>,
    finish_reason: Option<&'static str>,
    role_sent: bool,
    closed: bool,
}

impl ChatChunkEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// One delta chunk carrying `text`. Empty text emits nothing.
    pub fn content_delta(&mut self, ctx: &mut ConversionContext, text: &str, out: &mut Vec<String>) {
        if self.closed || text.is_empty() {
            return;
        }
        ctx.next_sequence();
        let mut frame = String::with_capacity(160 + text.len());
        push_chunk_prefix(&mut frame, ctx);
        frame.push_str(",\"choices\":[{\"index\":0,\"delta\":{");
        self.push_role_once(&mut frame);
        frame.push_str("\"content\":");
        push_json_string_escaped(&mut frame, text);
        frame.push_str("},\"finish_reason\":null}]}\n\n");
        out.push(frame);
        self.content.push_str(text);
    }

    /// One delta chunk carrying a complete tool call in the next slot.
    pub fn tool_call_delta(
        &mut self,
        ctx: &mut ConversionContext,
        call_id: &str,
        name: &str,
        arguments: &ToolArguments,
        out: &mut Vec<String>,
    ) {
        if self.closed {
            return;
        }
        let arguments = match serde_json::to_string(arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::error!(error = %err, call_id, "failed to serialize tool-call arguments");
                self.error(
                    ctx,
                    ErrorCategory::ServerError,
                    "internal_error",
                    "failed to serialize tool-call arguments",
                    out,
                );
                return;
            }
        };
        let slot = ctx.next_tool_call_slot();
        ctx.next_sequence();

        let mut frame =
            String::with_capacity(220 + call_id.len() + name.len() + arguments.len());
        push_chunk_prefix(&mut frame, ctx);
        frame.push_str(",\"choices\":[{\"index\":0,\"delta\":{");
        self.push_role_once(&mut frame);
        frame.push_str("\"tool_calls\":[{\"index\":");
        push_usize_decimal(&mut frame, slot);
        frame.push_str(",\"id\":");
        push_json_string_escaped(&mut frame, call_id);
        frame.push_str(",\"type\":\"function\",\"function\":{\"name\":");
        push_json_string_escaped(&mut frame, name);
        frame.push_str(",\"arguments\":");
        push_json_string_escaped(&mut frame, &arguments);
        frame.push_str("}}]},\"finish_reason\":null}]}\n\n");
        out.push(frame);

        self.tool_calls.push(OpenAiToolCall {
            id: call_id.to_string(),
            type_: "function".to_string(),
            function: OpenAiToolCallFunction {
                name: name.to_string(),
                arguments,
            },
        });
    }

    /// Terminal chunk with `finish_reason`, followed by `data: [DONE]`.
    pub fn done(&mut self, ctx: &mut ConversionContext, tool_calls_present: bool, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        let finish_reason = if tool_calls_present { "tool_calls" } else { "stop" };
        ctx.next_sequence();
        let mut frame = String::with_capacity(160);
        push_chunk_prefix(&mut frame, ctx);
        frame.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":");
        push_json_string_escaped(&mut frame, finish_reason);
        frame.push_str("}]}\n\n");
        out.push(frame);
        out.push(DONE_FRAME.to_owned());
        self.finish_reason = Some(finish_reason);
        self.closed = true;
    }

    /// A single error payload; nothing follows it.
    pub fn error(
        &mut self,
        ctx: &mut ConversionContext,
        category: ErrorCategory,
        code: &str,
        message: &str,
        out: &mut Vec<String>,
    ) {
        if self.closed {
            return;
        }
        ctx.next_sequence();
        let mut frame = String::with_capacity(96 + code.len() + message.len());
        frame.push_str("data: {\"error\":{\"message\":");
        push_json_string_escaped(&mut frame, message);
        frame.push_str(",\"type\":");
        push_json_string_escaped(&mut frame, openai_error_type(category));
        frame.push_str(",\"code\":");
        push_json_string_escaped(&mut frame, code);
        frame.push_str(",\"param\":null}}\n\n");
        out.push(frame);
        self.closed = true;
    }

    /// The accumulated output as a non-streaming `chat.completion` body.
    #[must_use]
    pub fn to_completion(&self, ctx: &ConversionContext) -> OpenAiChatResponse {
        let content = if self.content.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(serde_json::Value::String(self.content.clone()))
        };
        let tool_calls = (!self.tool_calls.is_empty()).then(|| self.tool_calls.clone());
        OpenAiChatResponse {
            id: ctx.response_id().to_string(),
            object: "chat.completion".to_string(),
            created: Some(ctx.created_at()),
            model: ctx.model().to_string(),
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls,
                },
                finish_reason: self.finish_reason.map(str::to_string),
            }],
        }
    }

    fn push_role_once(&mut self, frame: &mut String) {
        if !self.role_sent {
            frame.push_str("\"role\":\"assistant\",");
            self.role_sent = true;
        }
    }
}

fn push_chunk_prefix(out: &mut String, ctx: &ConversionContext) {
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, ctx.response_id());
    out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
    push_u64_decimal(out, ctx.created_at());
    out.push_str(",\"model\":");
    push_json_string_escaped(out, ctx.model());
}
