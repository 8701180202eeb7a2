use crate::fc::ToolArguments;
use crate::protocol::context::ConversionContext;
use crate::util::{push_json_string_escaped, push_u64_decimal, push_usize_decimal};

use super::{
    ResponsesContentPart, ResponsesOutput, ResponsesOutputItem, ResponsesStatus,
    ResponsesStreamEvent, SequencedEvent,
};

// Emitter for the typed `response.*` event protocol.
//
// Ordering per response:
//   response.created -> response.in_progress
//   -> per text item: output_item.added -> content_part.added
//        -> output_text.delta* -> output_text.done
//   -> per tool call: output_item.added -> function_call_arguments.delta
//        -> function_call_arguments.done -> output_item.done
//   -> response.completed
//
// Text items are opened lazily on the first non-empty delta and closed before
// a tool call or at completion. Their part/item completion is carried by the
// final response rather than separate events.

#[derive(Debug)]
struct OpenTextItem {
    item_id: String,
    output_index: usize,
    content_index: usize,
    text: String,
}

/// Sequence-numbered emitter for the Responses protocol.
#[derive(Debug)]
pub struct ResponsesEventEmitter {
    output: Vec<ResponsesOutputItem>,
    open_text: Option<OpenTextItem>,
    status: ResponsesStatus,
    closed: bool,
}

impl Default for ResponsesEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsesEventEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            open_text: None,
            status: ResponsesStatus::InProgress,
            closed: false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn status(&self) -> ResponsesStatus {
        self.status
    }

    // -- lifecycle ----------------------------------------------------------

    /// `response.created` with status `in_progress`.
    pub fn created(&mut self, ctx: &mut ConversionContext, out: &mut Vec<String>) {
        let response = self.to_response(ctx);
        self.emit(ctx, &ResponsesStreamEvent::ResponseCreated { response }, out);
    }

    /// `response.in_progress`.
    pub fn in_progress(&mut self, ctx: &mut ConversionContext, out: &mut Vec<String>) {
        let response = self.to_response(ctx);
        self.emit(ctx, &ResponsesStreamEvent::ResponseInProgress { response }, out);
    }

    /// Close any open text item and emit `response.completed` carrying the
    /// full response.
    pub fn completed(&mut self, ctx: &mut ConversionContext, out: &mut Vec<String>) {
        self.close_text(ctx, out);
        if self.closed {
            return;
        }
        self.status = ResponsesStatus::Completed;
        let response = self.to_response(ctx);
        self.emit(ctx, &ResponsesStreamEvent::ResponseCompleted { response }, out);
        self.closed = true;
    }

    /// Terminal `error` event. Skips the normal completion states.
    pub fn error(
        &mut self,
        ctx: &mut ConversionContext,
        code: &str,
        message: &str,
        out: &mut Vec<String>,
    ) {
        if self.closed {
            return;
        }
        let event = ResponsesStreamEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
            param: None,
        };
        self.emit(ctx, &event, out);
        self.status = ResponsesStatus::Failed;
        self.closed = true;
    }

    // -- text items ---------------------------------------------------------

    /// Append `text` to the current text item, opening one if needed.
    /// Empty text emits nothing.
    pub fn text_delta(&mut self, ctx: &mut ConversionContext, text: &str, out: &mut Vec<String>) {
        if self.closed || text.is_empty() {
            return;
        }
        if self.open_text.is_none() {
            self.open_text_item(ctx, out);
        }
        let Some(open) = self.open_text.as_mut() else {
            return;
        };
        open.text.push_str(text);
        let event = ResponsesStreamEvent::OutputTextDelta {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            content_index: open.content_index,
            delta: text.to_string(),
        };
        self.emit(ctx, &event, out);
    }

    /// Emit `output_text.done` for the open text item, if any.
    pub fn close_text(&mut self, ctx: &mut ConversionContext, out: &mut Vec<String>) {
        let Some(open) = self.open_text.take() else {
            return;
        };
        if self.closed {
            return;
        }
        let event = ResponsesStreamEvent::OutputTextDone {
            item_id: open.item_id.clone(),
            output_index: open.output_index,
            content_index: open.content_index,
            text: open.text.clone(),
        };
        self.emit(ctx, &event, out);
        self.output.push(ResponsesOutputItem::Message {
            id: open.item_id,
            status: ResponsesStatus::Completed,
            role: "assistant".to_string(),
            content: vec![ResponsesContentPart::OutputText {
                text: open.text,
                annotations: Vec::new(),
            }],
        });
    }

    fn open_text_item(&mut self, ctx: &mut ConversionContext, out: &mut Vec<String>) {
        let output_index = ctx.next_output_index();
        let content_index = ctx.next_content_index();
        let item_id = item_id("msg", ctx.response_id(), output_index);

        let added = ResponsesStreamEvent::OutputItemAdded {
            output_index,
            item: ResponsesOutputItem::Message {
                id: item_id.clone(),
                status: ResponsesStatus::InProgress,
                role: "assistant".to_string(),
                content: Vec::new(),
            },
        };
        self.emit(ctx, &added, out);
        let part = ResponsesStreamEvent::ContentPartAdded {
            item_id: item_id.clone(),
            output_index,
            content_index,
            part: ResponsesContentPart::OutputText {
                text: String::new(),
                annotations: Vec::new(),
            },
        };
        self.emit(ctx, &part, out);

        self.open_text = Some(OpenTextItem {
            item_id,
            output_index,
            content_index,
            text: String::new(),
        });
    }

    // -- tool calls ---------------------------------------------------------

    /// Emit a complete function-call item: added, arguments delta, arguments
    /// done, item done. Closes any open text item first.
    pub fn function_call(
        &mut self,
        ctx: &mut ConversionContext,
        call_id: &str,
        name: &str,
        arguments: &ToolArguments,
        out: &mut Vec<String>,
    ) {
        self.close_text(ctx, out);
        if self.closed {
            return;
        }
        let arguments = match serde_json::to_string(arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::error!(error = %err, call_id, "failed to serialize tool-call arguments");
                self.error(
                    ctx,
                    "internal_error",
                    "failed to serialize tool-call arguments",
                    out,
                );
                return;
            }
        };
        ctx.next_tool_call_slot();
        let output_index = ctx.next_output_index();
        let item_id = item_id("fc", ctx.response_id(), output_index);

        let mut item = ResponsesOutputItem::FunctionCall {
            id: item_id.clone(),
            status: ResponsesStatus::InProgress,
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments: String::new(),
        };
        self.emit(
            ctx,
            &ResponsesStreamEvent::OutputItemAdded {
                output_index,
                item: item.clone(),
            },
            out,
        );
        self.emit(
            ctx,
            &ResponsesStreamEvent::FunctionCallArgumentsDelta {
                item_id: item_id.clone(),
                output_index,
                delta: arguments.clone(),
            },
            out,
        );
        self.emit(
            ctx,
            &ResponsesStreamEvent::FunctionCallArgumentsDone {
                item_id,
                output_index,
                arguments: arguments.clone(),
            },
            out,
        );
        if let ResponsesOutputItem::FunctionCall {
            status,
            arguments: item_arguments,
            ..
        } = &mut item
        {
            *status = ResponsesStatus::Completed;
            *item_arguments = arguments;
        }
        self.emit(
            ctx,
            &ResponsesStreamEvent::OutputItemDone {
                output_index,
                item: item.clone(),
            },
            out,
        );
        self.output.push(item);
    }

    // -- snapshots ----------------------------------------------------------

    /// The response object as it stands now.
    #[must_use]
    pub fn to_response(&self, ctx: &ConversionContext) -> ResponsesOutput {
        ResponsesOutput {
            id: ctx.response_id().to_string(),
            object: "response".to_string(),
            created_at: ctx.created_at(),
            model: ctx.model().to_string(),
            status: self.status,
            output: self.output.clone(),
        }
    }

    // -- framing ------------------------------------------------------------

    fn emit(
        &mut self,
        ctx: &mut ConversionContext,
        event: &ResponsesStreamEvent,
        out: &mut Vec<String>,
    ) {
        if self.closed {
            return;
        }
        let sequence_number = ctx.next_sequence();
        let sequenced = SequencedEvent {
            event,
            sequence_number,
        };
        match serde_json::to_string(&sequenced) {
            Ok(data) => {
                let event_type = event.event_type();
                let mut frame = String::with_capacity(16 + event_type.len() + data.len());
                frame.push_str("event: ");
                frame.push_str(event_type);
                frame.push_str("\ndata: ");
                frame.push_str(&data);
                frame.push_str("\n\n");
                out.push(frame);
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    event_type = event.event_type(),
                    sequence_number,
                    "failed to serialize response event"
                );
                out.push(fallback_error_frame(
                    sequence_number,
                    "internal_error",
                    "failed to serialize response event",
                ));
                self.open_text = None;
                self.status = ResponsesStatus::Failed;
                self.closed = true;
            }
        }
    }
}

fn item_id(prefix: &str, response_id: &str, output_index: usize) -> String {
    let suffix = response_id.strip_prefix("resp_").unwrap_or(response_id);
    let mut id = String::with_capacity(prefix.len() + suffix.len() + 8);
    id.push_str(prefix);
    id.push('_');
    id.push_str(suffix);
    id.push('_');
    push_usize_decimal(&mut id, output_index);
    id
}

fn fallback_error_frame(sequence_number: u64, code: &str, message: &str) -> String {
    let mut out = String::with_capacity(96 + code.len() + message.len());
    out.push_str("event: error\ndata: {\"type\":\"error\",\"code\":");
    push_json_string_escaped(&mut out, code);
    out.push_str(",\"message\":");
    push_json_string_escaped(&mut out, message);
    out.push_str(",\"param\":null,\"sequence_number\":");
    push_u64_decimal(&mut out, sequence_number);
    out.push_str("}\n\n");
    out
}
