use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::{BridgeError, ErrorCategory};
use crate::fc::{is_error_result, parse_tool_call, DetectorAction, StreamingToolCallDetector, ToolCall};
use crate::protocol::context::ConversionContext;
use crate::protocol::openai_chat::ChatChunkEmitter;
use crate::protocol::openai_responses::ResponsesEventEmitter;
pub use crate::protocol::OutwardProtocol;
use crate::upstream::{TokenTarget, UpstreamEvent};
use crate::util::{format_request_seq_hex, push_usize_decimal};

// Single-pass translator from backend events to one outward protocol.
//
// message tokens  -> detector -> content deltas / inline tool calls
// tool_call tokens -> native parser -> tool calls
// tool_result tokens -> logged only
//
// The translator owns the request's ConversionContext; emitters borrow it
// mutably for each call. Once a terminal event has been emitted the
// translator is closed and ignores further input.

/// Terminal upstream failure reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
enum Emitter {
    Chat(ChatChunkEmitter),
    Responses(ResponsesEventEmitter),
}

/// Per-request translation pipeline.
#[derive(Debug)]
pub struct StreamTranslator {
    ctx: ConversionContext,
    detector: StreamingToolCallDetector,
    emitter: Emitter,
    protocol: OutwardProtocol,
    call_id_prefix: String,
    tool_calls_emitted: usize,
    started: bool,
    closed: bool,
    terminal_error: Option<TerminalError>,
}

impl StreamTranslator {
    /// Create a translator for one request. `request_seq` makes response and
    /// tool-call ids unique and reproducible.
    #[must_use]
    pub fn new(
        protocol: OutwardProtocol,
        request_seq: u64,
        model: impl Into<String>,
        created_at: u64,
    ) -> Self {
        let response_id = format_request_seq_hex(protocol.id_prefix(), request_seq);
        let mut call_id_prefix = format_request_seq_hex("call_", request_seq);
        call_id_prefix.push('_');
        let emitter = match protocol {
            OutwardProtocol::ChatCompletions => Emitter::Chat(ChatChunkEmitter::new()),
            OutwardProtocol::Responses => Emitter::Responses(ResponsesEventEmitter::new()),
        };
        Self {
            ctx: ConversionContext::new(response_id, model, created_at),
            detector: StreamingToolCallDetector::new(),
            emitter,
            protocol,
            call_id_prefix,
            tool_calls_emitted: 0,
            started: false,
            closed: false,
            terminal_error: None,
        }
    }

    #[must_use]
    pub fn protocol(&self) -> OutwardProtocol {
        self.protocol
    }

    #[must_use]
    pub fn response_id(&self) -> &str {
        self.ctx.response_id()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The upstream failure that ended the stream, if any.
    #[must_use]
    pub fn terminal_error(&self) -> Option<&TerminalError> {
        self.terminal_error.as_ref()
    }

    #[must_use]
    pub fn tool_calls_emitted(&self) -> usize {
        self.tool_calls_emitted
    }

    // -- pipeline -----------------------------------------------------------

    /// Emit the protocol preamble. Idempotent.
    pub fn start(&mut self, out: &mut Vec<String>) {
        if self.started || self.closed {
            return;
        }
        self.started = true;
        if let Emitter::Responses(emitter) = &mut self.emitter {
            emitter.created(&mut self.ctx, out);
            emitter.in_progress(&mut self.ctx, out);
        }
    }

    /// Translate one upstream event, appending outward frames to `out`.
    pub fn process_event(&mut self, event: UpstreamEvent, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        self.start(out);
        match event {
            UpstreamEvent::Ingesting => {
                tracing::debug!(response_id = %self.ctx.response_id(), "upstream ingesting");
            }
            UpstreamEvent::TokenData {
                target: TokenTarget::Message,
                content,
                ..
            } => self.process_message_token(&content, out),
            UpstreamEvent::TokenData {
                target: TokenTarget::ToolCall,
                content,
                ..
            } => match parse_tool_call(&content) {
                Some(call) => self.emit_tool_call(&call, out),
                None => {
                    tracing::debug!(
                        payload_len = content.len(),
                        "ignoring unparseable native tool-call payload"
                    );
                }
            },
            UpstreamEvent::TokenData {
                target: TokenTarget::ToolResult,
                content,
                ..
            } => {
                if is_error_result(&content) {
                    tracing::warn!(
                        response_id = %self.ctx.response_id(),
                        payload_len = content.len(),
                        "tool result reported an error"
                    );
                } else {
                    tracing::debug!(payload_len = content.len(), "tool result received");
                }
            }
            UpstreamEvent::Done => self.finish(out),
            UpstreamEvent::Error { message } => self.fail("upstream_error", message, out),
            UpstreamEvent::Timeout { message } => self.fail("upstream_timeout", message, out),
            UpstreamEvent::Rejected => self.fail(
                "upstream_rejected",
                "request rejected by upstream".to_string(),
                out,
            ),
        }
    }

    /// Flush the detector, close open items and emit the terminal event.
    pub fn finish(&mut self, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        self.start(out);
        if let Some(tail) = self.detector.finish() {
            self.emit_content(&tail, out);
        }
        let tool_calls_present = self.tool_calls_emitted > 0;
        match &mut self.emitter {
            Emitter::Chat(emitter) => emitter.done(&mut self.ctx, tool_calls_present, out),
            Emitter::Responses(emitter) => emitter.completed(&mut self.ctx, out),
        }
        self.closed = true;
        tracing::debug!(
            response_id = %self.ctx.response_id(),
            events = self.ctx.events_emitted(),
            tool_calls = self.tool_calls_emitted,
            "stream translation complete"
        );
    }

    /// The upstream ended without `done`; finish normally.
    pub fn end_of_stream(&mut self, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        tracing::warn!(
            response_id = %self.ctx.response_id(),
            "upstream ended without a done event"
        );
        self.finish(out);
    }

    /// Abort translation. An in-flight capture is discarded without being
    /// reported; nothing further is emitted.
    pub fn cancel(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let discarded = self.detector.cancel();
        tracing::debug!(
            response_id = %self.ctx.response_id(),
            discarded_capture = discarded,
            "stream translation canceled"
        );
        discarded
    }

    /// The non-streaming response body for the translated output.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Upstream`] when the upstream ended with a
    /// terminal failure, or [`BridgeError::Translation`] if the body cannot
    /// be serialized.
    pub fn final_body(&self) -> Result<serde_json::Value, BridgeError> {
        if let Some(error) = &self.terminal_error {
            return Err(BridgeError::Upstream {
                status: 502,
                message: format!("{}: {}", error.code, error.message),
            });
        }
        let body = match &self.emitter {
            Emitter::Chat(emitter) => serde_json::to_value(emitter.to_completion(&self.ctx))?,
            Emitter::Responses(emitter) => serde_json::to_value(emitter.to_response(&self.ctx))?,
        };
        Ok(body)
    }

    // -- internals ----------------------------------------------------------

    fn process_message_token(&mut self, token: &str, out: &mut Vec<String>) {
        for action in self.detector.process(token) {
            match action {
                DetectorAction::ContentDelta(text) => self.emit_content(&text, out),
                DetectorAction::ToolCallDetected { call, .. } => self.emit_tool_call(&call, out),
                DetectorAction::Buffering => {}
            }
        }
    }

    fn emit_content(&mut self, text: &str, out: &mut Vec<String>) {
        match &mut self.emitter {
            Emitter::Chat(emitter) => emitter.content_delta(&mut self.ctx, text, out),
            Emitter::Responses(emitter) => emitter.text_delta(&mut self.ctx, text, out),
        }
    }

    fn emit_tool_call(&mut self, call: &ToolCall, out: &mut Vec<String>) {
        let mut call_id = String::with_capacity(self.call_id_prefix.len() + 4);
        call_id.push_str(&self.call_id_prefix);
        push_usize_decimal(&mut call_id, self.tool_calls_emitted);
        self.tool_calls_emitted += 1;
        tracing::debug!(call_id = %call_id, name = %call.name, "emitting tool call");
        match &mut self.emitter {
            Emitter::Chat(emitter) => {
                emitter.tool_call_delta(&mut self.ctx, &call_id, &call.name, &call.arguments, out);
            }
            Emitter::Responses(emitter) => {
                emitter.function_call(&mut self.ctx, &call_id, &call.name, &call.arguments, out);
            }
        }
    }

    fn fail(&mut self, code: &'static str, message: String, out: &mut Vec<String>) {
        tracing::warn!(
            response_id = %self.ctx.response_id(),
            code,
            message = %message,
            "upstream reported a terminal failure"
        );
        // The open capture belongs to an aborted answer.
        self.detector.cancel();
        match &mut self.emitter {
            Emitter::Chat(emitter) => emitter.error(
                &mut self.ctx,
                ErrorCategory::BadGateway,
                code,
                &message,
                out,
            ),
            Emitter::Responses(emitter) => emitter.error(&mut self.ctx, code, &message, out),
        }
        self.terminal_error = Some(TerminalError { code, message });
        self.closed = true;
    }
}

impl Drop for StreamTranslator {
    fn drop(&mut self) {
        if !self.closed {
            self.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Stream adapters
// ---------------------------------------------------------------------------

/// Drive `translator` over `events`, yielding outward SSE frames.
///
/// Upstream reading stops as soon as a terminal event is emitted. Dropping
/// the returned stream cancels the translator.
pub fn translate_stream<S>(
    translator: StreamTranslator,
    events: S,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = UpstreamEvent> + Send + 'static,
{
    futures_util::stream::unfold(
        (
            Box::pin(events),
            translator,
            Vec::<String>::with_capacity(8),
            VecDeque::<Bytes>::with_capacity(8),
        ),
        |(mut events, mut translator, mut frames, mut pending)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((chunk, (events, translator, frames, pending)));
                }
                if translator.is_closed() {
                    return None;
                }
                if translator.started {
                    match events.as_mut().next().await {
                        Some(event) => translator.process_event(event, &mut frames),
                        None => translator.end_of_stream(&mut frames),
                    }
                } else {
                    translator.start(&mut frames);
                }
                pending.extend(frames.drain(..).map(Bytes::from));
            }
        },
    )
}

/// Run `translator` over `events` to completion and return the
/// non-streaming body.
///
/// # Errors
///
/// See [`StreamTranslator::final_body`].
pub async fn collect_response<S>(
    mut translator: StreamTranslator,
    events: S,
) -> Result<serde_json::Value, BridgeError>
where
    S: Stream<Item = UpstreamEvent> + Send,
{
    let mut events = Box::pin(events);
    let mut discard = Vec::with_capacity(8);
    translator.start(&mut discard);
    while !translator.is_closed() {
        discard.clear();
        match events.next().await {
            Some(event) => translator.process_event(event, &mut discard),
            None => translator.end_of_stream(&mut discard),
        }
    }
    translator.final_body()
}
