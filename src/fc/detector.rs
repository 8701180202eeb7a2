use smallvec::SmallVec;

use super::{parse_tool_call, ToolCall};
use crate::json_scan::{JsonBoundaryTracker, ScanSegment};

// Streaming tool-call detector.
//
// Sits on the message channel and classifies live content as prose or an
// in-flight JSON object. Objects with a string `name` become tool calls, read
// the same way as native `tool_call` payloads; every other byte is forwarded
// as content.
//
// Key invariants:
// - Content deltas plus detected tool-call spans reproduce the input exactly
//   once, in order.
// - Detection works across arbitrary token boundaries.
// - An unresolved capture is flushed as content on `finish` and discarded on
//   `cancel`; it is never reported as a tool call.

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// State of the detector state-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Forwarding text as it arrives.
    Prose,
    /// Inside a `{...}` span; text is held until the span closes.
    Capturing,
}

/// Action returned by [`StreamingToolCallDetector::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorAction {
    /// Forward this text to the client unchanged.
    ContentDelta(String),
    /// A complete tool call was recognised. `index` counts detected calls
    /// from zero in arrival order.
    ToolCallDetected { index: usize, call: ToolCall },
    /// The token was absorbed into an open capture; nothing to forward yet.
    Buffering,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Streaming tool-call detector for one content stream.
#[derive(Debug, Default)]
pub struct StreamingToolCallDetector {
    tracker: JsonBoundaryTracker,
    next_index: usize,
}

impl StreamingToolCallDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current state.
    #[must_use]
    pub fn state(&self) -> DetectorState {
        if self.tracker.is_capturing() {
            DetectorState::Capturing
        } else {
            DetectorState::Prose
        }
    }

    /// Number of tool calls detected so far.
    #[must_use]
    pub fn detected_count(&self) -> usize {
        self.next_index
    }

    // -- public API ---------------------------------------------------------

    /// Feed one content token and obtain the resulting actions, in order.
    ///
    /// Returns a single [`DetectorAction::Buffering`] when nothing can be
    /// forwarded yet.
    pub fn process(&mut self, token: &str) -> SmallVec<[DetectorAction; 2]> {
        let mut actions = SmallVec::new();
        for segment in self.tracker.feed(token) {
            match segment {
                ScanSegment::PlainText(text) => actions.push(DetectorAction::ContentDelta(text)),
                ScanSegment::CompleteJson(json) => actions.push(self.resolve_capture(json)),
            }
        }
        if actions.is_empty() {
            actions.push(DetectorAction::Buffering);
        }
        actions
    }

    /// Call when the stream ends. Returns the unresolved capture, if any, so
    /// it can be forwarded as plain content.
    pub fn finish(&mut self) -> Option<String> {
        let capture = self.tracker.take_capture()?;
        tracing::warn!(
            buffered_len = capture.buffer.len(),
            depth = capture.depth,
            start_offset = capture.start_offset,
            "stream ended inside an unbalanced JSON capture; flushing as content"
        );
        Some(capture.buffer)
    }

    /// Abort the stream. An open capture is dropped without being emitted.
    ///
    /// Returns `true` when a capture was discarded.
    pub fn cancel(&mut self) -> bool {
        match self.tracker.take_capture() {
            Some(capture) => {
                tracing::debug!(
                    buffered_len = capture.buffer.len(),
                    start_offset = capture.start_offset,
                    "discarding in-flight capture on cancel"
                );
                true
            }
            None => false,
        }
    }

    // -- capture resolution -------------------------------------------------

    /// Inline captures follow the same shape rule as the native tool channel.
    fn resolve_capture(&mut self, json: String) -> DetectorAction {
        match parse_tool_call(&json) {
            Some(call) => {
                let index = self.next_index;
                self.next_index += 1;
                tracing::debug!(index, name = %call.name, "detected inline tool call");
                DetectorAction::ToolCallDetected { index, call }
            }
            None => DetectorAction::ContentDelta(json),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
