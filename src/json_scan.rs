//! Incremental scanner that finds balanced `{...}` spans inside free-form text.
//!
//! The scan state lives in a [`CaptureState`] owned by one stream, so any
//! number of streams can be scanned concurrently. Boundaries are exact across
//! arbitrary chunk splits, including splits inside string literals and escape
//! sequences.

use smallvec::SmallVec;

/// One piece of scanner output, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSegment {
    /// Text seen outside any capture.
    PlainText(String),
    /// A balanced object, from its opening brace to its closing brace inclusive.
    CompleteJson(String),
}

/// State of an open capture. Present only while brace depth is above zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub buffer: String,
    pub depth: usize,
    pub in_string: bool,
    pub escape_pending: bool,
    /// Byte offset in the overall stream where the capture's `{` appeared.
    pub start_offset: usize,
}

/// Chunk-boundary-safe balanced-brace scanner.
#[derive(Debug, Default)]
pub struct JsonBoundaryTracker {
    capture: Option<CaptureState>,
    consumed: usize,
}

impl JsonBoundaryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a capture is currently open.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// The open capture, if any.
    #[must_use]
    pub fn capture(&self) -> Option<&CaptureState> {
        self.capture.as_ref()
    }

    /// Total bytes fed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Scan one chunk and return the segments it completes.
    ///
    /// Plain text within one chunk is coalesced into a single segment. Text
    /// that belongs to an unfinished capture is held until the capture closes
    /// or [`take_capture`](Self::take_capture) is called.
    pub fn feed(&mut self, chunk: &str) -> SmallVec<[ScanSegment; 2]> {
        let mut out = SmallVec::new();
        let mut plain_start: Option<usize> = None;

        for (i, ch) in chunk.char_indices() {
            if let Some(capture) = self.capture.as_mut() {
                capture.buffer.push(ch);
                if capture.in_string {
                    if capture.escape_pending {
                        capture.escape_pending = false;
                    } else if ch == '\\' {
                        capture.escape_pending = true;
                    } else if ch == '"' {
                        capture.in_string = false;
                    }
                    continue;
                }
                match ch {
                    '"' => capture.in_string = true,
                    '{' => capture.depth += 1,
                    '}' => {
                        capture.depth -= 1;
                        if capture.depth == 0 {
                            if let Some(done) = self.capture.take() {
                                out.push(ScanSegment::CompleteJson(done.buffer));
                            }
                        }
                    }
                    _ => {}
                }
                continue;
            }

            if ch == '{' {
                if let Some(start) = plain_start.take() {
                    out.push(ScanSegment::PlainText(chunk[start..i].to_string()));
                }
                self.capture = Some(CaptureState {
                    buffer: String::from("{"),
                    depth: 1,
                    in_string: false,
                    escape_pending: false,
                    start_offset: self.consumed + i,
                });
            } else if plain_start.is_none() {
                // A stray '}' at depth zero is ordinary text.
                plain_start = Some(i);
            }
        }

        if let Some(start) = plain_start {
            out.push(ScanSegment::PlainText(chunk[start..].to_string()));
        }
        self.consumed += chunk.len();
        out
    }

    /// Remove and return the open capture, resetting to the idle state.
    pub fn take_capture(&mut self) -> Option<CaptureState> {
        self.capture.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(tracker: &mut JsonBoundaryTracker, chunks: &[&str]) -> Vec<ScanSegment> {
        chunks
            .iter()
            .flat_map(|chunk| tracker.feed(chunk).into_iter())
            .collect()
    }

    fn plain(text: &str) -> ScanSegment {
        ScanSegment::PlainText(text.to_string())
    }

    fn json(text: &str) -> ScanSegment {
        ScanSegment::CompleteJson(text.to_string())
    }

    #[test]
    fn plain_text_only() {
        let mut tracker = JsonBoundaryTracker::new();
        assert_eq!(
            tracker.feed("hello world").into_vec(),
            vec![plain("hello world")]
        );
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut tracker = JsonBoundaryTracker::new();
        assert!(tracker.feed("").is_empty());
    }

    #[test]
    fn object_between_text() {
        let mut tracker = JsonBoundaryTracker::new();
        let segments = tracker.feed(r#"before {"a":{"b":1}} after"#).into_vec();
        assert_eq!(
            segments,
            vec![plain("before "), json(r#"{"a":{"b":1}}"#), plain(" after")]
        );
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let mut tracker = JsonBoundaryTracker::new();
        let segments = tracker.feed(r#"{"s":"}{ \" }"}"#).into_vec();
        assert_eq!(segments, vec![json(r#"{"s":"}{ \" }"}"#)]);
    }

    #[test]
    fn escaped_backslash_before_quote_closes_string() {
        let mut tracker = JsonBoundaryTracker::new();
        let segments = tracker.feed(r#"{"s":"a\\"}x"#).into_vec();
        assert_eq!(segments, vec![json(r#"{"s":"a\\"}"#), plain("x")]);
    }

    #[test]
    fn stray_closing_brace_is_plain_text() {
        let mut tracker = JsonBoundaryTracker::new();
        assert_eq!(tracker.feed("a } b").into_vec(), vec![plain("a } b")]);
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn capture_survives_across_chunks() {
        let mut tracker = JsonBoundaryTracker::new();
        assert_eq!(tracker.feed("x {\"na").into_vec(), vec![plain("x ")]);
        assert!(tracker.is_capturing());
        assert_eq!(tracker.capture().map(|c| c.start_offset), Some(2));
        assert!(tracker.feed("me\":\"{").is_empty());
        assert!(tracker.capture().is_some_and(|c| c.in_string));
        assert_eq!(
            tracker.feed("\"}").into_vec(),
            vec![json("{\"name\":\"{\"}")]
        );
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn every_split_point_matches_single_chunk() {
        let input = r#"pre {"name":"x","arguments":{"q":"a\"}b"}} post"#;
        let mut whole = JsonBoundaryTracker::new();
        let expected = whole.feed(input).into_vec();

        for split in 1..input.len() {
            let (a, b) = input.split_at(split);
            let mut tracker = JsonBoundaryTracker::new();
            let segments = feed_all(&mut tracker, &[a, b]);

            let mut rebuilt = String::new();
            let mut objects = Vec::new();
            for segment in &segments {
                match segment {
                    ScanSegment::PlainText(t) => rebuilt.push_str(t),
                    ScanSegment::CompleteJson(j) => {
                        rebuilt.push_str(j);
                        objects.push(j.clone());
                    }
                }
            }
            assert_eq!(rebuilt, input, "split at {split}");
            assert_eq!(
                objects,
                vec![r#"{"name":"x","arguments":{"q":"a\"}b"}}"#.to_string()],
                "split at {split}"
            );
        }
        assert_eq!(expected.len(), 3);
    }

    #[test]
    fn take_capture_resets_state() {
        let mut tracker = JsonBoundaryTracker::new();
        let _ = tracker.feed("{\"partial\":");
        let capture = tracker.take_capture().expect("open capture");
        assert_eq!(capture.buffer, "{\"partial\":");
        assert_eq!(capture.depth, 1);
        assert!(!tracker.is_capturing());
        assert_eq!(tracker.feed("ok").into_vec(), vec![plain("ok")]);
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let mut tracker = JsonBoundaryTracker::new();
        let segments = feed_all(&mut tracker, &["héllo {\"k\":\"ü\"}", " 😀"]);
        assert_eq!(
            segments,
            vec![plain("héllo "), json("{\"k\":\"ü\"}"), plain(" 😀")]
        );
    }
}
