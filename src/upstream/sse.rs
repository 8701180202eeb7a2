//! Incremental framing of the backend `data: <json>\n\n` stream.
//!
//! Network chunks arrive at arbitrary byte boundaries; the parser buffers
//! partial lines and decodes every complete `data:` line into an
//! [`UpstreamEvent`].
use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

use super::{decode_upstream_line, UpstreamEvent};

struct PendingEvents {
    events: SmallVec<[UpstreamEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut events = SmallVec::new();
        events.reserve(capacity);
        Self { events, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<UpstreamEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = self.events[self.head].clone();
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<UpstreamEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

/// Incremental line parser for the backend stream.
///
/// Rules:
/// - Every complete line is decoded on its own; the backend never splits one
///   JSON payload over several `data:` lines.
/// - Blank lines are separators, `:` lines are comments.
/// - A trailing `\r` is stripped.
/// - Undecodable lines are dropped.
pub struct UpstreamLineParser {
    buffer: String,
    read_offset: usize,
}

impl UpstreamLineParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
        }
    }

    /// Feed raw text and return any complete events.
    pub fn feed(&mut self, chunk: &str) -> Vec<UpstreamEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<UpstreamEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            if let Some(event) = decode_upstream_line(line) {
                out.push(event);
            }
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Decode whatever unterminated line remains once the stream has ended.
    pub fn finish_into(&mut self, out: &mut Vec<UpstreamEvent>) {
        let tail = &self.buffer[self.read_offset..];
        if let Some(event) = decode_upstream_line(tail) {
            out.push(event);
        }
        self.buffer.clear();
        self.read_offset = 0;
    }
}

impl Default for UpstreamLineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a backend byte stream into decoded [`UpstreamEvent`]s.
///
/// Incomplete UTF-8 sequences at a chunk edge are carried over to the next
/// chunk; invalid bytes are decoded as U+FFFD. A transport error ends the stream; the caller sees it as an
/// upstream end-of-stream without `done`.
pub fn upstream_event_stream<S, E>(byte_stream: S) -> impl Stream<Item = UpstreamEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            UpstreamLineParser::new(),
            Vec::<u8>::new(),
            Vec::<UpstreamEvent>::with_capacity(8),
            PendingEvents::with_capacity(8),
            false,
        ),
        |(mut stream, mut parser, mut remainder, mut parsed, mut pending, mut ended)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((event, (stream, parser, remainder, parsed, pending, ended)));
                }
                if ended {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        remainder.extend_from_slice(&bytes);
                        let consumed = feed_utf8_prefix(&mut parser, &remainder, &mut parsed);
                        remainder.drain(..consumed);
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "upstream byte stream failed");
                        flush_remainder(&mut parser, &mut remainder, &mut parsed);
                        ended = true;
                    }
                    None => {
                        flush_remainder(&mut parser, &mut remainder, &mut parsed);
                        ended = true;
                    }
                }
                pending.extend_from_vec(&mut parsed);
            }
        },
    )
}

/// Feed every decodable byte of `bytes` to `parser` and return how many
/// bytes were consumed.
///
/// Invalid sequences become U+FFFD so the surrounding line still frames and
/// later lines keep decoding. Only an incomplete sequence at the very end is
/// left unconsumed, to be completed by the next chunk.
fn feed_utf8_prefix(
    parser: &mut UpstreamLineParser,
    bytes: &[u8],
    out: &mut Vec<UpstreamEvent>,
) -> usize {
    let mut start = 0;
    while start < bytes.len() {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(text) => {
                parser.feed_into(text, out);
                return bytes.len();
            }
            Err(err) => {
                let valid_end = start + err.valid_up_to();
                if let Ok(text) = std::str::from_utf8(&bytes[start..valid_end]) {
                    parser.feed_into(text, out);
                }
                let Some(invalid_len) = err.error_len() else {
                    return valid_end;
                };
                tracing::debug!(
                    offset = valid_end,
                    invalid_len,
                    "replacing invalid UTF-8 in upstream stream"
                );
                parser.feed_into("\u{FFFD}", out);
                start = valid_end + invalid_len;
            }
        }
    }
    start
}

/// End of input: a dangling partial sequence can no longer complete.
fn flush_remainder(
    parser: &mut UpstreamLineParser,
    remainder: &mut Vec<u8>,
    out: &mut Vec<UpstreamEvent>,
) {
    if !remainder.is_empty() {
        parser.feed_into(&String::from_utf8_lossy(remainder), out);
        remainder.clear();
    }
    parser.finish_into(out);
}
