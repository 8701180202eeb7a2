use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::BridgeError;
use crate::protocol::turns::{Turn, TurnRole};

use super::UpstreamByteStream;

/// In-process stand-in for the backend.
///
/// Without a script it answers `ingesting`, then echoes the last user turn
/// back one word per token, then `done`. With a script it replays the given
/// lines verbatim. Every line is preceded by the configured delay.
#[derive(Debug, Clone)]
pub struct MockTransport {
    delay: Duration,
    script: Option<Arc<[String]>>,
}

impl MockTransport {
    #[must_use]
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            script: None,
        }
    }

    /// Replay `lines` (each a complete `data: ...\n\n` frame) for every request.
    #[must_use]
    pub fn with_script(delay_ms: u64, lines: Vec<String>) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            script: Some(lines.into()),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn open_stream(&self, turns: &[Turn]) -> UpstreamByteStream {
        let lines = match &self.script {
            Some(script) => script.to_vec(),
            None => echo_script(turns),
        };
        let delay = self.delay;
        futures_util::stream::iter(lines)
            .then(move |line| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<Bytes, BridgeError>(Bytes::from(line))
            })
            .boxed()
    }
}

/// Backend frames that echo the last user turn word by word.
#[must_use]
pub fn echo_script(turns: &[Turn]) -> Vec<String> {
    let text = turns
        .iter()
        .rev()
        .find(|turn| turn.role == TurnRole::User)
        .map_or("", |turn| turn.content.as_str());

    let mut lines = Vec::with_capacity(text.len() / 4 + 2);
    lines.push(frame(&serde_json::json!({"type": "ingesting", "target": "message"})));
    for (count, word) in text.split_inclusive(' ').enumerate() {
        lines.push(frame(&serde_json::json!({
            "type": "token_data",
            "target": "message",
            "count": count + 1,
            "content": word,
        })));
    }
    lines.push(frame(&serde_json::json!({"type": "done"})));
    lines
}

fn frame(payload: &serde_json::Value) -> String {
    format!("data: {payload}\n\n")
}
