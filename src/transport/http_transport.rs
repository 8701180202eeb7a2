use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::BridgeError;
use crate::protocol::turns::Turn;

use super::UpstreamByteStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Serialize)]
struct BackendChatRequest<'a> {
    model: &'a str,
    turns: &'a [Turn],
    stream: bool,
}

fn build_reqwest_client(timeout: Duration) -> Result<reqwest::Client, BridgeError> {
    reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Streaming HTTP client for the backend chat service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the client cannot be built.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            client: build_reqwest_client(Duration::from_secs(server.timeout))?,
            base_url: upstream.base_url.trim().to_string(),
            api_key: upstream.api_key.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the turns and return the response body as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the request cannot be sent and
    /// [`BridgeError::Upstream`] for a non-success status.
    pub async fn open_stream(
        &self,
        model: &str,
        turns: &[Turn],
    ) -> Result<UpstreamByteStream, BridgeError> {
        let body = BackendChatRequest {
            model,
            turns,
            stream: true,
        };
        let mut request = self
            .client
            .post(&self.base_url)
            .header(http::header::ACCEPT, "text/event-stream")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| BridgeError::Transport(format!("Upstream request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "upstream returned non-success status");
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message: truncate_chars(&text, ERROR_BODY_MAX_CHARS),
            });
        }

        tracing::debug!(turns = turns.len(), model, "upstream stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| BridgeError::Transport(err.to_string())))
            .boxed())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
