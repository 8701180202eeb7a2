//! Collaborators that supply the raw backend event stream.

mod http_transport;
mod mock;

pub use http_transport::HttpTransport;
pub use mock::MockTransport;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::protocol::turns::Turn;

/// Raw backend byte stream, framed later by [`crate::upstream::upstream_event_stream`].
pub type UpstreamByteStream = BoxStream<'static, Result<Bytes, BridgeError>>;

/// The transport selected by configuration.
#[derive(Debug)]
pub enum UpstreamTransport {
    Http(HttpTransport),
    Mock(MockTransport),
}

impl UpstreamTransport {
    /// Build the transport named by `config.upstream`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, BridgeError> {
        if config.upstream.mock {
            return Ok(UpstreamTransport::Mock(MockTransport::new(
                config.upstream.mock_delay_ms,
            )));
        }
        Ok(UpstreamTransport::Http(HttpTransport::new(
            &config.server,
            &config.upstream,
        )?))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamTransport::Http(_) => "http",
            UpstreamTransport::Mock(_) => "mock",
        }
    }

    /// Open the backend stream for `turns`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the backend cannot be reached
    /// and [`BridgeError::Upstream`] when it answers with a non-success status.
    pub async fn open_stream(
        &self,
        model: &str,
        turns: &[Turn],
    ) -> Result<UpstreamByteStream, BridgeError> {
        match self {
            UpstreamTransport::Http(transport) => transport.open_stream(model, turns).await,
            UpstreamTransport::Mock(transport) => Ok(transport.open_stream(turns)),
        }
    }
}
