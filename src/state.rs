mod request_id;

use crate::config::AppConfig;
use crate::transport::UpstreamTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Everything here is read-only after startup apart from the request
/// sequence counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: UpstreamTransport,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: UpstreamTransport) -> Self {
        Self {
            config,
            transport,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Sequence number for a new request.
    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    /// Model to report for a request, falling back to the configured default.
    #[must_use]
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(model) if !model.trim().is_empty() => model,
            _ => &self.config.features.default_model,
        }
    }
}
