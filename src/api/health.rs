use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chatbridge is running",
        "config": {
            "upstream": {
                "transport": state.transport.kind(),
                "mock_delay_ms": config.upstream.mock_delay_ms,
            },
            "instructions": {
                "default_configured": config.instructions.default.is_some(),
                "append": config.instructions.append,
            },
            "features": {
                "log_level": config.features.log_level,
                "default_model": config.features.default_model,
            }
        }
    }))
}
