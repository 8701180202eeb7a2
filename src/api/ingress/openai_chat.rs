use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::api::common::{parse_json_body, translate_and_respond};
use crate::error::{into_axum_response, BridgeError};
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::turns::to_turns;
use crate::protocol::OutwardProtocol;
use crate::state::AppState;

const PROTOCOL: OutwardProtocol = OutwardProtocol::ChatCompletions;

/// `POST /v1/chat/completions`
pub async fn handler(State(state): State<Arc<AppState>>, body: bytes::Bytes) -> Response {
    match handler_inner(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completions request failed");
            into_axum_response(&err)
        }
    }
}

async fn handler_inner(state: &AppState, body: &bytes::Bytes) -> Result<Response, BridgeError> {
    let request: OpenAiChatRequest = parse_json_body(body, "OpenAI Chat request")?;
    let turns = to_turns(&request.generic_messages(), &state.config.instructions);
    let model = state.resolve_model(request.model.as_deref());
    translate_and_respond(state, PROTOCOL, model, &turns, request.is_stream()).await
}
