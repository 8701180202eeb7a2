use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::api::common::{parse_json_body, translate_and_respond};
use crate::error::{into_axum_response, BridgeError};
use crate::protocol::openai_responses::ResponsesRequest;
use crate::protocol::turns::input_to_turns;
use crate::protocol::OutwardProtocol;
use crate::state::AppState;

const PROTOCOL: OutwardProtocol = OutwardProtocol::Responses;

/// `POST /v1/responses`
pub async fn handler(State(state): State<Arc<AppState>>, body: bytes::Bytes) -> Response {
    match handler_inner(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "responses request failed");
            into_axum_response(&err)
        }
    }
}

async fn handler_inner(state: &AppState, body: &bytes::Bytes) -> Result<Response, BridgeError> {
    let request: ResponsesRequest = parse_json_body(body, "OpenAI Responses request")?;
    if request.input.is_null() {
        return Err(BridgeError::InvalidRequest("input is required".to_string()));
    }
    let turns = input_to_turns(
        &request.input,
        request.instructions.as_deref(),
        &state.config.instructions,
    );
    let model = state.resolve_model(request.model.as_deref());
    translate_and_respond(state, PROTOCOL, model, &turns, request.is_stream()).await
}
