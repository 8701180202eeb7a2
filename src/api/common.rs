use std::convert::Infallible;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::error::BridgeError;
use crate::protocol::turns::Turn;
use crate::protocol::OutwardProtocol;
use crate::state::AppState;
use crate::stream::{collect_response, translate_stream, StreamTranslator};
use crate::upstream::upstream_event_stream;
use crate::util::unix_now_secs;

/// Open the backend stream for `turns` and answer in `protocol`, either as
/// an SSE stream or as one JSON body.
///
/// # Errors
///
/// Returns transport and upstream-status errors raised before the first
/// outward byte, and terminal upstream failures in non-streaming mode.
pub(crate) async fn translate_and_respond(
    state: &AppState,
    protocol: OutwardProtocol,
    model: &str,
    turns: &[Turn],
    stream: bool,
) -> Result<Response, BridgeError> {
    if turns.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "request contains no user or assistant content".to_string(),
        ));
    }
    let request_seq = state.next_request_seq();
    let translator = StreamTranslator::new(protocol, request_seq, model, unix_now_secs());
    tracing::info!(
        response_id = %translator.response_id(),
        ?protocol,
        model,
        turns = turns.len(),
        stream,
        transport = state.transport.kind(),
        "translating request"
    );

    let byte_stream = state.transport.open_stream(model, turns).await?;
    let events = upstream_event_stream(byte_stream);

    if stream {
        let frames = translate_stream(translator, events).map(Ok::<_, Infallible>);
        return Ok(sse_ok_response(Body::from_stream(frames)));
    }
    let body = collect_response(translator, events).await?;
    Ok(axum::Json(body).into_response())
}

pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(
    body: &bytes::Bytes,
    what: &str,
) -> Result<T, BridgeError> {
    serde_json::from_slice(body)
        .map_err(|e| BridgeError::InvalidRequest(format!("Invalid {what} body: {e}")))
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
