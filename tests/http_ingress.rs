use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use chatbridge::config::AppConfig;
use chatbridge::routing::dispatch::dispatch_request;
use chatbridge::state::AppState;
use chatbridge::transport::{MockTransport, UpstreamTransport};

fn mock_state() -> Arc<AppState> {
    Arc::new(AppState::new(
        AppConfig::default(),
        UpstreamTransport::Mock(MockTransport::new(0)),
    ))
}

fn http_state(base_url: String) -> Arc<AppState> {
    let mut config = AppConfig::default();
    config.upstream.mock = false;
    config.upstream.base_url = base_url;
    config.upstream.api_key = "backend-secret".to_string();
    let transport = UpstreamTransport::from_config(&config).expect("http transport");
    Arc::new(AppState::new(config, transport))
}

async fn send(
    state: Arc<AppState>,
    base_path: &str,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Response {
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value).expect("serialize request")),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .expect("request");
    dispatch_request(state, Arc::<str>::from(base_path), request)
        .await
        .expect("dispatch")
}

async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn health_reports_transport() {
    let response = send(mock_state(), "", Method::GET, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "chatbridge is running");
    assert_eq!(body["config"]["upstream"]["transport"], "mock");
    assert_eq!(body["config"]["features"]["default_model"], "backend-chat");
}

#[tokio::test]
async fn chat_completion_echoes_last_user_turn() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/chat/completions",
        Some(json!({
            "messages": [
                {"role": "system", "content": "Be kind."},
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "ok"},
                {"role": "user", "content": "hello there"}
            ]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "backend-chat");
    assert!(body["id"].as_str().expect("id").starts_with("chatcmpl-"));
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "hello there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn chat_stream_is_sse_and_ends_with_done() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/chat/completions",
        Some(json!({
            "model": "custom-model",
            "stream": true,
            "messages": [{"role": "user", "content": "one two three"}]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"text/event-stream"[..])
    );
    let text = body_text(response).await;
    assert!(text.ends_with("data: [DONE]\n\n"));

    let chunks: Vec<Value> = text
        .split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("chunk json"))
        .collect();
    // three words plus the finish chunk
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0]["model"], "custom-model");
    let content: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(content, "one two three");
}

#[tokio::test]
async fn responses_stream_runs_full_lifecycle() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/responses",
        Some(json!({"input": "hi there", "stream": true})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    let events: Vec<&str> = text
        .split("\n\n")
        .filter_map(|frame| frame.strip_prefix("event: "))
        .filter_map(|rest| rest.split('\n').next())
        .collect();
    assert_eq!(
        events,
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.completed",
        ]
    );
}

#[tokio::test]
async fn responses_non_stream_returns_completed_response() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/responses",
        Some(json!({
            "instructions": "Be brief.",
            "input": [{"role": "user", "content": [{"type": "input_text", "text": "short answer"}]}]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["id"].as_str().expect("id").starts_with("resp_"));
    assert_eq!(body["status"], "completed");
    assert_eq!(body["output"][0]["type"], "message");
    // The mock echoes the first user turn, which carries the instructions.
    assert_eq!(
        body["output"][0]["content"][0]["text"],
        "short answer\n\n[Personal context: Be brief.]"
    );
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = dispatch_request(mock_state(), Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn missing_responses_input_is_rejected() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/responses",
        Some(json!({"model": "m"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversation_without_turns_is_rejected() {
    let response = send(
        mock_state(),
        "",
        Method::POST,
        "/v1/chat/completions",
        Some(json!({"messages": [{"role": "system", "content": "only instructions"}]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let response = send(mock_state(), "", Method::POST, "/v1/messages", Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(mock_state(), "", Method::GET, "/v1/chat/completions", None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn base_path_prefixes_every_route() {
    let body = json!({"messages": [{"role": "user", "content": "ping"}]});
    let response = send(
        mock_state(),
        "/bridge",
        Method::POST,
        "/bridge/v1/chat/completions",
        Some(body.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        mock_state(),
        "/bridge",
        Method::POST,
        "/v1/chat/completions",
        Some(body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(mock_state(), "/bridge", Method::GET, "/bridge", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn http_backend_receives_turns_and_streams_back() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().route(
        "/chat",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let hits = Arc::clone(&hits_clone);
            async move {
                hits.fetch_add(1, Ordering::Relaxed);
                assert_eq!(
                    headers.get(header::AUTHORIZATION).map(|v| v.as_bytes()),
                    Some(&b"Bearer backend-secret"[..])
                );
                assert_eq!(body["stream"], true);
                assert_eq!(body["model"], "backend-chat");
                let turns = body["turns"].as_array().cloned().unwrap_or_default();
                let mut sse = String::from("data: {\"type\":\"ingesting\"}\n\n");
                sse.push_str(&format!(
                    "data: {}\n\n",
                    json!({
                        "type": "token_data",
                        "target": "message",
                        "count": 1,
                        "content": format!("{} turns", turns.len()),
                    })
                ));
                sse.push_str("data: {\"type\":\"done\"}\n\n");
                ([(header::CONTENT_TYPE, "text/event-stream")], sse)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let response = send(
        http_state(format!("http://{addr}/chat")),
        "",
        Method::POST,
        "/v1/chat/completions",
        Some(json!({
            "messages": [
                {"role": "user", "content": "a"},
                {"role": "assistant", "content": "b"},
                {"role": "user", "content": "c"}
            ]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "3 turns");
    assert_eq!(hits.load(Ordering::Relaxed), 1);

    server.abort();
}

#[tokio::test]
async fn http_backend_failure_status_maps_to_bad_gateway() {
    let app = Router::new().route(
        "/chat",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "backend overloaded") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failing backend");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let response = send(
        http_state(format!("http://{addr}/chat")),
        "",
        Method::POST,
        "/v1/responses",
        Some(json!({"input": "hi", "stream": true})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("backend overloaded"));

    server.abort();
}

#[tokio::test]
async fn unreachable_backend_maps_to_bad_gateway() {
    let response = send(
        http_state("http://127.0.0.1:9/chat".to_string()),
        "",
        Method::POST,
        "/v1/chat/completions",
        Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
