use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::response::Response;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use llm_gateway::config::parse_config;
use llm_gateway::routing::dispatch::dispatch_request;
use llm_gateway::state::AppState;
use serde_json::{json, Value};

const PROVIDERS: &str = r#"
providers:
  - id: echo
    kind: echo
    models: [echo-1]
    chunk_chars: 4
  - id: bot
    kind: scripted
    models: [x]
    script:
      - text: "Hello"
      - tool_start: { id: "call_1", name: "lookup" }
      - tool_args: { id: "call_1", fragment: "{\"a\":" }
      - tool_args: { id: "call_1", fragment: "1}" }
      - usage: { input_tokens: 3, output_tokens: 5 }
      - stop_reason: "tool_use"
  - id: hang
    kind: scripted
    models: [h-1]
    script:
      - text: "tick"
      - hang
  - id: perm
    kind: scripted
    models: [p-1]
    script:
      - permission: { tool: "bash", description: "list files" }
      - text: "done"
  - id: broken
    kind: scripted
    models: [b-1]
    list_models_error: "upstream unavailable"
"#;

fn gateway(prefix: &str) -> Arc<AppState> {
    let config = parse_config(&format!("{prefix}{PROVIDERS}")).expect("test config");
    Arc::new(AppState::from_config(config))
}

fn open_gateway() -> Arc<AppState> {
    gateway("")
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
    match dispatch_request(Arc::clone(state), Arc::from(""), request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn post_with_event_id(path: &str, body: &Value, event_id: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .header("x-event-id", event_id)
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

/// `(event name, data)` pairs of an SSE body.
fn sse_frames(text: &str) -> Vec<(Option<String>, String)> {
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            let mut event = None;
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data.push_str(payload);
                }
            }
            (event, data)
        })
        .collect()
}

fn anthropic_body(model: &str, stream: bool, text: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": 64,
        "stream": stream,
        "messages": [{"role": "user", "content": text}]
    })
}

fn openai_body(model: &str, stream: bool, text: &str) -> Value {
    json!({
        "model": model,
        "stream": stream,
        "stream_options": {"include_usage": true},
        "messages": [{"role": "user", "content": text}]
    })
}

#[tokio::test]
async fn test_anthropic_missing_max_tokens_is_rejected_before_admission() {
    let state = open_gateway();
    let body = json!({"model": "echo/echo-1", "messages": [{"role": "user", "content": "hi"}]});
    let response = send(&state, post_json("/v1/messages", &body)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(json["error"]["message"], "max_tokens: field is required");
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_openai_missing_model_uses_openai_envelope() {
    let state = open_gateway();
    let body = json!({"messages": [{"role": "user", "content": "hi"}]});
    let response = send(&state, post_json("/v1/chat/completions", &body)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "model: field is required");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["param"].is_null());
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_unroutable_model_is_rejected() {
    let state = open_gateway();
    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("nowhere", false, "hi")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["error"]["message"],
        "No provider mapping found for model 'nowhere'"
    );
}

#[tokio::test]
async fn test_anthropic_stream_frames() {
    let state = open_gateway();
    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("bot/x", true, "hi")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    assert!(response.headers().contains_key("x-event-id"));

    let text = body_text(response).await;
    let frames = sse_frames(&text);
    let names: Vec<_> = frames
        .iter()
        .map(|(event, _)| event.clone().unwrap_or_default())
        .collect();
    assert_eq!(names.first().map(String::as_str), Some("message_start"));
    assert_eq!(names.last().map(String::as_str), Some("message_stop"));

    let data: Vec<Value> = frames
        .iter()
        .map(|(_, data)| serde_json::from_str(data).expect("frame json"))
        .collect();

    let tool_start = data
        .iter()
        .find(|d| d["type"] == "content_block_start" && d["content_block"]["type"] == "tool_use")
        .expect("tool_use block");
    assert_eq!(tool_start["index"], 1);
    assert_eq!(tool_start["content_block"]["name"], "lookup");

    let json_deltas: Vec<_> = data
        .iter()
        .filter(|d| d["delta"]["type"] == "input_json_delta")
        .collect();
    assert_eq!(json_deltas.len(), 1);
    assert_eq!(json_deltas[0]["delta"]["partial_json"], "{\"a\":1}");

    assert!(data
        .iter()
        .any(|d| d["delta"]["type"] == "text_delta" && d["delta"]["text"] == "Hello"));

    let message_delta = data
        .iter()
        .find(|d| d["type"] == "message_delta")
        .expect("message_delta");
    assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
    assert_eq!(message_delta["usage"]["output_tokens"], 5);
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_openai_stream_chunks() {
    let state = open_gateway();
    let response = send(
        &state,
        post_json("/v1/chat/completions", &openai_body("bot/x", true, "hi")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.ends_with("data: [DONE]\n\n"));

    let chunks: Vec<Value> = sse_frames(&text)
        .into_iter()
        .filter(|(_, data)| data != "[DONE]")
        .map(|(_, data)| serde_json::from_str(&data).expect("chunk json"))
        .collect();

    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert!(chunks
        .iter()
        .any(|c| c["choices"][0]["delta"]["content"] == "Hello"));

    let fragments: Vec<&str> = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"].as_str())
        .filter(|args| !args.is_empty())
        .collect();
    assert_eq!(fragments, vec!["{\"a\":", "1}"]);

    assert!(chunks
        .iter()
        .any(|c| c["choices"][0]["finish_reason"] == "tool_calls"));
    let usage = chunks.last().expect("usage chunk");
    assert_eq!(usage["choices"], json!([]));
    assert_eq!(usage["usage"]["total_tokens"], 8);
}

#[tokio::test]
async fn test_non_streaming_bodies() {
    let state = open_gateway();

    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("echo/echo-1", false, "ping pong")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-event-id"));
    let json = body_json(response).await;
    assert_eq!(json["type"], "message");
    assert_eq!(json["role"], "assistant");
    assert_eq!(json["content"][0]["text"], "ping pong");
    assert_eq!(json["stop_reason"], "end_turn");

    let response = send(
        &state,
        post_json(
            "/v1/chat/completions",
            &openai_body("echo/echo-1", false, "ping pong"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["object"], "chat.completion");
    assert_eq!(json["choices"][0]["message"]["content"], "ping pong");
    assert_eq!(json["choices"][0]["finish_reason"], "stop");

    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("bot/x", false, "hi")),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["content"][1]["type"], "tool_use");
    assert_eq!(json["content"][1]["input"], json!({"a": 1}));
    assert_eq!(json["stop_reason"], "tool_use");
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_count_tokens_admits_no_session() {
    let state = open_gateway();
    let body = json!({
        "model": "echo/echo-1",
        "messages": [{"role": "user", "content": "count these characters please"}]
    });
    let response = send(&state, post_json("/v1/messages/count_tokens", &body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["input_tokens"].as_u64().is_some_and(|n| n > 0));
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_models_tolerate_provider_failure() {
    let state = open_gateway();
    let response = send(&state, get("/v1/models")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["object"], "list");
    let ids: Vec<&str> = json["data"]
        .as_array()
        .expect("data")
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    for expected in ["echo/echo-1", "bot/x", "hang/h-1", "perm/p-1"] {
        assert!(ids.contains(&expected), "missing {expected} in {ids:?}");
    }
    assert!(!ids.iter().any(|id| id.starts_with("broken/")));
}

#[tokio::test]
async fn test_auth_rejections_follow_path_envelope() {
    let state = gateway("auth:\n  api_keys: [\"k1\"]\n");

    let response = send(&state, get("/v1/models")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["type"], "authentication_error");
    assert!(json.get("type").is_none());

    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("echo/echo-1", false, "hi")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["type"], "error");

    let request = Request::builder()
        .uri("/health")
        .header("x-api-key", "k1")
        .body(Body::empty())
        .expect("request");
    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_preflight_and_unknown_routes() {
    let state = gateway("auth:\n  api_keys: [\"k1\"]\n");

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/chat/completions")
        .body(Body::empty())
        .expect("request");
    let response = send(&state, preflight).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers()["access-control-allow-headers"]
        .to_str()
        .expect("ascii")
        .contains("X-Event-Id"));

    let response = send(&state, get("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let response = send(&state, get("/v1/chat/completions")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_stop_ends_stream_with_user_stop() {
    let state = open_gateway();
    let response = send(
        &state,
        post_with_event_id(
            "/v1/messages",
            &anthropic_body("hang/h-1", true, "hi"),
            "evt-stop",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-event-id"], "evt-stop");

    let mut body = response.into_body();
    let first = body
        .frame()
        .await
        .expect("first frame")
        .expect("frame ok")
        .into_data()
        .expect("data frame");
    assert!(String::from_utf8_lossy(&first).contains("message_start"));

    let duplicate = send(
        &state,
        post_with_event_id(
            "/v1/messages",
            &anthropic_body("hang/h-1", true, "again"),
            "evt-stop",
        ),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let response = send(&state, get("/v1/streams/evt-stop")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(send(&state, get("/v1/streams")).await).await;
    assert_eq!(listing["active"], 1);

    let response = send(&state, post_json("/v1/streams/evt-stop/stop", &json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["stopping"], true);

    let rest = to_bytes(body, usize::MAX).await.expect("rest of stream");
    let rest = String::from_utf8(rest.to_vec()).expect("utf8");
    assert!(rest.contains("event: message_stop"));
    assert_eq!(state.sessions.active_count(), 0);

    let response = send(&state, get("/v1/streams/evt-stop")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&state, post_json("/v1/streams/evt-stop/stop", &json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_all_waits_for_streams() {
    let state = open_gateway();
    let response = send(
        &state,
        post_json("/v1/chat/completions", &openai_body("hang/h-1", true, "hi")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let reader = tokio::spawn(body_text(response));

    let response = send(&state, post_json("/v1/streams/stop_all", &json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["stopped"], 1);

    let text = reader.await.expect("reader task");
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_concurrency_ceiling_returns_429() {
    let state = gateway("server:\n  max_concurrent_streams: 1\n");
    let first = send(
        &state,
        post_json("/v1/messages", &anthropic_body("hang/h-1", true, "hi")),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(
        &state,
        post_json("/v1/messages", &anthropic_body("echo/echo-1", false, "hi")),
    )
    .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(second).await;
    assert_eq!(json["error"]["type"], "rate_limit_error");

    drop(first);
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_permission_round_trip() {
    let state = open_gateway();
    let call_state = Arc::clone(&state);
    let call = tokio::spawn(async move {
        let response = send(
            &call_state,
            post_json("/v1/messages", &anthropic_body("perm/p-1", false, "ls")),
        )
        .await;
        body_json(response).await
    });

    let mut pending = Value::Null;
    for _ in 0..200 {
        let listing = body_json(send(&state, get("/v1/permissions")).await).await;
        if listing["data"].as_array().is_some_and(|data| !data.is_empty()) {
            pending = listing["data"][0].clone();
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pending["tool_name"], "bash");
    let request_id = pending["request_id"].as_str().expect("request id").to_string();

    let path = format!("/v1/permissions/{request_id}");
    let response = send(&state, post_json(&path, &json!({"granted": true}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["granted"], true);
    assert_eq!(json["remembered"], false);

    let reply = call.await.expect("call task");
    assert_eq!(reply["content"][0]["text"], "done");

    let response = send(&state, post_json(&path, &json!({"granted": false}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_routing_default_switch() {
    let state = open_gateway();

    let response = send(
        &state,
        post_json("/v1/routing/default", &json!({"provider_id": "ghost"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &state,
        post_json(
            "/v1/routing/default",
            &json!({"provider_id": "echo", "model_id": "echo-1"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["provider_id"], "echo");
    assert_eq!(json["model_id"], "echo-1");

    // Every model now lands on the default backend.
    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("bot/x", false, "routed")),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["content"][0]["text"], "routed");

    let health = body_json(send(&state, get("/health")).await).await;
    assert_eq!(health["routing"]["default_provider_id"], "echo");
}

#[tokio::test]
async fn test_oversized_body_uses_path_envelope() {
    let state = gateway("server:\n  request_body_limit_bytes: 64\n");
    let long = "x".repeat(256);

    let response = send(
        &state,
        post_json("/v1/messages", &anthropic_body("echo/echo-1", false, &long)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let json = body_json(response).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "request_too_large");
    assert_eq!(json["error"]["message"], "Request body too large (max 64 bytes)");

    let response = send(
        &state,
        post_json("/v1/chat/completions", &openai_body("echo/echo-1", false, &long)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["code"].is_null());
    assert_eq!(state.sessions.active_count(), 0);
}

#[tokio::test]
async fn test_openai_finish_chunk_reports_usage_without_stream_options() {
    let state = open_gateway();
    let body = json!({
        "model": "bot/x",
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}]
    });
    let response = send(&state, post_json("/v1/chat/completions", &body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    let chunks: Vec<Value> = sse_frames(&text)
        .into_iter()
        .filter(|(_, data)| data != "[DONE]")
        .map(|(_, data)| serde_json::from_str(&data).expect("chunk json"))
        .collect();

    let finish = chunks.last().expect("finish chunk");
    assert_eq!(finish["choices"][0]["finish_reason"], "tool_calls");
    assert_eq!(finish["usage"]["prompt_tokens"], 3);
    assert_eq!(finish["usage"]["completion_tokens"], 5);
    assert_eq!(finish["usage"]["total_tokens"], 8);
    assert!(!chunks
        .iter()
        .any(|c| c["choices"].as_array().is_some_and(Vec::is_empty)));
}
