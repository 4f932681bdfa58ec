//! Session management: inspect and stop in-flight streams.

use serde_json::json;

use axum::response::Response;

use crate::api::common::ok_json_response;
use crate::error::GatewayError;
use crate::state::AppState;

fn stream_not_found(event_id: &str) -> GatewayError {
    GatewayError::NotFound(format!("Stream '{event_id}' not found"))
}

/// `GET /v1/streams`
pub(crate) fn list(state: &AppState) -> Result<Response, GatewayError> {
    let streams = state.sessions.list();
    ok_json_response(&json!({
        "object": "list",
        "active": streams.len(),
        "max_concurrent": state.sessions.max_concurrent(),
        "data": streams,
    }))
}

/// `GET /v1/streams/{eventId}`
pub(crate) fn get(state: &AppState, event_id: &str) -> Result<Response, GatewayError> {
    let stream = state
        .sessions
        .stream_state(event_id)
        .ok_or_else(|| stream_not_found(event_id))?;
    ok_json_response(&stream)
}

/// `POST /v1/streams/{eventId}/stop`: signal cancellation and return at once.
/// The session ends at its next suspension point.
pub(crate) fn stop(state: &AppState, event_id: &str) -> Result<Response, GatewayError> {
    if !state.sessions.stop(event_id) {
        return Err(stream_not_found(event_id));
    }
    tracing::info!(event_id, "stop requested");
    ok_json_response(&json!({ "eventId": event_id, "stopping": true }))
}

/// `POST /v1/streams/stop_all`: cancel every session and wait for each to
/// deliver its terminal event.
pub(crate) async fn stop_all(state: &AppState) -> Result<Response, GatewayError> {
    let stopped = state.sessions.stop_all().await;
    tracing::info!(stopped, "all streams stopped");
    ok_json_response(&json!({ "stopped": stopped }))
}
