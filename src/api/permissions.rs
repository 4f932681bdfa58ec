use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{ok_json_response, parse_json_body};
use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PermissionDecision {
    granted: bool,
    #[serde(default)]
    remember: bool,
}

/// `session_id` from a raw query string. Session ids are plain tokens, so
/// no percent-decoding is attempted.
fn session_filter(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "session_id")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `GET /v1/permissions[?session_id=...]`
pub(crate) fn list(state: &AppState, query: Option<&str>) -> Result<Response, GatewayError> {
    let pending = state.permissions.pending(session_filter(query));
    ok_json_response(&json!({ "object": "list", "data": pending }))
}

/// `POST /v1/permissions/{requestId}` with `{granted, remember?}`.
pub(crate) fn resolve(
    state: &AppState,
    request_id: &str,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let decision: PermissionDecision = parse_json_body(body, "permission decision")?;
    let permission = state
        .permissions
        .resolve(request_id, decision.granted, decision.remember)?;
    ok_json_response(&json!({
        "request_id": permission.request_id,
        "session_id": permission.session_id,
        "tool_name": permission.tool_name,
        "granted": decision.granted,
        "remembered": decision.remember && permission.rememberable,
    }))
}
