use axum::response::Response;
use serde::Deserialize;

use crate::api::common::{ok_json_response, parse_json_body};
use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct DefaultBackendRequest {
    #[serde(default)]
    provider_id: Option<String>,
    #[serde(default)]
    model_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `POST /v1/routing/default` with `{provider_id, model_id}`. Both null
/// clears the defaults. Active sessions are cancelled either way.
pub(crate) fn set_default(state: &AppState, body: &[u8]) -> Result<Response, GatewayError> {
    let request: DefaultBackendRequest = parse_json_body(body, "routing default request")?;
    let defaults = state.set_default_backend(
        non_blank(request.provider_id),
        non_blank(request.model_id),
    )?;
    ok_json_response(&defaults)
}
