use axum::response::Response;
use serde::Serialize;

use crate::error::GatewayError;

/// Serialize `value` into a `200 application/json` response.
///
/// # Errors
///
/// Serialization failure is an internal error.
pub(crate) fn ok_json_response<T: Serialize>(value: &T) -> Result<Response, GatewayError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| GatewayError::Internal(format!("Failed to serialize response: {e}")))?;
    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// Echo the session id back to the client.
pub(crate) fn with_event_id_header(mut response: Response, event_id: &str) -> Response {
    if let Ok(value) = http::HeaderValue::from_str(event_id) {
        response.headers_mut().insert("x-event-id", value);
    }
    response
}
