use crate::protocol::canonical::WireFormat;
use crate::protocol::error_shapes::{anthropic_error_payload, openai_error_payload};

/// Gateway-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Permission request '{0}' not found")]
    PermissionNotFound(String),
    #[error("Request body too large (max {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("Too many concurrent streams (limit {limit})")]
    Capacity { limit: usize },
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    PayloadTooLarge,
    Authentication,
    NotFound,
    RateLimit,
    ServerError,
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::PayloadTooLarge { .. } => ErrorCategory::PayloadTooLarge,
            GatewayError::Auth(_) => ErrorCategory::Authentication,
            GatewayError::NotFound(_) | GatewayError::PermissionNotFound(_) => {
                ErrorCategory::NotFound
            }
            GatewayError::Capacity { .. } => ErrorCategory::RateLimit,
            GatewayError::Config(_) | GatewayError::Provider(_) | GatewayError::Internal(_) => {
                ErrorCategory::ServerError
            }
        }
    }

    /// Message shown to clients. Internal failures are not echoed verbatim.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) | GatewayError::Config(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[must_use]
pub fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::PayloadTooLarge => http::StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format an error for a given wire format, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &GatewayError, wire: WireFormat) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let message = err.client_message();

    let body = match wire {
        WireFormat::Anthropic => anthropic_error_payload(cat, &message),
        WireFormat::OpenAiChat => openai_error_payload(cat, &message),
    };

    (status, body)
}

/// Convert a `GatewayError` into an axum response for a specific wire format.
#[must_use]
pub fn into_axum_response(err: &GatewayError, wire: WireFormat) -> axum::response::Response {
    use axum::response::IntoResponse;
    if matches!(err.category(), ErrorCategory::ServerError) {
        tracing::error!("request failed: {err}");
    }
    let (status, body) = format_error(err, wire);
    (status, axum::Json(body)).into_response()
}

/// Management endpoints answer in the `OpenAI` envelope.
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self, WireFormat::OpenAiChat)
    }
}
