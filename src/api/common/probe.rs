use http::header::HeaderName;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GatewayError;

const X_EVENT_ID: HeaderName = HeaderName::from_static("x-event-id");

/// Caller-supplied session id from `X-Event-Id`, if present and non-blank.
pub(crate) fn requested_event_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn missing(field: &str) -> GatewayError {
    GatewayError::InvalidRequest(format!("{field}: field is required"))
}

/// Check the fields every chat request needs before any typed decoding, so a
/// missing field is reported by name instead of as a serde message.
fn check_required_fields(root: &Value, require_max_tokens: bool) -> Result<(), GatewayError> {
    let Some(object) = root.as_object() else {
        return Err(GatewayError::InvalidRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    match object.get("model") {
        None | Some(Value::Null) => return Err(missing("model")),
        Some(Value::String(model)) if model.trim().is_empty() => {
            return Err(GatewayError::InvalidRequest(
                "model: must be a non-empty string".to_string(),
            ))
        }
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "model: must be a string".to_string(),
            ))
        }
    }

    match object.get("messages") {
        None | Some(Value::Null) => return Err(missing("messages")),
        Some(Value::Array(messages)) if messages.is_empty() => {
            return Err(GatewayError::InvalidRequest(
                "messages: must be a non-empty array".to_string(),
            ))
        }
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "messages: must be an array".to_string(),
            ))
        }
    }

    if require_max_tokens {
        match object.get("max_tokens") {
            None | Some(Value::Null) => return Err(missing("max_tokens")),
            Some(value) if value.as_u64().is_none() => {
                return Err(GatewayError::InvalidRequest(
                    "max_tokens: must be a non-negative integer".to_string(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Parse any JSON body into `T`.
///
/// # Errors
///
/// Malformed JSON or a shape mismatch is a client error.
pub(crate) fn parse_json_body<T: DeserializeOwned>(
    body: &[u8],
    label: &str,
) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid JSON in {label}: {e}")))
}

/// Parse a chat request: syntax, then required fields, then the typed shape.
///
/// # Errors
///
/// Every failure is [`GatewayError::InvalidRequest`].
pub(crate) fn parse_checked_request<T: DeserializeOwned>(
    body: &[u8],
    label: &str,
    require_max_tokens: bool,
) -> Result<T, GatewayError> {
    let root: Value = parse_json_body(body, label)?;
    check_required_fields(&root, require_max_tokens)?;
    serde_json::from_value(root)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid {label}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(body: &str, require_max_tokens: bool) -> Result<Value, GatewayError> {
        parse_checked_request(body.as_bytes(), "test request", require_max_tokens)
    }

    fn message_of(result: Result<Value, GatewayError>) -> String {
        match result {
            Err(GatewayError::InvalidRequest(msg)) => msg,
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_are_named() {
        assert_eq!(
            message_of(check(r#"{"messages":[{}]}"#, false)),
            "model: field is required"
        );
        assert_eq!(
            message_of(check(r#"{"model":"m"}"#, false)),
            "messages: field is required"
        );
        assert_eq!(
            message_of(check(r#"{"model":"m","messages":[{}]}"#, true)),
            "max_tokens: field is required"
        );
    }

    #[test]
    fn test_shape_checks() {
        assert!(message_of(check(r#"{"model":"m","messages":[]}"#, false)).contains("non-empty"));
        assert!(message_of(check(r#"{"model":" ","messages":[{}]}"#, false)).contains("model"));
        assert!(message_of(check(r#"{"model":"m","messages":[{}],"max_tokens":-1}"#, true))
            .contains("max_tokens"));
        assert!(message_of(check("[1]", false)).contains("JSON object"));
        assert!(message_of(check("{", false)).starts_with("Invalid JSON"));
    }

    #[test]
    fn test_valid_request_passes() {
        let value = check(r#"{"model":"m","messages":[{}],"max_tokens":5}"#, true).unwrap();
        assert_eq!(value["max_tokens"], 5);
    }

    #[test]
    fn test_requested_event_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(requested_event_id(&headers), None);
        headers.insert("x-event-id", " evt_1 ".parse().unwrap());
        assert_eq!(requested_event_id(&headers).as_deref(), Some("evt_1"));
        headers.insert("x-event-id", "  ".parse().unwrap());
        assert_eq!(requested_event_id(&headers), None);
    }
}
