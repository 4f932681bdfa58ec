use crate::config::AppConfig;
use crate::error::GatewayError;
use http::header::{HeaderName, AUTHORIZATION};
use rustc_hash::FxHashSet;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Compact key index used on every request.
pub enum AllowedClientKeys {
    /// No keys configured: authentication is disabled.
    Open,
    Single { raw: Box<str>, bearer: Box<str> },
    Multiple(FxHashSet<String>),
}

/// Extract the client key from `Authorization: Bearer <key>`, falling back to
/// `X-Api-Key: <key>`.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when neither header carries a key.
pub fn extract_api_key(headers: &http::HeaderMap) -> Result<&str, GatewayError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .or_else(|| headers.get(X_API_KEY).and_then(|v| v.to_str().ok()))
        .ok_or_else(|| GatewayError::Auth("Missing API key".to_string()))
}

/// Authenticate a request against the pre-indexed `allowed_keys`.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when the API key is missing or invalid.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), GatewayError> {
    match allowed_keys {
        AllowedClientKeys::Open => Ok(()),
        AllowedClientKeys::Single { raw, bearer } => {
            authenticate_single_key(headers, raw.as_ref(), bearer.as_ref())
        }
        AllowedClientKeys::Multiple(allowed_set) => {
            let client_key = extract_api_key(headers)?;
            if allowed_set.contains(client_key) {
                Ok(())
            } else {
                Err(GatewayError::Auth("Invalid API key".to_string()))
            }
        }
    }
}

/// Byte comparison against the prebuilt `Bearer <key>` form avoids UTF-8
/// validation for the common single-key deployment.
fn authenticate_single_key(
    headers: &http::HeaderMap,
    raw_key: &str,
    bearer_key: &str,
) -> Result<(), GatewayError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        if value.as_bytes() == bearer_key.as_bytes() {
            return Ok(());
        }
        if headers.get(X_API_KEY).is_none() {
            return Err(GatewayError::Auth("Invalid API key".to_string()));
        }
    }
    match headers.get(X_API_KEY) {
        Some(value) if value.as_bytes() == raw_key.as_bytes() => Ok(()),
        Some(_) => Err(GatewayError::Auth("Invalid API key".to_string())),
        None => Err(GatewayError::Auth("Missing API key".to_string())),
    }
}

/// Build the key index for the configured client keys.
#[must_use]
pub fn build_allowed_key_set(config: &AppConfig) -> AllowedClientKeys {
    let mut allowed_set: FxHashSet<String> = config.auth.api_keys.iter().cloned().collect();

    match allowed_set.len() {
        0 => AllowedClientKeys::Open,
        1 => match allowed_set.drain().next() {
            Some(single_key) => AllowedClientKeys::Single {
                bearer: format!("Bearer {single_key}").into_boxed_str(),
                raw: single_key.into_boxed_str(),
            },
            None => AllowedClientKeys::Open,
        },
        _ => AllowedClientKeys::Multiple(allowed_set),
    }
}
