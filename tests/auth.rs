use http::HeaderMap;
use llm_gateway::auth::{authenticate, build_allowed_key_set};
use llm_gateway::config::{AppConfig, AuthConfig};
use llm_gateway::error::GatewayError;

fn config_with_keys(keys: Vec<&str>) -> AppConfig {
    AppConfig {
        auth: AuthConfig {
            api_keys: keys.into_iter().map(ToString::to_string).collect(),
        },
        ..AppConfig::default()
    }
}

#[test]
fn test_auth_bearer_success() {
    let allowed = build_allowed_key_set(&config_with_keys(vec!["client-key"]));
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        "Bearer client-key".parse().expect("header"),
    );
    assert!(authenticate(&headers, &allowed).is_ok());
}

#[test]
fn test_auth_x_api_key_success_with_multiple_keys() {
    let allowed = build_allowed_key_set(&config_with_keys(vec!["a-key", "b-key"]));
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "b-key".parse().expect("header"));
    assert!(authenticate(&headers, &allowed).is_ok());
}

#[test]
fn test_auth_missing_key_is_error() {
    let allowed = build_allowed_key_set(&config_with_keys(vec!["client-key"]));
    let headers = HeaderMap::new();
    let err = authenticate(&headers, &allowed).expect_err("auth should fail");
    assert!(matches!(err, GatewayError::Auth(_)));
}

#[test]
fn test_auth_wrong_key_is_error() {
    let allowed = build_allowed_key_set(&config_with_keys(vec!["client-key"]));
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer other".parse().expect("header"));
    let err = authenticate(&headers, &allowed).expect_err("auth should fail");
    assert_eq!(err.to_string(), "Invalid API key");
}

#[test]
fn test_auth_open_when_no_keys_configured() {
    let allowed = build_allowed_key_set(&config_with_keys(Vec::new()));
    assert!(authenticate(&HeaderMap::new(), &allowed).is_ok());
}
