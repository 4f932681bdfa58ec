use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{anthropic, backend, health, models, openai_chat, permissions, streams};
use crate::error::{into_axum_response, GatewayError};
use crate::protocol::canonical::WireFormat;
use crate::state::AppState;

const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const CORS_ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Api-Key, X-Event-Id, anthropic-version";

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Health,
    Models,
    AnthropicMessages,
    AnthropicCountTokens,
    OpenAiChat,
    StreamList,
    StreamGet(&'a str),
    StreamStop(&'a str),
    StreamStopAll,
    PermissionList,
    PermissionResolve(&'a str),
    RoutingDefault,
    MethodNotAllowed,
    NotFound,
}

impl RouteMatch<'_> {
    fn has_body(&self) -> bool {
        matches!(
            self,
            RouteMatch::AnthropicMessages
                | RouteMatch::AnthropicCountTokens
                | RouteMatch::OpenAiChat
                | RouteMatch::PermissionResolve(_)
                | RouteMatch::RoutingDefault
        )
    }
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// `OPTIONS` preflights short-circuit with 204. Every other request is
/// authenticated before its handler runs, and every response carries the
/// CORS headers.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();

    if parts.method == Method::OPTIONS {
        return Ok(with_cors(StatusCode::NO_CONTENT.into_response()));
    }

    let Some(path) = strip_base_path(parts.uri.path(), base_path.as_ref()) else {
        return Ok(with_cors(StatusCode::NOT_FOUND.into_response()));
    };
    let wire = wire_for_path(path);
    let route = match_route(&parts.method, path);

    let response = match route {
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
        route => {
            if let Err(err) = state.authenticate(&parts.headers) {
                tracing::debug!(path, "request rejected: {err}");
                return Ok(with_cors(into_axum_response(&err, wire)));
            }
            let body_bytes = if route.has_body() {
                match read_request_body(body, state.config.server.request_body_limit_bytes).await
                {
                    Ok(bytes) => bytes,
                    Err(err) => return Ok(with_cors(into_axum_response(&err, wire))),
                }
            } else {
                bytes::Bytes::new()
            };
            handle_route(state, route, parts.headers, parts.uri.query(), body_bytes).await
        }
    };

    Ok(with_cors(response))
}

async fn handle_route(
    state: Arc<AppState>,
    route: RouteMatch<'_>,
    headers: http::HeaderMap,
    query: Option<&str>,
    body: bytes::Bytes,
) -> Response {
    let result = match route {
        RouteMatch::Health => return health::health_handler(State(state)).into_response(),
        RouteMatch::Models => return models::handler(State(state)).await,
        RouteMatch::AnthropicMessages => {
            return anthropic::handler(State(state), headers, body).await
        }
        RouteMatch::AnthropicCountTokens => return anthropic::count_tokens_handler(&body),
        RouteMatch::OpenAiChat => return openai_chat::handler(State(state), headers, body).await,
        RouteMatch::StreamList => streams::list(&state),
        RouteMatch::StreamGet(event_id) => streams::get(&state, event_id),
        RouteMatch::StreamStop(event_id) => streams::stop(&state, event_id),
        RouteMatch::StreamStopAll => streams::stop_all(&state).await,
        RouteMatch::PermissionList => permissions::list(&state, query),
        RouteMatch::PermissionResolve(request_id) => {
            permissions::resolve(&state, request_id, &body)
        }
        RouteMatch::RoutingDefault => backend::set_default(&state, &body),
        RouteMatch::MethodNotAllowed => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => return StatusCode::NOT_FOUND.into_response(),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

/// Error envelopes follow the wire format the path belongs to.
fn wire_for_path(path: &str) -> WireFormat {
    if path.starts_with("/v1/messages") {
        WireFormat::Anthropic
    } else {
        WireFormat::OpenAiChat
    }
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Event-Id"),
    );
    response
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, GatewayError> {
    body::to_bytes(body, limit)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge { limit })
}

fn method_route<'a>(method: &Method, expected: Method, route: RouteMatch<'a>) -> RouteMatch<'a> {
    if *method == expected {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}

/// A single non-empty path segment.
fn path_segment(segment: &str) -> Option<&str> {
    (!segment.is_empty() && !segment.contains('/')).then_some(segment)
}

fn match_route<'a>(method: &Method, path: &'a str) -> RouteMatch<'a> {
    match path {
        "/" | "/health" => method_route(method, Method::GET, RouteMatch::Health),
        "/v1/models" => method_route(method, Method::GET, RouteMatch::Models),
        "/v1/messages" => method_route(method, Method::POST, RouteMatch::AnthropicMessages),
        "/v1/messages/count_tokens" => {
            method_route(method, Method::POST, RouteMatch::AnthropicCountTokens)
        }
        "/v1/chat/completions" => method_route(method, Method::POST, RouteMatch::OpenAiChat),
        "/v1/streams" => method_route(method, Method::GET, RouteMatch::StreamList),
        "/v1/streams/stop_all" => method_route(method, Method::POST, RouteMatch::StreamStopAll),
        "/v1/permissions" => method_route(method, Method::GET, RouteMatch::PermissionList),
        "/v1/routing/default" => method_route(method, Method::POST, RouteMatch::RoutingDefault),
        _ => {
            if let Some(rest) = path.strip_prefix("/v1/streams/") {
                if let Some(event_id) = rest.strip_suffix("/stop").and_then(path_segment) {
                    return method_route(method, Method::POST, RouteMatch::StreamStop(event_id));
                }
                if let Some(event_id) = path_segment(rest) {
                    return method_route(method, Method::GET, RouteMatch::StreamGet(event_id));
                }
            } else if let Some(request_id) = path
                .strip_prefix("/v1/permissions/")
                .and_then(path_segment)
            {
                return method_route(method, Method::POST, RouteMatch::PermissionResolve(request_id));
            }
            RouteMatch::NotFound
        }
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
