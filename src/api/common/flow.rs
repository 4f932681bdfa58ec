use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GatewayError;
use crate::observability::log_request_complete;
use crate::protocol::canonical::{CollectedResponse, NormalizedRequest, WireFormat};
use crate::protocol::StreamEncoder;
use crate::provider::{ProviderRequest, SessionContext};
use crate::state::AppState;
use crate::stream::{collect_response, supervise};

use super::{ok_json_response, parse_checked_request, requested_event_id, sse_response};
use super::with_event_id_header;

/// A normalized request plus the per-wire options its encoder needs.
pub(crate) struct PreparedRequest {
    pub(crate) request: NormalizedRequest,
    pub(crate) include_usage: bool,
}

/// What differs between the two chat ingresses; everything else is shared.
pub(crate) trait IngressSpec {
    type WireRequest: DeserializeOwned;
    type Encoder: StreamEncoder + 'static;
    type Response: Serialize;

    const WIRE: WireFormat;
    const LABEL: &'static str;
    const REQUIRES_MAX_TOKENS: bool;

    fn prepare(request: Self::WireRequest) -> Result<PreparedRequest, GatewayError>;

    fn stream_encoder(state: &AppState, prepared: &PreparedRequest) -> Self::Encoder;

    fn encode_collected(
        state: &AppState,
        collected: &CollectedResponse,
        model: &str,
    ) -> Self::Response;
}

/// Validate, normalize, route, admit and run one chat request.
///
/// Every failure before the session is admitted is returned as an error, so
/// the caller can still answer with a status code. Once streaming starts,
/// failures travel in-band.
pub(crate) async fn run_ingress<S: IngressSpec>(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, GatewayError> {
    let wire_request: S::WireRequest =
        parse_checked_request(&body, S::LABEL, S::REQUIRES_MAX_TOKENS)?;
    let prepared = S::prepare(wire_request)?;
    let client_model = prepared.request.model.clone();

    let route = state.router.resolve(&client_model)?;
    let provider = state.providers.get(&route.provider_id)?;
    let handle = state.sessions.admit(
        requested_event_id(&headers),
        &route.provider_id,
        &route.model_id,
    )?;
    let event_id = handle.event_id().to_string();

    tracing::debug!(
        event_id = %event_id,
        wire = ?S::WIRE,
        model = %client_model,
        stream = prepared.request.stream,
        "request routed"
    );

    let ctx = SessionContext {
        event_id: event_id.clone(),
        cancel: handle.cancel_token(),
        permissions: handle.permission_gate(),
    };
    let provider_request = ProviderRequest {
        event_id: event_id.clone(),
        provider_id: route.provider_id,
        model_id: route.model_id,
        messages: prepared.request.messages.clone(),
        tools: prepared.request.tools.clone(),
        max_tokens: prepared.request.max_tokens,
        temperature: prepared.request.temperature,
    };
    let events = supervise(handle, provider.stream(provider_request, ctx));

    if prepared.request.stream {
        let encoder = S::stream_encoder(&state, &prepared);
        return Ok(sse_response(encoder, events, &event_id));
    }

    let started = Instant::now();
    let collected = collect_response(events).await?;
    log_request_complete(&event_id, &client_model, &collected.usage, started);
    let body = S::encode_collected(&state, &collected, &client_model);
    Ok(with_event_id_header(ok_json_response(&body)?, &event_id))
}
