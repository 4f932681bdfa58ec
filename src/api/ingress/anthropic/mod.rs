use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::json;

use crate::api::common::{
    ok_json_response, parse_checked_request, run_ingress, IngressSpec, PreparedRequest,
};
use crate::error::{into_axum_response, GatewayError};
use crate::observability::token_counter::estimate_input_tokens;
use crate::protocol::anthropic::decoder::normalize_anthropic_request;
use crate::protocol::anthropic::response_encoder::encode_anthropic_response;
use crate::protocol::anthropic::stream::AnthropicStreamEncoder;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::protocol::canonical::{CollectedResponse, WireFormat};
use crate::state::AppState;

const WIRE: WireFormat = WireFormat::Anthropic;

pub(crate) struct AnthropicSpec;

impl IngressSpec for AnthropicSpec {
    type WireRequest = AnthropicRequest;
    type Encoder = AnthropicStreamEncoder;
    type Response = AnthropicResponse;

    const WIRE: WireFormat = WIRE;
    const LABEL: &'static str = "Anthropic request";
    const REQUIRES_MAX_TOKENS: bool = true;

    fn prepare(request: AnthropicRequest) -> Result<PreparedRequest, GatewayError> {
        Ok(PreparedRequest {
            request: normalize_anthropic_request(request)?,
            include_usage: false,
        })
    }

    fn stream_encoder(state: &AppState, prepared: &PreparedRequest) -> AnthropicStreamEncoder {
        AnthropicStreamEncoder::new(state.response_id("msg_"), prepared.request.model.clone())
    }

    fn encode_collected(
        state: &AppState,
        collected: &CollectedResponse,
        model: &str,
    ) -> AnthropicResponse {
        encode_anthropic_response(collected, &state.response_id("msg_"), model)
    }
}

/// `POST /v1/messages`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match run_ingress::<AnthropicSpec>(state, headers, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, WIRE),
    }
}

/// `POST /v1/messages/count_tokens`: estimate without admitting a session.
pub fn count_tokens_handler(body: &[u8]) -> Response {
    match count_tokens_inner(body) {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, WIRE),
    }
}

fn count_tokens_inner(body: &[u8]) -> Result<Response, GatewayError> {
    let request: AnthropicRequest = parse_checked_request(body, "count_tokens request", false)?;
    let normalized = normalize_anthropic_request(request)?;
    let input_tokens = estimate_input_tokens(&normalized.messages);
    tracing::debug!(model = %normalized.model, input_tokens, "token count estimated");
    ok_json_response(&json!({ "input_tokens": input_tokens }))
}
