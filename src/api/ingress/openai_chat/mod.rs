use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use crate::api::common::{run_ingress, IngressSpec, PreparedRequest};
use crate::error::{into_axum_response, GatewayError};
use crate::protocol::canonical::{CollectedResponse, WireFormat};
use crate::protocol::openai_chat::decoder::normalize_openai_chat_request;
use crate::protocol::openai_chat::response_encoder::encode_openai_chat_response;
use crate::protocol::openai_chat::stream::OpenAiStreamEncoder;
use crate::protocol::openai_chat::{OpenAiChatRequest, OpenAiChatResponse};
use crate::state::AppState;
use crate::util::unix_now_secs;

const WIRE: WireFormat = WireFormat::OpenAiChat;

pub(crate) struct OpenAiChatSpec;

impl IngressSpec for OpenAiChatSpec {
    type WireRequest = OpenAiChatRequest;
    type Encoder = OpenAiStreamEncoder;
    type Response = OpenAiChatResponse;

    const WIRE: WireFormat = WIRE;
    const LABEL: &'static str = "OpenAI Chat request";
    const REQUIRES_MAX_TOKENS: bool = false;

    fn prepare(request: OpenAiChatRequest) -> Result<PreparedRequest, GatewayError> {
        let include_usage = request
            .stream_options
            .as_ref()
            .and_then(|options| options.include_usage)
            .unwrap_or(false);
        Ok(PreparedRequest {
            request: normalize_openai_chat_request(request)?,
            include_usage,
        })
    }

    fn stream_encoder(state: &AppState, prepared: &PreparedRequest) -> OpenAiStreamEncoder {
        OpenAiStreamEncoder::new(
            state.response_id("chatcmpl-"),
            prepared.request.model.clone(),
            unix_now_secs(),
        )
        .with_include_usage(prepared.include_usage)
    }

    fn encode_collected(
        state: &AppState,
        collected: &CollectedResponse,
        model: &str,
    ) -> OpenAiChatResponse {
        encode_openai_chat_response(
            collected,
            &state.response_id("chatcmpl-"),
            model,
            unix_now_secs(),
        )
    }
}

/// `POST /v1/chat/completions`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match run_ingress::<OpenAiChatSpec>(state, headers, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, WIRE),
    }
}
