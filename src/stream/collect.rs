use futures_util::{Stream, StreamExt};

use crate::error::GatewayError;
use crate::protocol::canonical::{
    AgentEvent, CollectedResponse, ResponsePayload, ToolCall, ToolCallPhase,
};
use crate::protocol::stop_reason::CanonicalStopReason;

/// Fold a supervised event stream into one response for non-streaming replies.
///
/// # Errors
///
/// A provider `error` event becomes [`GatewayError::Provider`].
pub async fn collect_response<S>(events: S) -> Result<CollectedResponse, GatewayError>
where
    S: Stream<Item = AgentEvent>,
{
    futures_util::pin_mut!(events);
    let mut collected = CollectedResponse::default();
    while let Some(event) = events.next().await {
        match event {
            AgentEvent::Response(payload) => apply_payload(&mut collected, payload),
            AgentEvent::End { user_stop } => {
                if user_stop {
                    tracing::debug!("non-streaming session stopped by user");
                }
                break;
            }
            AgentEvent::Error { error } => return Err(GatewayError::Provider(error)),
        }
    }
    Ok(collected)
}

fn apply_payload(collected: &mut CollectedResponse, payload: ResponsePayload) {
    if let Some(reasoning) = payload.reasoning_content {
        collected.reasoning.push_str(&reasoning);
    }
    if let Some(text) = payload.content {
        collected.text.push_str(&text);
    }
    if let (Some(phase), Some(id)) = (payload.tool_call, payload.tool_call_id) {
        let position = collected.tool_calls.iter().position(|call| call.id == id);
        match (phase, position) {
            (ToolCallPhase::Start, None) => collected.tool_calls.push(ToolCall {
                id,
                name: payload.tool_call_name.unwrap_or_default(),
                arguments: payload.tool_call_params.unwrap_or_default(),
            }),
            (_, Some(index)) => {
                if let Some(fragment) = payload.tool_call_params {
                    collected.tool_calls[index].arguments.push_str(&fragment);
                }
            }
            (ToolCallPhase::Update, None) => {}
        }
    }
    if let Some(usage) = payload.total_usage {
        collected.usage = usage;
    }
    if let Some(reason) = payload.stop_reason {
        collected.stop_reason = Some(CanonicalStopReason::parse(&reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_collects_text_tools_usage() {
        let events = stream::iter(vec![
            AgentEvent::text("Hel"),
            AgentEvent::text("lo"),
            AgentEvent::tool_start("t1", "calc"),
            AgentEvent::tool_args("t1", "{\"a\":"),
            AgentEvent::tool_args("t1", "1}"),
            AgentEvent::tool_args("ghost", "x"),
            AgentEvent::usage(4, 2),
            AgentEvent::stop_reason("tool_use"),
            AgentEvent::end(),
            AgentEvent::text("after end"),
        ]);
        let collected = collect_response(events).await.unwrap();
        assert_eq!(collected.text, "Hello");
        assert_eq!(collected.tool_calls.len(), 1);
        assert_eq!(collected.tool_calls[0].arguments, "{\"a\":1}");
        assert_eq!(collected.usage.output_tokens, 2);
        assert_eq!(collected.stop_reason, Some(CanonicalStopReason::ToolUse));
    }

    #[tokio::test]
    async fn test_error_becomes_provider_error() {
        let events = stream::iter(vec![AgentEvent::text("x"), AgentEvent::error("down")]);
        let err = collect_response(events).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider(ref m) if m == "down"));
    }
}
