use crate::protocol::anthropic::{AnthropicResponse, AnthropicResponseBlock, AnthropicUsage};
use crate::protocol::canonical::CollectedResponse;
use crate::protocol::stop_reason::effective_anthropic_stop_reason;

/// Encode a collected generation as an Anthropic `message` object.
#[must_use]
pub fn encode_anthropic_response(
    collected: &CollectedResponse,
    message_id: &str,
    model: &str,
) -> AnthropicResponse {
    let mut content = Vec::with_capacity(1 + collected.tool_calls.len());
    if !collected.text.is_empty() || collected.tool_calls.is_empty() {
        content.push(AnthropicResponseBlock::Text {
            text: collected.text.clone(),
        });
    }
    for call in &collected.tool_calls {
        let input = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}))
        };
        content.push(AnthropicResponseBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input,
        });
    }

    AnthropicResponse {
        id: message_id.to_string(),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason: effective_anthropic_stop_reason(
            collected.stop_reason,
            !collected.tool_calls.is_empty(),
        )
        .map(str::to_string),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: collected.usage.input_tokens,
            output_tokens: collected.usage.output_tokens,
        },
    }
}
