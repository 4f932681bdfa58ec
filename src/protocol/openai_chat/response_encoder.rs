use crate::protocol::canonical::CollectedResponse;
use crate::protocol::stop_reason::effective_openai_finish_reason;

use super::{
    OpenAiChatResponse, OpenAiChoice, OpenAiResponseMessage, OpenAiToolCall,
    OpenAiToolCallFunction, OpenAiUsage,
};

/// Encode a collected generation as an `OpenAI` `chat.completion` object.
#[must_use]
pub fn encode_openai_chat_response(
    collected: &CollectedResponse,
    completion_id: &str,
    model: &str,
    created: u64,
) -> OpenAiChatResponse {
    let tool_calls = if collected.tool_calls.is_empty() {
        None
    } else {
        Some(
            collected
                .tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    type_: "function".to_string(),
                    function: OpenAiToolCallFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    let content = if collected.text.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(collected.text.clone())
    };
    let reasoning_content = if collected.reasoning.is_empty() {
        None
    } else {
        Some(collected.reasoning.clone())
    };

    OpenAiChatResponse {
        id: completion_id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content,
                reasoning_content,
                tool_calls,
            },
            finish_reason: effective_openai_finish_reason(
                collected.stop_reason,
                !collected.tool_calls.is_empty(),
            )
            .map(str::to_string),
        }],
        usage: OpenAiUsage {
            prompt_tokens: collected.usage.input_tokens,
            completion_tokens: collected.usage.output_tokens,
            total_tokens: collected
                .usage
                .input_tokens
                .saturating_add(collected.usage.output_tokens),
        },
    }
}
