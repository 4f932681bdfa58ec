use crate::error::GatewayError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicRequest, AnthropicSystem,
    AnthropicSystemBlock, AnthropicTool, AnthropicToolResultBlock, AnthropicToolResultContent,
};
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRole, ContentPart, MessageContent, NormalizedRequest, ToolCall,
    ToolDefinition,
};

/// Normalize an Anthropic Messages API request into canonical messages and tools.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for unknown roles, unknown or
/// misplaced content blocks, and malformed image sources.
pub fn normalize_anthropic_request(
    request: AnthropicRequest,
) -> Result<NormalizedRequest, GatewayError> {
    let AnthropicRequest {
        model,
        max_tokens,
        system,
        messages: wire_messages,
        tools,
        stream,
        temperature,
        extra: _,
    } = request;

    let mut messages = Vec::with_capacity(wire_messages.len() + 1);
    if let Some(system_prompt) = decode_system_prompt(system) {
        messages.push(CanonicalMessage::text(CanonicalRole::System, system_prompt));
    }

    for (msg_index, msg) in wire_messages.into_iter().enumerate() {
        let blocks = decode_blocks(msg.content, msg_index)?;
        match msg.role.as_str() {
            "user" => push_user_turn(&mut messages, blocks, msg_index)?,
            "assistant" => messages.push(decode_assistant_turn(blocks, msg_index)?),
            other => {
                return Err(GatewayError::InvalidRequest(format!(
                    "messages[{msg_index}].role: unsupported role '{other}'"
                )))
            }
        }
    }

    Ok(NormalizedRequest {
        model,
        stream: stream.unwrap_or(false),
        max_tokens,
        temperature,
        messages,
        tools: decode_tools(tools),
    })
}

/// Join system text blocks with a blank line; whitespace-only prompts are dropped.
fn decode_system_prompt(system: Option<AnthropicSystem>) -> Option<String> {
    let text = match system? {
        AnthropicSystem::Text(text) => text,
        AnthropicSystem::Blocks(blocks) => blocks
            .into_iter()
            .map(|AnthropicSystemBlock::Text { text }| text)
            .collect::<Vec<_>>()
            .join("\n\n"),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn decode_blocks(
    content: serde_json::Value,
    msg_index: usize,
) -> Result<Vec<AnthropicContentBlock>, GatewayError> {
    match content {
        serde_json::Value::String(text) => Ok(vec![AnthropicContentBlock::Text { text }]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(block_index, item)| {
                serde_json::from_value(item).map_err(|e| {
                    GatewayError::InvalidRequest(format!(
                        "messages[{msg_index}].content[{block_index}]: {e}"
                    ))
                })
            })
            .collect(),
        _ => Err(GatewayError::InvalidRequest(format!(
            "messages[{msg_index}].content: expected a string or an array of content blocks"
        ))),
    }
}

/// A user turn becomes one `tool` message per `tool_result` block, followed by
/// the user message holding the remaining text and image parts in order.
fn push_user_turn(
    out: &mut Vec<CanonicalMessage>,
    blocks: Vec<AnthropicContentBlock>,
    msg_index: usize,
) -> Result<(), GatewayError> {
    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            AnthropicContentBlock::Image { source } => {
                parts.push(ContentPart::image(image_source_url(source)));
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error: _,
            } => out.push(CanonicalMessage {
                role: CanonicalRole::Tool,
                content: decode_tool_result_content(content),
                tool_call_id: Some(tool_use_id),
                tool_calls: None,
            }),
            AnthropicContentBlock::ToolUse { .. } => {
                return Err(GatewayError::InvalidRequest(format!(
                    "messages[{msg_index}]: tool_use blocks are only valid in assistant messages"
                )))
            }
            AnthropicContentBlock::Thinking { .. } | AnthropicContentBlock::RedactedThinking { .. } => {
                return Err(GatewayError::InvalidRequest(format!(
                    "messages[{msg_index}]: thinking blocks are only valid in assistant messages"
                )))
            }
        }
    }

    if !parts.is_empty() {
        out.push(CanonicalMessage::new(
            CanonicalRole::User,
            MessageContent::from_parts(parts),
        ));
    }
    Ok(())
}

fn decode_assistant_turn(
    blocks: Vec<AnthropicContentBlock>,
    msg_index: usize,
) -> Result<CanonicalMessage, GatewayError> {
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            AnthropicContentBlock::Image { source } => {
                parts.push(ContentPart::image(image_source_url(source)));
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let input = if input.is_null() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    input
                };
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                });
            }
            // Prior reasoning is not replayed to backends.
            AnthropicContentBlock::Thinking { .. } | AnthropicContentBlock::RedactedThinking { .. } => {}
            AnthropicContentBlock::ToolResult { .. } => {
                return Err(GatewayError::InvalidRequest(format!(
                    "messages[{msg_index}]: tool_result blocks are only valid in user messages"
                )))
            }
        }
    }

    let content = if parts.is_empty() {
        MessageContent::Text(String::new())
    } else {
        MessageContent::from_parts(parts)
    };
    Ok(CanonicalMessage {
        role: CanonicalRole::Assistant,
        content,
        tool_call_id: None,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
    })
}

fn decode_tool_result_content(content: Option<AnthropicToolResultContent>) -> MessageContent {
    match content {
        None => MessageContent::Text(String::new()),
        Some(AnthropicToolResultContent::Text(text)) => MessageContent::Text(text),
        Some(AnthropicToolResultContent::Blocks(blocks)) => {
            let parts = blocks
                .into_iter()
                .map(|block| match block {
                    AnthropicToolResultBlock::Text { text } => ContentPart::Text { text },
                    AnthropicToolResultBlock::Image { source } => {
                        ContentPart::image(image_source_url(source))
                    }
                })
                .collect::<Vec<_>>();
            if parts.is_empty() {
                MessageContent::Text(String::new())
            } else {
                MessageContent::from_parts(parts)
            }
        }
    }
}

fn image_source_url(source: AnthropicImageSource) -> String {
    match source {
        AnthropicImageSource::Base64 { media_type, data } => {
            format!("data:{media_type};base64,{data}")
        }
        AnthropicImageSource::Url { url } => url,
    }
}

fn decode_tools(tools: Option<Vec<AnthropicTool>>) -> Vec<ToolDefinition> {
    tools
        .unwrap_or_default()
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        })
        .collect()
}
