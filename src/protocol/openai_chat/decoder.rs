use crate::error::GatewayError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRole, ContentPart, MessageContent, NormalizedRequest, ToolCall,
    ToolDefinition,
};
use crate::protocol::openai_chat::{
    OpenAiChatRequest, OpenAiContent, OpenAiContentPart, OpenAiMessage, OpenAiTool,
};

/// Normalize an `OpenAI` Chat Completions request into canonical messages and tools.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for malformed messages, unknown
/// roles or part types, and tool messages without a `tool_call_id`.
pub fn normalize_openai_chat_request(
    request: OpenAiChatRequest,
) -> Result<NormalizedRequest, GatewayError> {
    let OpenAiChatRequest {
        model,
        messages: wire_messages,
        tools,
        stream,
        stream_options: _,
        temperature,
        max_tokens,
        max_completion_tokens,
        extra: _,
    } = request;

    let mut messages = Vec::with_capacity(wire_messages.len() + 1);
    let mut system_blocks = Vec::new();
    for (index, raw) in wire_messages.into_iter().enumerate() {
        let msg: OpenAiMessage = serde_json::from_value(raw)
            .map_err(|e| GatewayError::InvalidRequest(format!("messages[{index}]: {e}")))?;
        if matches!(msg.role.as_str(), "system" | "developer") {
            let content = require_content(msg.content, index)?;
            system_blocks.extend(content.texts().map(str::to_string));
        } else {
            messages.push(decode_message(msg, index)?);
        }
    }

    // System and developer turns fold into one leading system message.
    let system_prompt = system_blocks.join("\n\n");
    if !system_prompt.trim().is_empty() {
        messages.insert(0, CanonicalMessage::text(CanonicalRole::System, system_prompt));
    }

    Ok(NormalizedRequest {
        model,
        stream: stream.unwrap_or(false),
        max_tokens: max_tokens.or(max_completion_tokens),
        temperature,
        messages,
        tools: decode_tools(tools),
    })
}

fn decode_message(msg: OpenAiMessage, index: usize) -> Result<CanonicalMessage, GatewayError> {
    let OpenAiMessage {
        role,
        content,
        name: _,
        tool_calls,
        tool_call_id,
    } = msg;

    match role.as_str() {
        "user" => Ok(CanonicalMessage::new(
            CanonicalRole::User,
            require_content(content, index)?,
        )),
        "assistant" => {
            let tool_calls = tool_calls
                .filter(|calls| !calls.is_empty())
                .map(|calls| {
                    calls
                        .into_iter()
                        .map(|call| ToolCall {
                            id: call.id,
                            name: call.function.name,
                            arguments: call.function.arguments,
                        })
                        .collect::<Vec<_>>()
                });
            let content = match content {
                Some(content) => decode_content(content),
                None if tool_calls.is_some() => MessageContent::Text(String::new()),
                None => return Err(missing_content(index)),
            };
            Ok(CanonicalMessage {
                role: CanonicalRole::Assistant,
                content,
                tool_call_id: None,
                tool_calls,
            })
        }
        "tool" => {
            let Some(tool_call_id) = tool_call_id else {
                return Err(GatewayError::InvalidRequest(format!(
                    "messages[{index}].tool_call_id: required for tool messages"
                )));
            };
            Ok(CanonicalMessage {
                role: CanonicalRole::Tool,
                content: content.map_or_else(|| MessageContent::Text(String::new()), decode_content),
                tool_call_id: Some(tool_call_id),
                tool_calls: None,
            })
        }
        other => Err(GatewayError::InvalidRequest(format!(
            "messages[{index}].role: unsupported role '{other}'"
        ))),
    }
}

fn require_content(
    content: Option<OpenAiContent>,
    index: usize,
) -> Result<MessageContent, GatewayError> {
    content.map(decode_content).ok_or_else(|| missing_content(index))
}

fn missing_content(index: usize) -> GatewayError {
    GatewayError::InvalidRequest(format!("messages[{index}].content: required"))
}

fn decode_content(content: OpenAiContent) -> MessageContent {
    match content {
        OpenAiContent::Text(text) => MessageContent::Text(text),
        OpenAiContent::Parts(parts) => MessageContent::from_parts(
            parts
                .into_iter()
                .map(|part| match part {
                    OpenAiContentPart::Text { text } => ContentPart::Text { text },
                    OpenAiContentPart::ImageUrl { image_url } => ContentPart::image(image_url.url),
                })
                .collect(),
        ),
    }
}

fn decode_tools(tools: Option<Vec<OpenAiTool>>) -> Vec<ToolDefinition> {
    tools
        .unwrap_or_default()
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool.function.name,
            description: tool.function.description.unwrap_or_default(),
            input_schema: tool
                .function
                .parameters
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        })
        .collect()
}
