use serde::{Deserialize, Serialize};

use crate::permission::PendingPermission;

/// Which wire format a request arrived in (and its response is encoded in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Anthropic,
    OpenAiChat,
}

/// Canonical message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single non-tool part of a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Message content: a plain string, or an ordered list of text/image parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Build content from parts, collapsing a lone text part into plain text.
    #[must_use]
    pub fn from_parts(mut parts: Vec<ContentPart>) -> Self {
        if parts.len() == 1 && matches!(parts[0], ContentPart::Text { .. }) {
            if let Some(ContentPart::Text { text }) = parts.pop() {
                return MessageContent::Text(text);
            }
        }
        MessageContent::Parts(parts)
    }

    /// Re-expand into the part list form.
    #[must_use]
    pub fn to_parts(&self) -> Vec<ContentPart> {
        match self {
            MessageContent::Text(text) => vec![ContentPart::text(text.clone())],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Iterate over every text fragment in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        let (single, parts) = match self {
            MessageContent::Text(text) => (Some(text.as_str()), &[][..]),
            MessageContent::Parts(parts) => (None, parts.as_slice()),
        };
        single.into_iter().chain(parts.iter().filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::ImageUrl { .. } => None,
        }))
    }
}

/// A tool invocation carried by an assistant message. `arguments` is the
/// serialized JSON input handed to the backend provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One conversation turn in the canonical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: CanonicalRole,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl CanonicalMessage {
    #[must_use]
    pub fn new(role: CanonicalRole, content: MessageContent) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[must_use]
    pub fn text(role: CanonicalRole, text: impl Into<String>) -> Self {
        Self::new(role, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: CanonicalRole::Tool,
            content: MessageContent::Text(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// Provider-agnostic tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Output of a request normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub model: String,
    pub stream: bool,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub messages: Vec<CanonicalMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// A whole generation folded out of an event stream, for non-streaming replies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedResponse {
    pub text: String,
    pub reasoning: String,
    /// Tool calls in first-start order with their concatenated arguments.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: Option<crate::protocol::stop_reason::CanonicalStopReason>,
}

// ---------------------------------------------------------------------------
// Canonical agent events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallPhase {
    Start,
    Update,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Payload of a `response` event. Every field is optional; a provider fills
/// in whatever it has for this step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_params: Option<String>,
    #[serde(
        default,
        rename = "totalUsage",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<PendingPermission>,
}

/// The event taxonomy every backend provider emits and every encoder consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentEvent {
    Response(ResponsePayload),
    End {
        #[serde(rename = "userStop")]
        user_stop: bool,
    },
    Error {
        error: String,
    },
}

impl AgentEvent {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        AgentEvent::Response(ResponsePayload {
            content: Some(content.into()),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn reasoning(content: impl Into<String>) -> Self {
        AgentEvent::Response(ResponsePayload {
            reasoning_content: Some(content.into()),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn tool_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        AgentEvent::Response(ResponsePayload {
            tool_call: Some(ToolCallPhase::Start),
            tool_call_id: Some(id.into()),
            tool_call_name: Some(name.into()),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn tool_args(id: impl Into<String>, fragment: impl Into<String>) -> Self {
        AgentEvent::Response(ResponsePayload {
            tool_call: Some(ToolCallPhase::Update),
            tool_call_id: Some(id.into()),
            tool_call_params: Some(fragment.into()),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn usage(input_tokens: u64, output_tokens: u64) -> Self {
        AgentEvent::Response(ResponsePayload {
            total_usage: Some(Usage {
                input_tokens,
                output_tokens,
            }),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn stop_reason(reason: impl Into<String>) -> Self {
        AgentEvent::Response(ResponsePayload {
            stop_reason: Some(reason.into()),
            ..ResponsePayload::default()
        })
    }

    #[must_use]
    pub fn end() -> Self {
        AgentEvent::End { user_stop: false }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error {
            error: message.into(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentEvent::Response(_))
    }
}
