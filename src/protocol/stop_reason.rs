//! Canonical stop-reason taxonomy and its mapping onto each wire vocabulary.

/// Why a generation ended, as reported by a backend provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalStopReason {
    Complete,
    Stop,
    EndTurn,
    MaxTokens,
    Length,
    ToolUse,
    ToolCalls,
    FunctionCall,
    StopSequence,
    /// Anything a provider reports outside the known taxonomy.
    Other,
}

impl CanonicalStopReason {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "complete" => Self::Complete,
            "stop" => Self::Stop,
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "length" => Self::Length,
            "tool_use" => Self::ToolUse,
            "tool_calls" => Self::ToolCalls,
            "function_call" => Self::FunctionCall,
            "stop_sequence" => Self::StopSequence,
            _ => Self::Other,
        }
    }
}

#[must_use]
pub fn canonical_stop_to_anthropic(reason: CanonicalStopReason) -> &'static str {
    match reason {
        CanonicalStopReason::MaxTokens | CanonicalStopReason::Length => "max_tokens",
        CanonicalStopReason::ToolUse
        | CanonicalStopReason::ToolCalls
        | CanonicalStopReason::FunctionCall => "tool_use",
        CanonicalStopReason::StopSequence => "stop_sequence",
        CanonicalStopReason::Complete
        | CanonicalStopReason::Stop
        | CanonicalStopReason::EndTurn
        | CanonicalStopReason::Other => "end_turn",
    }
}

#[must_use]
pub fn canonical_stop_to_openai(reason: CanonicalStopReason) -> &'static str {
    match reason {
        CanonicalStopReason::MaxTokens | CanonicalStopReason::Length => "length",
        CanonicalStopReason::ToolUse
        | CanonicalStopReason::ToolCalls
        | CanonicalStopReason::FunctionCall => "tool_calls",
        CanonicalStopReason::Complete
        | CanonicalStopReason::Stop
        | CanonicalStopReason::EndTurn
        | CanonicalStopReason::StopSequence
        | CanonicalStopReason::Other => "stop",
    }
}

/// Effective Anthropic `stop_reason`. Registered tool calls always win;
/// `None` only when nothing was ever reported.
#[must_use]
pub fn effective_anthropic_stop_reason(
    reason: Option<CanonicalStopReason>,
    has_tool_calls: bool,
) -> Option<&'static str> {
    if has_tool_calls {
        return Some("tool_use");
    }
    reason.map(canonical_stop_to_anthropic)
}

/// Effective `OpenAI` `finish_reason`, with the same tool-call precedence.
#[must_use]
pub fn effective_openai_finish_reason(
    reason: Option<CanonicalStopReason>,
    has_tool_calls: bool,
) -> Option<&'static str> {
    if has_tool_calls {
        return Some("tool_calls");
    }
    reason.map(canonical_stop_to_openai)
}
