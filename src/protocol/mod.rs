pub mod anthropic;
pub mod canonical;
pub(crate) mod error_shapes;
pub mod openai_chat;
pub mod stop_reason;

use crate::error::ErrorCategory;
use crate::protocol::canonical::{AgentEvent, ResponsePayload, ToolCallPhase};
use crate::protocol::stop_reason::CanonicalStopReason;

/// A stateful, per-connection translator from canonical agent events to one
/// wire protocol's incremental SSE frames.
///
/// Every method appends complete frames to `out`; encoding never suspends.
pub trait StreamEncoder: Send {
    fn initial(&mut self, out: &mut String);
    fn text_delta(&mut self, text: &str, out: &mut String);
    fn reasoning_delta(&mut self, text: &str, out: &mut String);
    fn tool_call_start(&mut self, id: &str, name: &str, out: &mut String);
    fn tool_call_chunk(&mut self, id: &str, fragment: &str, out: &mut String);
    fn set_usage(&mut self, input_tokens: u64, output_tokens: u64);
    fn set_stop_reason(&mut self, reason: CanonicalStopReason);
    /// Close open blocks and write the terminal frames. Idempotent.
    fn final_frames(&mut self, out: &mut String);
    /// Write an in-band error frame. Nothing is written afterwards.
    fn error(&mut self, category: ErrorCategory, message: &str, out: &mut String);
    fn is_finished(&self) -> bool;

    /// Route one canonical event to the matching encoder operations.
    fn encode_event(&mut self, event: &AgentEvent, out: &mut String) {
        match event {
            AgentEvent::Response(payload) => self.encode_response(payload, out),
            AgentEvent::End { .. } => self.final_frames(out),
            AgentEvent::Error { error } => self.error(ErrorCategory::ServerError, error, out),
        }
    }

    /// A single payload may carry several fields; they are applied in a
    /// fixed order: reasoning, text, tool call, usage, stop reason.
    fn encode_response(&mut self, payload: &ResponsePayload, out: &mut String) {
        if let Some(reasoning) = payload.reasoning_content.as_deref() {
            self.reasoning_delta(reasoning, out);
        }
        if let Some(text) = payload.content.as_deref() {
            self.text_delta(text, out);
        }
        match (payload.tool_call, payload.tool_call_id.as_deref()) {
            (Some(ToolCallPhase::Start), Some(id)) => {
                let name = payload.tool_call_name.as_deref().unwrap_or_default();
                self.tool_call_start(id, name, out);
                if let Some(params) = payload.tool_call_params.as_deref() {
                    if !params.is_empty() {
                        self.tool_call_chunk(id, params, out);
                    }
                }
            }
            (Some(ToolCallPhase::Update), Some(id)) => {
                if let Some(params) = payload.tool_call_params.as_deref() {
                    self.tool_call_chunk(id, params, out);
                }
            }
            _ => {}
        }
        if let Some(usage) = payload.total_usage {
            self.set_usage(usage.input_tokens, usage.output_tokens);
        }
        if let Some(reason) = payload.stop_reason.as_deref() {
            self.set_stop_reason(CanonicalStopReason::parse(reason));
        }
        if let Some(permission) = payload.permission.as_ref() {
            tracing::debug!(
                request_id = %permission.request_id,
                tool = %permission.tool_name,
                "permission required; no wire frame"
            );
        }
    }
}
