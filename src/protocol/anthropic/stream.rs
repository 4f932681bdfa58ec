use rustc_hash::FxHashMap;
use serde::de::IgnoredAny;
use smallvec::SmallVec;

use crate::error::ErrorCategory;
use crate::protocol::error_shapes::anthropic_error_type;
use crate::protocol::stop_reason::{effective_anthropic_stop_reason, CanonicalStopReason};
use crate::protocol::StreamEncoder;
use crate::util::{push_json_string_escaped, push_u64_decimal, push_usize_decimal};

const TEXT_BLOCK_INDEX: usize = 0;

struct ToolBlock {
    index: usize,
    arguments: String,
}

/// Per-connection Anthropic Messages SSE encoder.
///
/// Index 0 is the text block opened by `initial`. Tool calls take
/// `1 + ordinal` in first-start order and indices are never reused.
pub struct AnthropicStreamEncoder {
    message_id: String,
    model: String,
    tool_order: SmallVec<[String; 4]>,
    tools: FxHashMap<String, ToolBlock>,
    usage_input: u64,
    usage_output: u64,
    stop_reason: Option<CanonicalStopReason>,
    finished: bool,
}

impl AnthropicStreamEncoder {
    #[must_use]
    pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            tool_order: SmallVec::new(),
            tools: FxHashMap::default(),
            usage_input: 0,
            usage_output: 0,
            stop_reason: None,
            finished: false,
        }
    }

    /// Content-block index assigned to a tool call, if it was started.
    #[must_use]
    pub fn tool_index(&self, id: &str) -> Option<usize> {
        self.tools.get(id).map(|block| block.index)
    }

    fn push_content_block_stop(out: &mut String, index: usize) {
        out.push_str(
            "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":",
        );
        push_usize_decimal(out, index);
        out.push_str("}\n\n");
    }
}

impl StreamEncoder for AnthropicStreamEncoder {
    fn initial(&mut self, out: &mut String) {
        out.push_str("event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":");
        push_json_string_escaped(out, &self.message_id);
        out.push_str(",\"type\":\"message\",\"role\":\"assistant\",\"model\":");
        push_json_string_escaped(out, &self.model);
        out.push_str(
            ",\"content\":[],\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}}\n\n",
        );
        out.push_str("event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n");
        out.push_str("event: ping\ndata: {\"type\":\"ping\"}\n\n");
    }

    fn text_delta(&mut self, text: &str, out: &mut String) {
        if self.finished || text.is_empty() {
            return;
        }
        out.push_str("event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":");
        push_json_string_escaped(out, text);
        out.push_str("}}\n\n");
    }

    // Thinking has no reserved block here; index 0 stays text.
    fn reasoning_delta(&mut self, _text: &str, _out: &mut String) {}

    fn tool_call_start(&mut self, id: &str, name: &str, out: &mut String) {
        if self.finished || self.tools.contains_key(id) {
            return;
        }
        let index = TEXT_BLOCK_INDEX + 1 + self.tool_order.len();
        self.tool_order.push(id.to_string());
        self.tools.insert(
            id.to_string(),
            ToolBlock {
                index,
                arguments: String::new(),
            },
        );

        out.push_str(
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":",
        );
        push_usize_decimal(out, index);
        out.push_str(",\"content_block\":{\"type\":\"tool_use\",\"id\":");
        push_json_string_escaped(out, id);
        out.push_str(",\"name\":");
        push_json_string_escaped(out, name);
        out.push_str(",\"input\":{}}}\n\n");
    }

    fn tool_call_chunk(&mut self, id: &str, fragment: &str, out: &mut String) {
        if self.finished {
            return;
        }
        let Some(block) = self.tools.get_mut(id) else {
            tracing::debug!(tool_call_id = %id, "argument fragment for unknown tool call ignored");
            return;
        };
        block.arguments.push_str(fragment);

        // Only a buffer that parses as complete JSON is emitted.
        if serde_json::from_str::<IgnoredAny>(&block.arguments).is_err() {
            return;
        }
        out.push_str(
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":",
        );
        push_usize_decimal(out, block.index);
        out.push_str(",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":");
        push_json_string_escaped(out, &block.arguments);
        out.push_str("}}\n\n");
    }

    fn set_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.usage_input = input_tokens;
        self.usage_output = output_tokens;
    }

    fn set_stop_reason(&mut self, reason: CanonicalStopReason) {
        self.stop_reason = Some(reason);
    }

    fn final_frames(&mut self, out: &mut String) {
        if self.finished {
            return;
        }
        self.finished = true;

        Self::push_content_block_stop(out, TEXT_BLOCK_INDEX);
        for id in &self.tool_order {
            if let Some(block) = self.tools.get(id) {
                Self::push_content_block_stop(out, block.index);
            }
        }

        out.push_str("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":");
        match effective_anthropic_stop_reason(self.stop_reason, !self.tool_order.is_empty()) {
            Some(reason) => push_json_string_escaped(out, reason),
            None => out.push_str("null"),
        }
        out.push_str(",\"stop_sequence\":null},\"usage\":{\"input_tokens\":");
        push_u64_decimal(out, self.usage_input);
        out.push_str(",\"output_tokens\":");
        push_u64_decimal(out, self.usage_output);
        out.push_str("}}\n\n");
        out.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }

    fn error(&mut self, category: ErrorCategory, message: &str, out: &mut String) {
        if self.finished {
            return;
        }
        self.finished = true;
        out.push_str("event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":");
        push_json_string_escaped(out, anthropic_error_type(category));
        out.push_str(",\"message\":");
        push_json_string_escaped(out, message);
        out.push_str("}}\n\n");
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
