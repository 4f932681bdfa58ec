use rustc_hash::FxHashMap;

use crate::error::ErrorCategory;
use crate::protocol::error_shapes::openai_error_type;
use crate::protocol::stop_reason::{effective_openai_finish_reason, CanonicalStopReason};
use crate::protocol::StreamEncoder;
use crate::util::{push_json_string_escaped, push_u64_decimal, push_usize_decimal};

/// Per-connection `OpenAI` Chat Completions SSE encoder.
///
/// Tool-argument fragments are forwarded verbatim as they arrive; the
/// `tool_calls[].index` is the call's 0-based start ordinal.
pub struct OpenAiStreamEncoder {
    completion_id: String,
    model: String,
    created: u64,
    include_usage: bool,
    tool_indices: FxHashMap<String, usize>,
    usage_input: u64,
    usage_output: u64,
    stop_reason: Option<CanonicalStopReason>,
    finished: bool,
}

impl OpenAiStreamEncoder {
    #[must_use]
    pub fn new(completion_id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            completion_id: completion_id.into(),
            model: model.into(),
            created,
            include_usage: false,
            tool_indices: FxHashMap::default(),
            usage_input: 0,
            usage_output: 0,
            stop_reason: None,
            finished: false,
        }
    }

    /// Emit a trailing usage-only chunk before `[DONE]` (`stream_options.include_usage`).
    #[must_use]
    pub fn with_include_usage(mut self, include_usage: bool) -> Self {
        self.include_usage = include_usage;
        self
    }

    fn push_chunk_prefix(&self, out: &mut String) {
        out.push_str("data: {\"id\":");
        push_json_string_escaped(out, &self.completion_id);
        out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
        push_u64_decimal(out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(out, &self.model);
    }

    fn push_delta_open(&self, out: &mut String) {
        self.push_chunk_prefix(out);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":");
    }

    /// `,"usage":{...}` with the accumulated token counts.
    fn push_usage(&self, out: &mut String) {
        out.push_str(",\"usage\":{\"prompt_tokens\":");
        push_u64_decimal(out, self.usage_input);
        out.push_str(",\"completion_tokens\":");
        push_u64_decimal(out, self.usage_output);
        out.push_str(",\"total_tokens\":");
        push_u64_decimal(out, self.usage_input.saturating_add(self.usage_output));
        out.push('}');
    }

    fn push_delta_close(out: &mut String) {
        out.push_str(",\"finish_reason\":null}]}\n\n");
    }
}

impl StreamEncoder for OpenAiStreamEncoder {
    fn initial(&mut self, out: &mut String) {
        self.push_delta_open(out);
        out.push_str("{\"role\":\"assistant\",\"content\":\"\"}");
        Self::push_delta_close(out);
    }

    fn text_delta(&mut self, text: &str, out: &mut String) {
        if self.finished || text.is_empty() {
            return;
        }
        self.push_delta_open(out);
        out.push_str("{\"content\":");
        push_json_string_escaped(out, text);
        out.push('}');
        Self::push_delta_close(out);
    }

    fn reasoning_delta(&mut self, text: &str, out: &mut String) {
        if self.finished || text.is_empty() {
            return;
        }
        self.push_delta_open(out);
        out.push_str("{\"reasoning_content\":");
        push_json_string_escaped(out, text);
        out.push('}');
        Self::push_delta_close(out);
    }

    fn tool_call_start(&mut self, id: &str, name: &str, out: &mut String) {
        if self.finished || self.tool_indices.contains_key(id) {
            return;
        }
        let index = self.tool_indices.len();
        self.tool_indices.insert(id.to_string(), index);

        self.push_delta_open(out);
        out.push_str("{\"tool_calls\":[{\"index\":");
        push_usize_decimal(out, index);
        out.push_str(",\"id\":");
        push_json_string_escaped(out, id);
        out.push_str(",\"type\":\"function\",\"function\":{\"name\":");
        push_json_string_escaped(out, name);
        out.push_str(",\"arguments\":\"\"}}]}");
        Self::push_delta_close(out);
    }

    fn tool_call_chunk(&mut self, id: &str, fragment: &str, out: &mut String) {
        if self.finished {
            return;
        }
        let Some(&index) = self.tool_indices.get(id) else {
            tracing::debug!(tool_call_id = %id, "argument fragment for unknown tool call ignored");
            return;
        };
        self.push_delta_open(out);
        out.push_str("{\"tool_calls\":[{\"index\":");
        push_usize_decimal(out, index);
        out.push_str(",\"function\":{\"arguments\":");
        push_json_string_escaped(out, fragment);
        out.push_str("}}]}");
        Self::push_delta_close(out);
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

        self.push_delta_open(out);
        out.push_str("{},\"finish_reason\":");
        match effective_openai_finish_reason(self.stop_reason, !self.tool_indices.is_empty()) {
            Some(reason) => push_json_string_escaped(out, reason),
            None => out.push_str("null"),
        }
        out.push_str("}]");
        self.push_usage(out);
        out.push_str("}\n\n");

        if self.include_usage {
            self.push_chunk_prefix(out);
            out.push_str(",\"choices\":[]");
            self.push_usage(out);
            out.push_str("}\n\n");
        }

        out.push_str("data: [DONE]\n\n");
    }

    fn error(&mut self, category: ErrorCategory, message: &str, out: &mut String) {
        if self.finished {
            return;
        }
        self.finished = true;
        out.push_str("data: {\"error\":{\"message\":");
        push_json_string_escaped(out, message);
        out.push_str(",\"type\":");
        push_json_string_escaped(out, openai_error_type(category));
        out.push_str(",\"param\":null,\"code\":null}}\n\n");
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
