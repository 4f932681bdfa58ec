use std::time::Duration;

use tracing::info;

use crate::protocol::canonical::{CanonicalMessage, Usage};

/// Estimate tokens for `char_count` characters: `max(1, floor(chars / 4))`.
#[must_use]
pub fn estimate_tokens_for_chars(char_count: u64) -> u64 {
    (char_count / 4).max(1)
}

/// Estimate the tokens of a single string.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    estimate_tokens_for_chars(text.chars().count() as u64)
}

/// Estimate the input tokens of a canonical conversation.
///
/// Counts characters of every text fragment (system prompt, turns, tool
/// results). Images and tool-call arguments are not counted.
#[must_use]
pub fn estimate_input_tokens(messages: &[CanonicalMessage]) -> u64 {
    let chars: u64 = messages
        .iter()
        .flat_map(|msg| msg.content.texts())
        .map(|text| text.chars().count() as u64)
        .sum();
    estimate_tokens_for_chars(chars)
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(event_id: &str, model: &str, usage: &Usage, duration: Duration) {
    info!(
        event_id,
        model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{CanonicalRole, ContentPart, MessageContent};

    #[test]
    fn test_estimate_floor_with_minimum_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abcdefghi"), 2);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // 8 multi-byte chars
        assert_eq!(estimate_tokens("éééééééé"), 2);
    }

    #[test]
    fn test_input_estimate_spans_all_messages() {
        let messages = vec![
            CanonicalMessage::text(CanonicalRole::System, "abcd"),
            CanonicalMessage::new(
                CanonicalRole::User,
                MessageContent::Parts(vec![
                    ContentPart::text("efgh"),
                    ContentPart::image("data:image/png;base64,AAAAAAAAAAAA"),
                ]),
            ),
            CanonicalMessage::tool_result("t1", "ijkl"),
        ];
        assert_eq!(estimate_input_tokens(&messages), 3);
    }
}
