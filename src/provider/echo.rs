use std::collections::VecDeque;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::observability::token_counter::{estimate_input_tokens, estimate_tokens};
use crate::protocol::canonical::{AgentEvent, CanonicalRole};
use crate::provider::{Provider, ProviderRequest, SessionContext};

/// Streams the last user turn back in fixed-size chunks.
pub struct EchoProvider {
    id: String,
    models: Vec<String>,
    chunk_chars: usize,
    chunk_delay: Duration,
}

impl EchoProvider {
    #[must_use]
    pub fn new(id: String, models: Vec<String>, chunk_chars: usize, chunk_delay_ms: u64) -> Self {
        Self {
            id,
            models,
            chunk_chars: chunk_chars.max(1),
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        }
    }
}

struct EchoState {
    chunks: VecDeque<String>,
    tail: VecDeque<AgentEvent>,
    delay: Duration,
    cancel: CancellationToken,
}

fn split_chars(text: &str, size: usize) -> VecDeque<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

impl Provider for EchoProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn stream(
        &self,
        request: ProviderRequest,
        ctx: SessionContext,
    ) -> BoxStream<'static, AgentEvent> {
        let reply = request
            .messages
            .iter()
            .rev()
            .find(|msg| msg.role == CanonicalRole::User)
            .map(|msg| msg.content.texts().collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        let input_tokens = estimate_input_tokens(&request.messages);
        let output_tokens = estimate_tokens(&reply);
        let state = EchoState {
            chunks: split_chars(&reply, self.chunk_chars),
            tail: VecDeque::from([
                AgentEvent::usage(input_tokens, output_tokens),
                AgentEvent::stop_reason("end_turn"),
                AgentEvent::end(),
            ]),
            delay: self.chunk_delay,
            cancel: ctx.cancel,
        };

        stream::unfold(state, |mut st| async move {
            if st.cancel.is_cancelled() {
                return None;
            }
            if let Some(chunk) = st.chunks.pop_front() {
                if !st.delay.is_zero() {
                    tokio::select! {
                        biased;
                        () = st.cancel.cancelled() => return None,
                        () = tokio::time::sleep(st.delay) => {}
                    }
                }
                return Some((AgentEvent::text(chunk), st));
            }
            st.tail.pop_front().map(|event| (event, st))
        })
        .boxed()
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>, GatewayError>> {
        let models = if self.models.is_empty() {
            vec!["echo-1".to_string()]
        } else {
            self.models.clone()
        };
        async move { Ok(models) }.boxed()
    }
}
