use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::protocol::canonical::AgentEvent;
use crate::stream::registry::SessionHandle;

enum Step {
    Running,
    /// An `error` was delivered; one bookkeeping `end` follows.
    AfterError,
    Done,
}

struct Lifecycle {
    handle: SessionHandle,
    cancel: CancellationToken,
    events: BoxStream<'static, AgentEvent>,
    step: Step,
}

impl Lifecycle {
    fn deliver(mut self, event: AgentEvent) -> Option<(AgentEvent, Self)> {
        self.handle.record_event();
        if matches!(self.step, Step::Done) {
            self.handle.release();
        }
        Some((event, self))
    }

    fn finish(mut self, event: AgentEvent) -> Option<(AgentEvent, Self)> {
        self.step = Step::Done;
        self.events = stream::empty().boxed();
        self.deliver(event)
    }
}

/// Wrap a provider's event stream with the session's lifecycle guarantees:
///
/// * the token is checked before every await, and cancellation yields a
///   single `end{userStop: true}`;
/// * exactly one `end` closes the stream, synthesized if the provider stops
///   without one, and delivered after an `error` for bookkeeping;
/// * nothing follows the terminal event, and the session is released when
///   it is delivered (or when the stream is dropped early).
pub fn supervise(
    handle: SessionHandle,
    events: BoxStream<'static, AgentEvent>,
) -> BoxStream<'static, AgentEvent> {
    let cancel = handle.cancel_token();
    let state = Lifecycle {
        handle,
        cancel,
        events,
        step: Step::Running,
    };

    stream::unfold(state, |mut st| async move {
        match st.step {
            Step::Done => return None,
            Step::AfterError => return st.finish(AgentEvent::End { user_stop: false }),
            Step::Running => {}
        }

        let next = tokio::select! {
            biased;
            () = st.cancel.cancelled() => {
                tracing::debug!(event_id = %st.handle.event_id(), "session cancelled");
                return st.finish(AgentEvent::End { user_stop: true });
            }
            next = st.events.next() => next,
        };

        match next {
            Some(AgentEvent::Response(payload)) => st.deliver(AgentEvent::Response(payload)),
            Some(AgentEvent::End { user_stop }) => st.finish(AgentEvent::End { user_stop }),
            Some(AgentEvent::Error { error }) => {
                tracing::warn!(event_id = %st.handle.event_id(), error = %error, "provider error");
                st.step = Step::AfterError;
                st.events = stream::empty().boxed();
                st.deliver(AgentEvent::Error { error })
            }
            None => st.finish(AgentEvent::End { user_stop: false }),
        }
    })
    .boxed()
}
