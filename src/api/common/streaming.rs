use std::convert::Infallible;

use axum::response::Response;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;

use crate::protocol::canonical::AgentEvent;
use crate::protocol::StreamEncoder;

use super::with_event_id_header;

enum Phase {
    Initial,
    Streaming,
    Done,
}

struct SseBody<E> {
    encoder: E,
    events: BoxStream<'static, AgentEvent>,
    event_id: String,
    phase: Phase,
}

/// Build a `text/event-stream` response whose body is `encoder`'s rendering
/// of `events`. Each body chunk holds the frames produced by one event;
/// events that produce nothing are skipped rather than sent empty.
///
/// Dropping the body (client disconnect) drops `events`, which releases the
/// session.
pub(crate) fn sse_response<E>(
    encoder: E,
    events: BoxStream<'static, AgentEvent>,
    event_id: &str,
) -> Response
where
    E: StreamEncoder + 'static,
{
    let body = SseBody {
        encoder,
        events,
        event_id: event_id.to_string(),
        phase: Phase::Initial,
    };

    let frames = stream::unfold(body, |mut st| async move {
        let mut out = String::new();
        loop {
            match st.phase {
                Phase::Done => return None,
                Phase::Initial => {
                    st.encoder.initial(&mut out);
                    st.phase = Phase::Streaming;
                }
                Phase::Streaming => match st.events.next().await {
                    Some(event) => st.encoder.encode_event(&event, &mut out),
                    None => {
                        if !st.encoder.is_finished() {
                            st.encoder.final_frames(&mut out);
                        }
                        st.phase = Phase::Done;
                        tracing::debug!(event_id = %st.event_id, "event stream closed");
                    }
                },
            }
            if !out.is_empty() {
                return Some((Ok::<Bytes, Infallible>(Bytes::from(out)), st));
            }
        }
    });

    let mut response = Response::new(axum::body::Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    with_event_id_header(response, event_id)
}
