//! Shared API helpers reused across ingress handlers.

mod flow;
mod non_streaming;
mod probe;
mod streaming;

pub(crate) use flow::{run_ingress, IngressSpec, PreparedRequest};
pub(crate) use non_streaming::{ok_json_response, with_event_id_header};
pub(crate) use probe::{parse_checked_request, parse_json_body, requested_event_id};
pub(crate) use streaming::sse_response;
