use criterion::{black_box, criterion_group, criterion_main, Criterion};

use llm_gateway::config::RoutingConfig;
use llm_gateway::protocol::anthropic::decoder::normalize_anthropic_request;
use llm_gateway::protocol::anthropic::stream::AnthropicStreamEncoder;
use llm_gateway::protocol::anthropic::AnthropicRequest;
use llm_gateway::protocol::canonical::AgentEvent;
use llm_gateway::protocol::openai_chat::stream::OpenAiStreamEncoder;
use llm_gateway::protocol::StreamEncoder;
use llm_gateway::routing::ModelRouter;

/// A typical agent turn: streamed text, one tool call with fragmented
/// arguments, usage and a stop reason.
fn session_events() -> Vec<AgentEvent> {
    let mut events = Vec::with_capacity(80);
    for i in 0..48 {
        events.push(AgentEvent::text(format!("token {i} with \"quotes\" and \\n ")));
    }
    events.push(AgentEvent::tool_start("call_1", "bash"));
    for fragment in ["{\"command\":", "\"ls -la\",", "\"cwd\":\"/tmp\"", "}"] {
        events.push(AgentEvent::tool_args("call_1", fragment));
    }
    events.push(AgentEvent::usage(1200, 340));
    events.push(AgentEvent::stop_reason("tool_use"));
    events.push(AgentEvent::end());
    events
}

fn encode_all<E: StreamEncoder>(mut encoder: E, events: &[AgentEvent]) -> usize {
    let mut out = String::with_capacity(16 * 1024);
    encoder.initial(&mut out);
    for event in events {
        encoder.encode_event(event, &mut out);
    }
    out.len()
}

fn bench_stream_encoders(c: &mut Criterion) {
    let events = session_events();

    c.bench_function("anthropic_stream_session", |b| {
        b.iter(|| {
            let encoder = AnthropicStreamEncoder::new("msg_bench", "claude-sonnet-4-5");
            black_box(encode_all(encoder, black_box(&events)))
        });
    });

    c.bench_function("openai_stream_session", |b| {
        b.iter(|| {
            let encoder = OpenAiStreamEncoder::new("chatcmpl-bench", "gpt-4o", 1_700_000_000)
                .with_include_usage(true);
            black_box(encode_all(encoder, black_box(&events)))
        });
    });
}

fn bench_request_normalize(c: &mut Criterion) {
    let body = serde_json::json!({
        "model": "claude-sonnet-4-5",
        "max_tokens": 1024,
        "system": "You are a careful assistant.",
        "messages": [
            {"role": "user", "content": "List the files."},
            {"role": "assistant", "content": [
                {"type": "text", "text": "Running ls."},
                {"type": "tool_use", "id": "call_1", "name": "bash", "input": {"command": "ls"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "call_1", "content": "a.txt\nb.txt"},
                {"type": "text", "text": "Now summarize."}
            ]}
        ]
    })
    .to_string();

    c.bench_function("anthropic_request_normalize", |b| {
        b.iter(|| {
            let request: AnthropicRequest =
                serde_json::from_str(black_box(&body)).expect("request json");
            black_box(normalize_anthropic_request(request).expect("normalize"))
        });
    });
}

fn bench_model_routing(c: &mut Criterion) {
    let router = ModelRouter::new(&RoutingConfig::default());
    c.bench_function("route_model", |b| {
        b.iter(|| {
            black_box(router.resolve(black_box("gpt-4o")).is_ok());
            black_box(router.resolve(black_box("echo/echo-1")).is_ok());
            black_box(router.resolve(black_box("acme, model-x")).is_ok());
        });
    });
}

criterion_group!(
    benches,
    bench_stream_encoders,
    bench_request_normalize,
    bench_model_routing
);
criterion_main!(benches);
