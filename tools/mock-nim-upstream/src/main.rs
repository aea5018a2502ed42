use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_002;
const DEFAULT_CHUNK_BYTES: usize = 17;
const DEFAULT_CHUNK_DELAY_MS: u64 = 15;

type MockBody = UnsyncBoxBody<Bytes, Infallible>;

#[derive(Copy, Clone)]
enum MockMode {
    /// Follow the `stream` flag of each request.
    Auto,
    Nonstream,
    Stream,
}

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Reasoning,
    Error,
}

struct RequestStats {
    streamed: AtomicU64,
    buffered: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            streamed: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
        }
    }

    fn record(&self, stream: bool) {
        let counter = if stream { &self.streamed } else { &self.buffered };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.streamed.store(0, Ordering::Relaxed);
        self.buffered.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    mode: MockMode,
    scenario: MockScenario,
    chunk_bytes: usize,
    chunk_delay: Duration,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_parse("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        mode: parse_mode(),
        scenario: parse_scenario(),
        chunk_bytes: env_parse("MOCK_CHUNK_BYTES", DEFAULT_CHUNK_BYTES).max(1),
        chunk_delay: Duration::from_millis(env_parse("MOCK_CHUNK_DELAY_MS", DEFAULT_CHUNK_DELAY_MS)),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!("mock NIM upstream listening on http://127.0.0.1:{port}/v1");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_mode() -> MockMode {
    match env::var("MOCK_MODE").as_deref() {
        Ok("stream") => MockMode::Stream,
        Ok("nonstream") => MockMode::Nonstream,
        Ok("auto") | Err(_) => MockMode::Auto,
        Ok(other) => {
            eprintln!("unknown MOCK_MODE '{other}', fallback to auto");
            MockMode::Auto
        }
    }
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("text") => MockScenario::Text,
        Ok("error") => MockScenario::Error,
        Ok("reasoning") | Err(_) => MockScenario::Reasoning,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to reasoning");
            MockScenario::Reasoning
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<MockBody> {
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response(StatusCode::OK, "application/json", br#"{"ok":true}"#);
    }
    if !matches!(path, "/v1/chat/completions" | "/chat/completions") {
        return simple_response(StatusCode::NOT_FOUND, "application/json", br#"{"error":"not_found"}"#);
    }
    if method != Method::POST {
        return simple_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }

    if matches!(state.scenario, MockScenario::Error) {
        return simple_response(
            StatusCode::TOO_MANY_REQUESTS,
            "application/json",
            br#"{"error":{"message":"mock rate limit","type":"rate_limit_error"}}"#,
        );
    }

    let stream = match state.mode {
        MockMode::Stream => true,
        MockMode::Nonstream => false,
        MockMode::Auto => requested_stream(&body),
    };
    state.stats.record(stream);
    if stream {
        streaming_response(state)
    } else {
        non_streaming_response(state.scenario)
    }
}

fn requested_stream(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("stream").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

fn stats_response(state: &MockState) -> Response<MockBody> {
    let body = format!(
        "{{\"streamed\":{},\"buffered\":{}}}",
        state.stats.streamed.load(Ordering::Relaxed),
        state.stats.buffered.load(Ordering::Relaxed)
    );
    let mut response = Response::new(Full::new(Bytes::from(body)).boxed_unsync());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn non_streaming_response(scenario: MockScenario) -> Response<MockBody> {
    let body = match scenario {
        MockScenario::Reasoning => NONSTREAM_REASONING,
        MockScenario::Text | MockScenario::Error => NONSTREAM_TEXT,
    };
    simple_response(StatusCode::OK, "application/json", body)
}

/// Replays the scenario's SSE transcript in fixed-size slices so that lines
/// and even UTF-8 sequences straddle chunk boundaries.
fn streaming_response(state: &MockState) -> Response<MockBody> {
    let transcript: &'static [u8] = match state.scenario {
        MockScenario::Reasoning => STREAM_REASONING,
        MockScenario::Text | MockScenario::Error => STREAM_TEXT,
    };
    let chunk_bytes = state.chunk_bytes;
    let delay = state.chunk_delay;
    let chunks = stream::unfold(0_usize, move |offset| async move {
        if offset >= transcript.len() {
            return None;
        }
        if offset > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let end = (offset + chunk_bytes).min(transcript.len());
        let frame = Frame::data(Bytes::from_static(&transcript[offset..end]));
        Some((Ok::<_, Infallible>(frame), end))
    });

    let mut response = Response::new(BodyExt::boxed_unsync(StreamBody::new(chunks)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<MockBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const NONSTREAM_TEXT: &[u8] = br#"{"id":"cmpl-mock","object":"chat.completion","created":1,"model":"mock/model","choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#;
const NONSTREAM_REASONING: &[u8] = br#"{"id":"cmpl-mock","object":"chat.completion","created":1,"model":"mock/model","choices":[{"index":0,"message":{"role":"assistant","reasoning_content":"The user wants a greeting. Keep it short.","content":"Hello! été is summer."},"finish_reason":"stop"}],"usage":{"prompt_tokens":4,"completion_tokens":12,"total_tokens":16}}"#;

const STREAM_TEXT: &[u8] = b"data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"o\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"k\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
const STREAM_REASONING: &[u8] = "data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"reasoning_content\":\"The user wants \"},\"finish_reason\":null}]}\n\n\
: keep-alive\n\n\
data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"a greeting. Keep it short.\"},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello! \"},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"été is summer.\"},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"cmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"mock/model\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":12,\"total_tokens\":16}}\n\n\
data: [DONE]\n\n"
    .as_bytes();
