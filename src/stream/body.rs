//! Streaming response body: upstream bytes in, spliced frames out.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::pipeline::FramePipeline;
use super::splice::ReasoningMode;
use crate::abort::{RequestOutcome, RequestScope};
use crate::error::GatewayError;

struct BodyState<S> {
    upstream: Pin<Box<S>>,
    pipeline: FramePipeline,
    pending: VecDeque<Bytes>,
    scope: Option<RequestScope>,
}

impl<S> BodyState<S> {
    fn finish(&mut self, outcome: RequestOutcome) {
        if let Some(scope) = self.scope.take() {
            scope.finish(outcome);
        }
    }

    fn cancel(&mut self) {
        self.pending.clear();
        self.pipeline.discard();
        self.finish(RequestOutcome::Cancelled);
    }
}

/// Wrap an upstream byte stream into the downstream body stream.
///
/// The returned stream owns `scope`. It reports `Completed` once the terminal
/// frame has been handed to the consumer or upstream ended cleanly, `Failed` on an upstream read error and
/// `Cancelled` when the signal fires. Dropping it early (client gone) drops the
/// scope while armed, which aborts and reports `Cancelled` as well.
///
/// Upstream is only polled when the consumer asks for the next frame, so a
/// slow reader throttles upstream reads.
pub fn spliced_stream<S, E>(
    upstream: S,
    mode: ReasoningMode,
    scope: RequestScope,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = BodyState {
        upstream: Box::pin(upstream),
        pipeline: FramePipeline::new(mode),
        pending: VecDeque::with_capacity(8),
        scope: Some(scope),
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            let signal = match state.scope.as_ref() {
                Some(scope) if scope.signal().is_aborted() => {
                    state.cancel();
                    return None;
                }
                Some(scope) => Some(scope.signal().clone()),
                None => None,
            };

            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            // Every frame up to the terminal one has been handed out.
            if state.pipeline.is_terminated() {
                state.finish(RequestOutcome::Completed);
                return None;
            }
            let signal = signal?;

            let next = tokio::select! {
                biased;
                () = signal.aborted() => continue,
                next = state.upstream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    state.pipeline.push_chunk(&chunk, &mut state.pending);
                }
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "upstream stream failed mid-response");
                    state.pipeline.discard();
                    let err = GatewayError::Transport(err.to_string());
                    state.finish(RequestOutcome::from_error(&err));
                }
                None => {
                    let tail = state.pipeline.pending_len();
                    if tail > 0 {
                        tracing::debug!(bytes = tail, "discarding unterminated stream tail");
                        state.pipeline.discard();
                    }
                    state.finish(RequestOutcome::Completed);
                }
            }
        }
    })
}
