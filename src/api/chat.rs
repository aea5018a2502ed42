//! `POST /v1/chat/completions`: route the model, forward upstream, splice the
//! reply.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::Value;

use crate::abort::{RequestOutcome, RequestScope};
use crate::error::GatewayError;
use crate::observability::{log_request_outcome, RequestContext};
use crate::protocol::chat::{parse_chat_request, ChatCompletion};
use crate::state::AppState;
use crate::stream::{aggregate_record, spliced_stream, ReasoningMode};
use crate::transport::UpstreamReply;
use crate::util::unix_now_secs;

pub async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    let request = match parse_chat_request(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting chat request");
            return err.into_response();
        }
    };
    let Some(messages) = request.messages.as_deref() else {
        return GatewayError::InvalidRequest("'messages' is required".to_string()).into_response();
    };

    let target = state.model_router.resolve(&request.model);
    let stream = request.is_stream();
    let public_model = if request.model.is_empty() {
        target.upstream_model
    } else {
        request.model.as_str()
    };
    let ctx = RequestContext {
        request_id: state.next_request_id(),
        public_model: public_model.to_string(),
        upstream_model: target.upstream_model.to_string(),
        stream,
        started: Instant::now(),
    };
    tracing::debug!(
        request_id = %ctx.request_id,
        model = %ctx.public_model,
        upstream_model = %ctx.upstream_model,
        route = ?target.source,
        stream,
        "forwarding chat request"
    );

    let upstream_request = request.to_upstream(messages, &target, &state.config.features);
    let upstream_body = match serde_json::to_vec(&upstream_request) {
        Ok(encoded) => Bytes::from(encoded),
        Err(err) => {
            return GatewayError::Internal(format!("failed to encode upstream request: {err}"))
                .into_response();
        }
    };

    let request_id = ctx.request_id;
    let scope = RequestScope::new(move |outcome| log_request_outcome(&ctx, outcome));
    let signal = scope.signal().clone();
    let reply = state
        .transport
        .send_chat(&state.upstream, upstream_body, stream, &signal)
        .await;

    match reply {
        Ok(UpstreamReply::Streaming(upstream)) => {
            let body = spliced_stream(upstream, state.reasoning_mode(), scope);
            sse_ok_response(Body::from_stream(body))
        }
        Ok(UpstreamReply::Complete(upstream_body)) => {
            match completion_response(
                &upstream_body,
                state.reasoning_mode(),
                &format!("chatcmpl-{request_id}"),
                public_model,
            ) {
                Ok(response) => {
                    scope.finish(RequestOutcome::Completed);
                    response
                }
                Err(err) => {
                    scope.fail(&err);
                    err.into_response()
                }
            }
        }
        Err(err) => {
            scope.fail(&err);
            err.into_response()
        }
    }
}

fn completion_response(
    upstream_body: &[u8],
    mode: ReasoningMode,
    id: &str,
    public_model: &str,
) -> Result<Response, GatewayError> {
    let mut record: Value = serde_json::from_slice(upstream_body).map_err(|err| {
        GatewayError::Transport(format!("upstream returned an undecodable body: {err}"))
    })?;
    aggregate_record(&mut record, mode);
    let completion =
        ChatCompletion::from_upstream(&record, id.to_string(), unix_now_secs(), public_model);
    Ok(Json(completion).into_response())
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
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
    response
}
