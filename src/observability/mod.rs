use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::abort::RequestOutcome;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Identity of one chat request, carried until its outcome is logged.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: uuid::Uuid,
    pub public_model: String,
    pub upstream_model: String,
    pub stream: bool,
    pub started: Instant,
}

/// Log the terminal outcome of a request: info on success, warn on failure,
/// debug on client cancellation.
pub fn log_request_outcome(ctx: &RequestContext, outcome: RequestOutcome) {
    let elapsed_ms = ctx.started.elapsed().as_millis();
    match outcome {
        RequestOutcome::Completed => tracing::info!(
            request_id = %ctx.request_id,
            model = %ctx.public_model,
            upstream_model = %ctx.upstream_model,
            stream = ctx.stream,
            elapsed_ms,
            "chat request completed"
        ),
        RequestOutcome::Failed { status } => tracing::warn!(
            request_id = %ctx.request_id,
            model = %ctx.public_model,
            upstream_model = %ctx.upstream_model,
            stream = ctx.stream,
            status,
            elapsed_ms,
            "chat request failed"
        ),
        RequestOutcome::Cancelled => tracing::debug!(
            request_id = %ctx.request_id,
            model = %ctx.public_model,
            stream = ctx.stream,
            elapsed_ms,
            "chat request cancelled by client"
        ),
    }
}
