use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a short config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let features = &state.config.features;
    Json(json!({
        "status": "ok",
        "service": "thinkgate",
        "reasoning_display": features.show_reasoning,
        "thinking_mode": features.enable_thinking_mode,
        "routes": state.model_router.route_count(),
    }))
}
