use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::routing::ModelRouter;
use crate::state::AppState;

const MODEL_CREATED_AT: u64 = 1_677_610_602;
const MODEL_OWNER: &str = "thinkgate";

/// List the public model ids in `OpenAI` format.
pub fn handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(models_response_body(&state.model_router))
}

fn models_response_body(router: &ModelRouter) -> Value {
    let data: Vec<Value> = router
        .public_ids()
        .iter()
        .map(|id| {
            json!({
                "id": id.as_ref(),
                "object": "model",
                "created": MODEL_CREATED_AT,
                "owned_by": MODEL_OWNER,
            })
        })
        .collect();
    json!({"object": "list", "data": data})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_lists_public_ids_in_config_order() {
        let config = AppConfig::default();
        let body = models_response_body(&ModelRouter::new(&config));
        assert_eq!(body["object"], "list");

        let data = body["data"].as_array().unwrap();
        let ids: Vec<&str> = data.iter().map(|m| m["id"].as_str().unwrap()).collect();
        let expected: Vec<&str> = config.models.routes.iter().map(|r| r.public.as_str()).collect();
        assert_eq!(ids, expected);
        for m in data {
            assert_eq!(m["object"], "model");
            assert_eq!(m["owned_by"], "thinkgate");
            assert_eq!(m["created"], 1_677_610_602);
        }
    }
}
