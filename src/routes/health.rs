use axum::extract::State;
use axum::Json;

use crate::state::SharedState;

pub async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "clusters": state.config.locust_clusters.len(),
    }))
}
