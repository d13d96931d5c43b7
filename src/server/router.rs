use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

mod sync;

use super::state::ServeState;

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(sync::router())
        .with_state(state)
}

async fn health_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "resources": state.manager().resources().count(),
        "uptime_secs": state.uptime_secs(),
    }))
}
