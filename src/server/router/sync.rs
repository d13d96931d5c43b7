use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use quota_engine::SyncTarget;
use quota_lock::OpContext;
use tracing::info;

use crate::server::{ApiError, ServeState};

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/v1/quota/sync", post(sync_handler))
}

async fn sync_handler(
    State(state): State<ServeState>,
    payload: Result<Json<Vec<SyncTarget>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(targets) = payload?;
    let ctx = OpContext::new();
    state.manager().sync(&ctx, &targets).await?;
    info!(targets = targets.len(), "forced sync served");
    Ok(StatusCode::NO_CONTENT)
}
