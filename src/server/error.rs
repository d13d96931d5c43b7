use axum::{
    extract::rejection::JsonRejection,
    http::header::RETRY_AFTER,
    response::{IntoResponse, Response},
    Json,
};
use quota_engine::QuotaError;
use quota_errors::mapping_http::{retry_after_secs, to_http_status};
use quota_errors::prelude::*;
use tracing::{error, warn};

/// Error body `{code, message, result}` with the status of its code.
#[derive(Debug)]
pub struct ApiError(ErrorObj);

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        Self(err.into_inner())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(
            ErrorBuilder::new(codes::SCHEMA_VALIDATION)
                .user_msg("Request body is not a list of sync targets.")
                .dev_msg(rejection.body_text())
                .build(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = to_http_status(&self.0);
        if status.is_server_error() {
            error!(error = ?self.0.to_audit(), "request failed");
        } else {
            warn!(error = ?self.0.to_audit(), "request rejected");
        }
        let body = Json(self.0.to_public());
        match retry_after_secs(&self.0) {
            Some(secs) => (status, [(RETRY_AFTER, secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}
