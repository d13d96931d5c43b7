use http::StatusCode;

use crate::model::ErrorObj;

/// Status registered for the error's code; unknown values map to 500.
pub fn to_http_status(err: &ErrorObj) -> StatusCode {
    StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// `Retry-After` hint in seconds for transient failures the caller can retry.
pub fn retry_after_secs(err: &ErrorObj) -> Option<u64> {
    if !err.retryable.is_retryable() {
        return None;
    }
    match to_http_status(err) {
        StatusCode::SERVICE_UNAVAILABLE => Some(5),
        StatusCode::CONFLICT => Some(1),
        _ => None,
    }
}
