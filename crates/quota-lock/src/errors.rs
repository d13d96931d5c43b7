use std::time::Duration;

use quota_errors::prelude::*;
use quota_store::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0:?}")]
pub struct LockError(pub Box<ErrorObj>);

impl LockError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn code(&self) -> ErrorCode {
        self.0.code
    }

    pub fn timeout(key: &str, waited: Duration) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::LOCK_TIMEOUT)
                .dev_msg(format!(
                    "lock '{key}' not acquired within {}ms",
                    waited.as_millis()
                ))
                .meta_kv("lock", json!(key))
                .build(),
        ))
    }

    pub fn cancelled(key: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::LOCK_TIMEOUT)
                .user_msg("The request was cancelled while waiting for a lock.")
                .dev_msg(format!("wait for lock '{key}' cancelled"))
                .meta_kv("lock", json!(key))
                .build(),
        ))
    }

    pub fn held(key: &str, remaining: Duration) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::LOCK_TIMEOUT)
                .dev_msg(format!("lock '{key}' is held by another owner"))
                .meta_kv("lock", json!(key))
                .meta_kv("remaining_ms", json!(remaining.as_millis() as u64))
                .build(),
        ))
    }

    pub fn not_owned(key: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::LOCK_NOT_OWNED)
                .dev_msg(format!("unlock of '{key}' which this owner does not hold"))
                .meta_kv("lock", json!(key))
                .build(),
        ))
    }
}

impl From<StoreError> for LockError {
    fn from(value: StoreError) -> Self {
        Self(value.0)
    }
}

impl From<ErrorObj> for LockError {
    fn from(value: ErrorObj) -> Self {
        Self(Box::new(value))
    }
}
