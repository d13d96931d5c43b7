use quota_errors::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0:?}")]
pub struct StoreError(pub Box<ErrorObj>);

impl StoreError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn unavailable(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_SERVICE_UNAVAILABLE)
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn schema(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::SCHEMA_VALIDATION)
                .user_msg("Store payload could not be decoded.")
                .dev_msg(msg)
                .build(),
        ))
    }
}

impl From<ErrorObj> for StoreError {
    fn from(value: ErrorObj) -> Self {
        Self(Box::new(value))
    }
}
