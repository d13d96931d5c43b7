use quota_errors::prelude::*;
use quota_lock::LockError;
use quota_store::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0:?}")]
pub struct QuotaError(pub Box<ErrorObj>);

impl QuotaError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn as_obj(&self) -> &ErrorObj {
        &self.0
    }

    pub fn code(&self) -> ErrorCode {
        self.0.code
    }

    pub fn insufficient(resource: &str, associated_id: &str, requested: u64) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_INSUFFICIENT)
                .user_msg(format!("Quota of resource '{resource}' is insufficient."))
                .dev_msg(format!(
                    "reserving {requested} of '{resource}' for '{associated_id}' exceeds quota"
                ))
                .meta_kv("resource", json!(resource))
                .meta_kv("associated_id", json!(associated_id))
                .meta_kv("requested", json!(requested))
                .build(),
        ))
    }

    pub fn data_abnormal(resource: &str, associated_id: &str, msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_DATA_ABNORMAL)
                .dev_msg(format!("{resource}/{associated_id}: {msg}"))
                .meta_kv("resource", json!(resource))
                .meta_kv("associated_id", json!(associated_id))
                .build(),
        ))
    }

    /// A data-abnormality error caused by `cause`, e.g. a failed resync.
    pub fn data_abnormal_from(
        resource: &str,
        associated_id: &str,
        msg: &str,
        cause: &QuotaError,
    ) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_DATA_ABNORMAL)
                .dev_msg(format!("{resource}/{associated_id}: {msg}"))
                .meta_kv("resource", json!(resource))
                .meta_kv("associated_id", json!(associated_id))
                .cause(cause.0.as_cause())
                .build(),
        ))
    }

    pub fn unavailable(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_SERVICE_UNAVAILABLE)
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn unregistered(name: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::QUOTA_RESOURCE_UNREGISTERED)
                .dev_msg(format!("resource '{name}' has no registered handler"))
                .meta_kv("resource", json!(name))
                .build(),
        ))
    }

    pub fn config(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::SCHEMA_VALIDATION)
                .user_msg("Quota engine is misconfigured.")
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn internal(msg: &str) -> Self {
        Self(Box::new(
            ErrorBuilder::new(codes::UNKNOWN_INTERNAL)
                .dev_msg(msg)
                .build(),
        ))
    }

    /// Keeps `self` as the reported error and lists `rest` after it.
    pub fn and_also(self, rest: Vec<QuotaError>) -> Self {
        let rest = rest.into_iter().map(QuotaError::into_inner).collect();
        Self(Box::new(self.into_inner().with_followups(rest)))
    }

    pub fn combine(errors: Vec<QuotaError>) -> Option<Self> {
        let mut iter = errors.into_iter();
        let head = iter.next()?;
        Some(head.and_also(iter.collect()))
    }

    /// `Ok(())` for no errors, otherwise the combined error.
    pub fn check(errors: Vec<QuotaError>) -> Result<(), Self> {
        match Self::combine(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<StoreError> for QuotaError {
    fn from(value: StoreError) -> Self {
        Self(value.0)
    }
}

impl From<LockError> for QuotaError {
    fn from(value: LockError) -> Self {
        Self(value.0)
    }
}

impl From<ErrorObj> for QuotaError {
    fn from(value: ErrorObj) -> Self {
        Self(Box::new(value))
    }
}
