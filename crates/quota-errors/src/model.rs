use crate::{
    class::{ErrorKind, RetryClass, Severity},
    code::{spec_of, ErrorCode},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CauseEntry {
    pub code: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorObj {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_dev: Option<String>,
    pub http_status: u16,
    pub retryable: RetryClass,
    pub severity: Severity,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_chain: Option<Vec<CauseEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorObj {
    /// Summarises this error as one entry of another error's cause chain.
    pub fn as_cause(&self) -> CauseEntry {
        CauseEntry {
            code: self.code.0.to_string(),
            summary: self
                .message_dev
                .clone()
                .unwrap_or_else(|| self.message_user.clone()),
            meta: if self.meta.is_empty() {
                None
            } else {
                Some(self.meta.clone())
            },
        }
    }

    /// Folds several errors into one.
    ///
    /// The first error decides code, messages and meta; every error,
    /// including the first, is listed in the cause chain so none is lost.
    pub fn combine(errors: Vec<ErrorObj>) -> Option<ErrorObj> {
        let mut iter = errors.into_iter();
        let head = iter.next()?;
        Some(head.with_followups(iter.collect()))
    }

    /// [`ErrorObj::combine`] with `self` as the leading error.
    pub fn with_followups(mut self, rest: Vec<ErrorObj>) -> ErrorObj {
        if rest.is_empty() {
            return self;
        }
        let mut causes = vec![self.as_cause()];
        causes.extend(rest.iter().map(ErrorObj::as_cause));
        let dev = causes
            .iter()
            .map(|cause| format!("{}: {}", cause.code, cause.summary))
            .collect::<Vec<_>>()
            .join("; ");
        self.message_dev = Some(format!("{} errors: {dev}", causes.len()));
        self.cause_chain
            .get_or_insert_with(Vec::new)
            .extend(causes);
        self
    }
}

/// Starts from the registered defaults of a code; setters override them.
pub struct ErrorBuilder(ErrorObj);

impl ErrorBuilder {
    pub fn new(code: ErrorCode) -> Self {
        let spec = spec_of(code);
        Self(ErrorObj {
            code,
            kind: spec.kind,
            message_user: spec.default_user_msg.to_string(),
            message_dev: None,
            http_status: spec.http_status,
            retryable: spec.retryable,
            severity: spec.severity,
            meta: Map::new(),
            cause_chain: None,
            correlation_id: None,
        })
    }

    pub fn user_msg(mut self, message: impl Into<String>) -> Self {
        self.0.message_user = message.into();
        self
    }

    pub fn dev_msg(mut self, message: impl Into<String>) -> Self {
        self.0.message_dev = Some(message.into());
        self
    }

    pub fn meta_kv(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.meta.insert(key.into(), value);
        self
    }

    pub fn cause(mut self, cause: CauseEntry) -> Self {
        self.0.cause_chain.get_or_insert_with(Vec::new).push(cause);
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.0.correlation_id = Some(id.into());
        self
    }

    pub fn build(self) -> ErrorObj {
        self.0
    }
}
