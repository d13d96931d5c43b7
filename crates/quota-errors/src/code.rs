use crate::class::{ErrorKind, RetryClass, Severity};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // Known codes resolve to their static string; only foreign codes leak.
        match REGISTRY.get_key_value(s.as_str()) {
            Some((key, _)) => Ok(ErrorCode(*key)),
            None => Ok(ErrorCode(Box::leak(s.into_boxed_str()))),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CodeSpec {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub http_status: u16,
    pub retryable: RetryClass,
    pub severity: Severity,
    pub default_user_msg: &'static str,
}

macro_rules! code_table {
    ($($name:ident = $code:literal: $kind:ident, $status:literal, $retry:ident, $severity:ident, $msg:literal;)+) => {
        pub mod codes {
            use super::ErrorCode;

            $(pub const $name: ErrorCode = ErrorCode($code);)+
        }

        const TABLE: &[CodeSpec] = &[$(CodeSpec {
            code: codes::$name,
            kind: ErrorKind::$kind,
            http_status: $status,
            retryable: RetryClass::$retry,
            severity: Severity::$severity,
            default_user_msg: $msg,
        },)+];
    };
}

code_table! {
    // Accounting.
    QUOTA_INSUFFICIENT = "QUOTA.INSUFFICIENT":
        Quota, 400, Permanent, Warn, "Quota is insufficient for this request.";
    QUOTA_DATA_ABNORMAL = "QUOTA.DATA_ABNORMAL":
        Quota, 500, Transient, Error, "Quota data is abnormal. Please retry later.";
    QUOTA_SERVICE_UNAVAILABLE = "QUOTA.SERVICE_UNAVAILABLE":
        Provider, 503, Transient, Error, "Quota service is unavailable. Please retry later.";
    QUOTA_RESOURCE_UNREGISTERED = "QUOTA.RESOURCE_UNREGISTERED":
        Precondition, 500, Permanent, Critical, "Quota resource is not configured.";
    // Locking.
    LOCK_TIMEOUT = "LOCK.TIMEOUT":
        Timeout, 409, Transient, Warn, "The resource is currently locked. Please retry.";
    LOCK_NOT_OWNED = "LOCK.NOT_OWNED":
        Conflict, 409, Permanent, Error, "The lock is not held by this owner.";
    // Everything else.
    SCHEMA_VALIDATION = "SCHEMA.VALIDATION_FAILED":
        Schema, 422, Permanent, Warn, "Your request is invalid. Please check inputs.";
    UNKNOWN_INTERNAL = "UNKNOWN.INTERNAL":
        Unknown, 500, Transient, Critical, "Internal error. Please retry later.";
}

/// Every registered code keyed by its string form. Registering the same
/// code twice panics on first access.
pub static REGISTRY: Lazy<HashMap<&'static str, CodeSpec>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(TABLE.len());
    for spec in TABLE {
        if map.insert(spec.code.0, *spec).is_some() {
            panic!("duplicate error code: {}", spec.code.0);
        }
    }
    map
});

/// Looks up the registered spec, falling back to `UNKNOWN.INTERNAL` for
/// codes that were deserialized from a foreign source.
pub fn spec_of(code: ErrorCode) -> &'static CodeSpec {
    REGISTRY.get(code.0).unwrap_or(&UNKNOWN)
}

// UNKNOWN.INTERNAL is the last row of the table.
static UNKNOWN: CodeSpec = TABLE[TABLE.len() - 1];
