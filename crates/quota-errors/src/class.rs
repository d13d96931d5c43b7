//! Classification attached to every registered code.

use serde::{Deserialize, Serialize};

/// Which part of a reservation went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Accounting refused the request or found inconsistent figures.
    Quota,
    /// Request body or configuration did not validate.
    Schema,
    /// The shared store or a quota handler could not be reached.
    Provider,
    /// A lock wait ran out or was cancelled.
    Timeout,
    /// Lock ownership did not match.
    Conflict,
    /// A resource was used before it was registered.
    Precondition,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryClass {
    /// The same call may succeed later without changes.
    Transient,
    Permanent,
}

impl RetryClass {
    pub const fn is_retryable(self) -> bool {
        matches!(self, RetryClass::Transient)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
    Critical,
}

macro_rules! labels {
    ($ty:ty { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

labels!(ErrorKind {
    Quota => "Quota",
    Schema => "Schema",
    Provider => "Provider",
    Timeout => "Timeout",
    Conflict => "Conflict",
    Precondition => "Precondition",
    Unknown => "Unknown",
});

labels!(RetryClass {
    Transient => "transient",
    Permanent => "permanent",
});

labels!(Severity {
    Warn => "warn",
    Error => "error",
    Critical => "critical",
});
