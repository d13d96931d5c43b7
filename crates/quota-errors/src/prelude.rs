pub use crate::{
    class::{ErrorKind, RetryClass, Severity},
    code::{codes, spec_of, CodeSpec, ErrorCode, REGISTRY},
    model::{CauseEntry, ErrorBuilder, ErrorObj},
    render::{AuditErrorView, PublicErrorView},
};
