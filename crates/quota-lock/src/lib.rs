//! Per-key mutual exclusion for quota accounting.
//!
//! [`DistributedMutex`] keeps a lease in the shared store, renews it while
//! held, and wakes waiters through a release notification instead of
//! polling. [`LocalLocker`] is the single-process substitute.

pub mod context;
pub mod distributed;
pub mod errors;
pub mod local;
pub mod locker;
pub mod options;

pub use context::OpContext;
pub use distributed::{DistributedLockFactory, DistributedMutex};
pub use errors::LockError;
pub use local::{LocalLockFactory, LocalLocker};
pub use locker::{LockFactory, Locker};
pub use options::LockOptions;
