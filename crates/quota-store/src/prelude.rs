pub use crate::backend::memory::MemoryStore;
pub use crate::errors::StoreError;
pub use crate::key::{
    build_key, default_key_fn, lock_key, refreshed_key, release_channel, KeyFn, DEFAULT_PREFIX,
};
pub use crate::r#trait::{
    AccountingHandle, AccountingStore, LockBackend, LockHandle, QuotaRecord, ReleaseStream,
    ScriptOutcome,
};
#[cfg(feature = "redis")]
pub use crate::{backend::redis::RedisStore, config::RedisConfig};
