pub mod backend;
pub mod config;
pub mod errors;
pub mod key;
pub mod prelude;
pub mod r#trait;

pub use backend::memory::MemoryStore;
#[cfg(feature = "redis")]
pub use backend::redis::RedisStore;
#[cfg(feature = "redis")]
pub use config::RedisConfig;
pub use errors::StoreError;
pub use key::{
    build_key, default_key_fn, lock_key, refreshed_key, release_channel, KeyFn, DEFAULT_PREFIX,
};
pub use r#trait::{
    AccountingHandle, AccountingStore, LockBackend, LockHandle, QuotaRecord, ReleaseStream,
    ScriptOutcome,
};
