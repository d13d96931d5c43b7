use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Result of an atomic accounting script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The record was updated.
    Ok,
    /// The update would break `0 <= used <= quota`; nothing changed.
    Fail,
    /// `used` or `quota` is missing from the record.
    Invalid,
}

impl ScriptOutcome {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ScriptOutcome::Ok,
            0 => ScriptOutcome::Fail,
            _ => ScriptOutcome::Invalid,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            ScriptOutcome::Ok => 1,
            ScriptOutcome::Fail => 0,
            ScriptOutcome::Invalid => -1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub used: u64,
    pub quota: u64,
}

/// Cached `used`/`quota` accounting. Every mutation is a single atomic step
/// on the store side.
#[async_trait]
pub trait AccountingStore: Send + Sync {
    /// Adds `num` to `used` if the result stays within `quota`. Sets `ttl`
    /// when the record has none.
    async fn reserve(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError>;

    /// Subtracts `num` from `used`, refusing to go below zero. Refreshes `ttl`.
    async fn rollback(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError>;

    /// Overwrites the record and stamps its refresh time.
    async fn sync(
        &self,
        key: &str,
        record: QuotaRecord,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, StoreError>;

    /// Last refresh time in milliseconds since the epoch.
    async fn refreshed_at(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One item per release notification on a channel.
pub type ReleaseStream = BoxStream<'static, ()>;

/// Lease-lock primitives. Ownership is proven by the caller's token.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Sets `key = token` with `lease` if absent. Returns `None` when the lock
    /// was taken, otherwise the remaining lease of the current holder.
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<Option<Duration>, StoreError>;

    /// Extends the lease only while `key` still holds `token`.
    async fn renew(&self, key: &str, token: &str, lease: Duration) -> Result<bool, StoreError>;

    /// Deletes `key` only while it holds `token`, then publishes on `channel`.
    async fn release(&self, key: &str, token: &str, channel: &str) -> Result<bool, StoreError>;

    async fn subscribe(&self, channel: &str) -> Result<ReleaseStream, StoreError>;
}

pub type AccountingHandle = Arc<dyn AccountingStore + 'static>;
pub type LockHandle = Arc<dyn LockBackend + 'static>;
