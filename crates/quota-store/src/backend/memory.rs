//! Single-process store. Each operation runs under one mutex, which gives
//! it the same all-or-nothing behaviour the Redis scripts have.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::errors::StoreError;
use crate::key::refreshed_key;
use crate::r#trait::{
    AccountingStore, LockBackend, QuotaRecord, ReleaseStream, ScriptOutcome,
};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Debug)]
struct Slot<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Slot<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Hash fields of an accounting record. Either may be absent when the
/// record was written partially or evicted field by field.
#[derive(Clone, Copy, Debug, Default)]
struct Fields {
    used: Option<u64>,
    quota: Option<u64>,
}

#[derive(Default)]
struct Inner {
    records: Mutex<HashMap<String, Slot<Fields>>>,
    stamps: Mutex<HashMap<String, Slot<i64>>>,
    locks: Mutex<HashMap<String, Slot<String>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<()>>>,
    offline: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the store were unreachable.
    pub fn set_available(&self, available: bool) {
        self.inner.offline.store(!available, Ordering::SeqCst);
    }

    /// Writes raw fields, leaving out whichever is `None`.
    pub fn put_fields(&self, key: &str, used: Option<u64>, quota: Option<u64>) {
        self.inner
            .records
            .lock()
            .insert(key.to_string(), Slot::new(Fields { used, quota }, None));
    }

    /// Current holder token of a lock key, if the lease is still live.
    pub fn lock_owner(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.inner
            .locks
            .lock()
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    /// Ends the current lease on a lock key as if it had run out.
    pub fn expire_lock(&self, key: &str) {
        if let Some(slot) = self.inner.locks.lock().get_mut(key) {
            slot.expires_at = Some(Instant::now());
        }
    }

    /// Remaining TTL of a record, `None` when it has no expiry or is absent.
    pub fn record_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.inner
            .records
            .lock()
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store is offline"))
        } else {
            Ok(())
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<()> {
        self.inner
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Wakes the current subscribers of `channel`. A channel is dropped once
    /// a release finds nobody listening, so the map only holds channels that
    /// had a subscriber since their last release.
    fn notify(&self, channel: &str) {
        let mut channels = self.inner.channels.lock();
        if let Some(sender) = channels.get(channel) {
            // No receivers is not an error: nobody is waiting.
            let _ = sender.send(());
            if sender.receiver_count() == 0 {
                channels.remove(channel);
            }
        }
    }
}

#[async_trait]
impl AccountingStore for MemoryStore {
    async fn reserve(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut records = self.inner.records.lock();
        let Some(slot) = records.get_mut(key).filter(|slot| slot.is_live(now)) else {
            return Ok(ScriptOutcome::Invalid);
        };
        let (Some(used), Some(quota)) = (slot.value.used, slot.value.quota) else {
            return Ok(ScriptOutcome::Invalid);
        };
        if used.saturating_add(num) > quota {
            return Ok(ScriptOutcome::Fail);
        }
        slot.value.used = Some(used + num);
        if slot.expires_at.is_none() {
            slot.expires_at = ttl.map(|ttl| now + ttl);
        }
        Ok(ScriptOutcome::Ok)
    }

    async fn rollback(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut records = self.inner.records.lock();
        let Some(slot) = records.get_mut(key).filter(|slot| slot.is_live(now)) else {
            return Ok(ScriptOutcome::Invalid);
        };
        let (Some(used), Some(_)) = (slot.value.used, slot.value.quota) else {
            return Ok(ScriptOutcome::Invalid);
        };
        let Some(remaining) = used.checked_sub(num) else {
            return Ok(ScriptOutcome::Fail);
        };
        slot.value.used = Some(remaining);
        if let Some(ttl) = ttl {
            slot.expires_at = Some(now + ttl);
        }
        Ok(ScriptOutcome::Ok)
    }

    async fn sync(
        &self,
        key: &str,
        record: QuotaRecord,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let fields = Fields {
            used: Some(record.used),
            quota: Some(record.quota),
        };
        self.inner
            .records
            .lock()
            .insert(key.to_string(), Slot::new(fields, ttl));
        self.inner.stamps.lock().insert(
            refreshed_key(key),
            Slot::new(Utc::now().timestamp_millis(), ttl),
        );
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let records = self.inner.records.lock();
        Ok(records
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| match (slot.value.used, slot.value.quota) {
                (Some(used), Some(quota)) => Some(QuotaRecord { used, quota }),
                _ => None,
            }))
    }

    async fn refreshed_at(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        Ok(self
            .inner
            .stamps
            .lock()
            .get(&refreshed_key(key))
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.inner.records.lock().remove(key);
        self.inner.stamps.lock().remove(&refreshed_key(key));
        Ok(())
    }
}

#[async_trait]
impl LockBackend for MemoryStore {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<Option<Duration>, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut locks = self.inner.locks.lock();
        if let Some(slot) = locks.get(key).filter(|slot| slot.is_live(now)) {
            let remaining = slot
                .expires_at
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(lease);
            // A zero remaining lease would be read as "acquired".
            return Ok(Some(remaining.max(Duration::from_millis(1))));
        }
        locks.insert(key.to_string(), Slot::new(token.to_string(), Some(lease)));
        Ok(None)
    }

    async fn renew(&self, key: &str, token: &str, lease: Duration) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut locks = self.inner.locks.lock();
        match locks.get_mut(key) {
            Some(slot) if slot.is_live(now) && slot.value == token => {
                slot.expires_at = Some(now + lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &str, channel: &str) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let owned = {
            let mut locks = self.inner.locks.lock();
            match locks.get(key) {
                Some(slot) if slot.is_live(now) && slot.value == token => {
                    locks.remove(key);
                    true
                }
                _ => false,
            }
        };
        if owned {
            self.notify(channel);
        }
        Ok(owned)
    }

    async fn subscribe(&self, channel: &str) -> Result<ReleaseStream, StoreError> {
        self.ensure_online()?;
        let receiver = self.sender(channel).subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => Some(((), receiver)),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_respects_quota() {
        let store = MemoryStore::new();
        store
            .sync("k", QuotaRecord { used: 1, quota: 4 }, None)
            .await
            .unwrap();
        assert_eq!(store.reserve("k", 3, None).await.unwrap(), ScriptOutcome::Ok);
        assert_eq!(store.reserve("k", 1, None).await.unwrap(), ScriptOutcome::Fail);
        assert_eq!(
            store.load("k").await.unwrap(),
            Some(QuotaRecord { used: 4, quota: 4 })
        );
    }

    #[tokio::test]
    async fn reserve_sets_ttl_only_when_unset() {
        let store = MemoryStore::new();
        store.put_fields("k", Some(0), Some(10));
        assert!(store.record_ttl("k").is_none());
        store
            .reserve("k", 1, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let ttl = store.record_ttl("k").unwrap();
        assert!(ttl > Duration::from_secs(50));
        store
            .reserve("k", 1, Some(Duration::from_secs(600)))
            .await
            .unwrap();
        assert!(store.record_ttl("k").unwrap() <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn missing_field_is_invalid() {
        let store = MemoryStore::new();
        assert_eq!(
            store.reserve("absent", 1, None).await.unwrap(),
            ScriptOutcome::Invalid
        );
        store.put_fields("partial", Some(1), None);
        assert_eq!(
            store.reserve("partial", 1, None).await.unwrap(),
            ScriptOutcome::Invalid
        );
        assert_eq!(
            store.rollback("partial", 1, None).await.unwrap(),
            ScriptOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn rollback_never_goes_negative() {
        let store = MemoryStore::new();
        store.put_fields("k", Some(1), Some(4));
        assert_eq!(store.rollback("k", 2, None).await.unwrap(), ScriptOutcome::Fail);
        assert_eq!(store.rollback("k", 1, None).await.unwrap(), ScriptOutcome::Ok);
        assert_eq!(
            store.load("k").await.unwrap(),
            Some(QuotaRecord { used: 0, quota: 4 })
        );
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.reserve("k", 1, None).await.is_err());
        assert!(store
            .try_acquire("lock", "t", Duration::from_secs(1))
            .await
            .is_err());
        store.set_available(true);
        assert!(store.reserve("k", 1, None).await.is_ok());
    }

    #[tokio::test]
    async fn lock_release_requires_owner_and_notifies() {
        let store = MemoryStore::new();
        let lease = Duration::from_secs(5);
        assert_eq!(store.try_acquire("lock", "a", lease).await.unwrap(), None);
        let remaining = store.try_acquire("lock", "b", lease).await.unwrap();
        assert!(remaining.unwrap() <= lease);

        let mut releases = store.subscribe("chan").await.unwrap();
        assert!(!store.release("lock", "b", "chan").await.unwrap());
        assert!(!store.renew("lock", "b", lease).await.unwrap());
        assert!(store.renew("lock", "a", lease).await.unwrap());
        assert!(store.release("lock", "a", "chan").await.unwrap());
        assert_eq!(releases.next().await, Some(()));
        assert!(store.lock_owner("lock").is_none());
    }

    #[tokio::test]
    async fn release_channels_are_dropped_once_unwatched() {
        let store = MemoryStore::new();
        let lease = Duration::from_secs(5);
        let releases = store.subscribe("chan").await.unwrap();

        store.try_acquire("lock", "a", lease).await.unwrap();
        assert!(store.release("lock", "a", "chan").await.unwrap());
        assert_eq!(store.inner.channels.lock().len(), 1);

        drop(releases);
        store.try_acquire("lock", "a", lease).await.unwrap();
        assert!(store.release("lock", "a", "chan").await.unwrap());
        assert!(store.inner.channels.lock().is_empty());

        // Releasing with nobody subscribed never creates a channel.
        store.try_acquire("other", "b", lease).await.unwrap();
        assert!(store.release("other", "b", "other:released").await.unwrap());
        assert!(store.inner.channels.lock().is_empty());
    }
}
