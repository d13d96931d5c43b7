use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use quota_store::{release_channel, LockHandle, ReleaseStream};
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::OpContext;
use crate::errors::LockError;
use crate::locker::{LockFactory, Locker};
use crate::options::LockOptions;

struct Lease {
    token: String,
    renewal: CancellationToken,
}

/// Lease lock on one store key.
///
/// Waiters subscribe to the key's release channel and retry when either a
/// release is announced or the holder's lease runs out, so a holder that
/// died without unlocking delays them by at most one lease.
pub struct DistributedMutex {
    backend: LockHandle,
    key: String,
    channel: String,
    options: LockOptions,
    held: Mutex<Option<Lease>>,
}

impl DistributedMutex {
    pub fn new(backend: LockHandle, key: impl Into<String>, options: LockOptions) -> Self {
        let key = key.into();
        Self {
            channel: release_channel(&key),
            backend,
            key,
            options,
            held: Mutex::new(None),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.lock().is_some()
    }

    fn hold(&self, token: String) {
        let renewal = self.spawn_renewal(token.clone());
        let previous = self.held.lock().replace(Lease { token, renewal });
        if let Some(previous) = previous {
            previous.renewal.cancel();
        }
    }

    /// Extends the lease every third of its length until stopped or until
    /// the store no longer shows this token as the holder.
    fn spawn_renewal(&self, token: String) -> CancellationToken {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let backend = Arc::clone(&self.backend);
        let key = self.key.clone();
        let lease = self.options.lease;
        let every = self.options.renew_interval();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        match backend.renew(&key, &token, lease).await {
                            Ok(true) => debug!(key = %key, "lock lease renewed"),
                            Ok(false) => {
                                debug!(key = %key, "lock no longer owned; renewal stopped");
                                break;
                            }
                            Err(err) => {
                                warn!(key = %key, error = ?err, "lock renewal failed; renewal stopped");
                                break;
                            }
                        }
                    }
                }
            }
        });

        stop
    }

    fn wait_deadline(&self, started: Instant, ctx: &OpContext) -> Instant {
        let window = started + self.options.wait_timeout;
        match ctx.deadline() {
            Some(deadline) => window.min(deadline),
            None => window,
        }
    }
}

#[async_trait]
impl Locker for DistributedMutex {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&self, ctx: &OpContext) -> Result<(), LockError> {
        let token = self.options.new_token();
        let started = Instant::now();
        let deadline = self.wait_deadline(started, ctx);
        let mut releases: Option<ReleaseStream> = None;

        loop {
            if ctx.is_cancelled() {
                return Err(LockError::cancelled(&self.key));
            }
            let remaining = match self
                .backend
                .try_acquire(&self.key, &token, self.options.lease)
                .await?
            {
                None => {
                    debug!(
                        key = %self.key,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "lock acquired"
                    );
                    self.hold(token);
                    return Ok(());
                }
                Some(remaining) => remaining,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::timeout(&self.key, now - started));
            }

            if releases.is_none() {
                releases = Some(self.backend.subscribe(&self.channel).await?);
                // A release between the attempt and the subscription is not
                // delivered, so try again before waiting.
                continue;
            }
            let Some(stream) = releases.as_mut() else {
                continue;
            };

            let wait = remaining.min(deadline - now);
            debug!(
                key = %self.key,
                wait_ms = wait.as_millis() as u64,
                "lock held elsewhere; waiting for release"
            );
            let closed = tokio::select! {
                _ = ctx.cancelled() => return Err(LockError::cancelled(&self.key)),
                _ = sleep(wait) => false,
                notice = stream.next() => notice.is_none(),
            };
            if closed {
                releases = None;
            }
        }
    }

    async fn try_lock(&self) -> Result<(), LockError> {
        let token = self.options.new_token();
        match self
            .backend
            .try_acquire(&self.key, &token, self.options.lease)
            .await?
        {
            None => {
                self.hold(token);
                Ok(())
            }
            Some(remaining) => Err(LockError::held(&self.key, remaining)),
        }
    }

    async fn unlock(&self) -> Result<(), LockError> {
        let lease = self.held.lock().take();
        let Some(lease) = lease else {
            return Err(LockError::not_owned(&self.key));
        };
        lease.renewal.cancel();
        if self
            .backend
            .release(&self.key, &lease.token, &self.channel)
            .await?
        {
            debug!(key = %self.key, "lock released");
            Ok(())
        } else {
            Err(LockError::not_owned(&self.key))
        }
    }
}

impl Drop for DistributedMutex {
    fn drop(&mut self) {
        // The lease then lapses on its own.
        if let Some(lease) = self.held.get_mut().take() {
            lease.renewal.cancel();
        }
    }
}

/// Builds a [`DistributedMutex`] per key over one shared backend.
#[derive(Clone)]
pub struct DistributedLockFactory {
    backend: LockHandle,
    options: LockOptions,
}

impl DistributedLockFactory {
    pub fn new(backend: LockHandle, options: LockOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }
}

impl LockFactory for DistributedLockFactory {
    fn locker(&self, key: &str) -> Arc<dyn Locker> {
        Arc::new(DistributedMutex::new(
            Arc::clone(&self.backend),
            key,
            self.options.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_store::{LockBackend, MemoryStore};
    use std::time::Duration;

    fn options() -> LockOptions {
        LockOptions::default()
            .with_lease(Duration::from_millis(300))
            .with_wait_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn unlock_without_lock_is_not_owned() {
        let store = MemoryStore::new();
        let mutex = DistributedMutex::new(Arc::new(store), "k", options());
        let err = mutex.unlock().await.unwrap_err();
        assert_eq!(err.code(), quota_errors::code::codes::LOCK_NOT_OWNED);
    }

    #[tokio::test]
    async fn try_lock_reports_remaining_lease() {
        let store = MemoryStore::new();
        let first = DistributedMutex::new(Arc::new(store.clone()), "k", options());
        let second = DistributedMutex::new(Arc::new(store.clone()), "k", options());
        first.try_lock().await.unwrap();
        let err = second.try_lock().await.unwrap_err().into_inner();
        assert_eq!(err.code, quota_errors::code::codes::LOCK_TIMEOUT);
        assert!(err.meta.contains_key("remaining_ms"));
        first.unlock().await.unwrap();
        second.try_lock().await.unwrap();
        second.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn renewal_keeps_lease_alive() {
        let store = MemoryStore::new();
        let mutex = DistributedMutex::new(Arc::new(store.clone()), "k", options());
        mutex.lock(&OpContext::new()).await.unwrap();
        sleep(Duration::from_millis(800)).await;
        assert!(store.lock_owner("k").is_some());
        mutex.unlock().await.unwrap();
        assert!(store.lock_owner("k").is_none());
    }

    #[tokio::test]
    async fn renewal_stops_once_another_owner_holds_the_key() {
        let store = MemoryStore::new();
        let mutex = DistributedMutex::new(Arc::new(store.clone()), "k", options());
        mutex.lock(&OpContext::new()).await.unwrap();
        let token = mutex
            .held
            .lock()
            .as_ref()
            .map(|lease| lease.token.clone())
            .unwrap();

        store.expire_lock("k");
        let lease = Duration::from_millis(300);
        assert_eq!(store.try_acquire("k", "other", lease).await.unwrap(), None);

        // The other owner's lease runs its course untouched.
        sleep(Duration::from_millis(200)).await;
        assert_eq!(store.lock_owner("k").as_deref(), Some("other"));
        sleep(Duration::from_millis(150)).await;
        assert!(store.lock_owner("k").is_none());

        // The renewal task is gone: a lease under the old token now lapses too.
        let short = Duration::from_millis(150);
        assert_eq!(store.try_acquire("k", &token, short).await.unwrap(), None);
        sleep(Duration::from_millis(400)).await;
        assert!(store.lock_owner("k").is_none());
    }

    #[tokio::test]
    async fn dropped_holder_lets_lease_lapse() {
        let store = MemoryStore::new();
        {
            let mutex = DistributedMutex::new(Arc::new(store.clone()), "k", options());
            mutex.lock(&OpContext::new()).await.unwrap();
        }
        let waiter = DistributedMutex::new(Arc::new(store.clone()), "k", options());
        let started = Instant::now();
        waiter.lock(&OpContext::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        waiter.unlock().await.unwrap();
    }
}
