use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};

use crate::context::OpContext;
use crate::errors::LockError;
use crate::locker::{LockFactory, Locker};

type Slots = Arc<DashMap<String, Arc<AsyncMutex<()>>>>;

/// In-process mutex for one key. Lockers built for the same key by the same
/// [`LocalLockFactory`] exclude each other.
pub struct LocalLocker {
    key: String,
    slots: Slots,
    mutex: Arc<AsyncMutex<()>>,
    guard: Mutex<Option<OwnedMutexGuard<()>>>,
    wait_timeout: Duration,
}

impl LocalLocker {
    fn new(key: &str, slots: Slots, mutex: Arc<AsyncMutex<()>>, wait_timeout: Duration) -> Self {
        Self {
            key: key.to_string(),
            slots,
            mutex,
            guard: Mutex::new(None),
            wait_timeout,
        }
    }

    fn keep(&self, guard: OwnedMutexGuard<()>) {
        *self.guard.lock() = Some(guard);
    }
}

#[async_trait]
impl Locker for LocalLocker {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&self, ctx: &OpContext) -> Result<(), LockError> {
        if ctx.is_cancelled() {
            return Err(LockError::cancelled(&self.key));
        }
        let started = Instant::now();
        let mut deadline = started + self.wait_timeout;
        if let Some(limit) = ctx.deadline() {
            deadline = deadline.min(limit);
        }
        let acquire = timeout_at(deadline, Arc::clone(&self.mutex).lock_owned());
        tokio::select! {
            _ = ctx.cancelled() => Err(LockError::cancelled(&self.key)),
            acquired = acquire => match acquired {
                Ok(guard) => {
                    self.keep(guard);
                    Ok(())
                }
                Err(_) => Err(LockError::timeout(&self.key, started.elapsed())),
            },
        }
    }

    async fn try_lock(&self) -> Result<(), LockError> {
        match Arc::clone(&self.mutex).try_lock_owned() {
            Ok(guard) => {
                self.keep(guard);
                Ok(())
            }
            Err(_) => Err(LockError::held(&self.key, Duration::ZERO)),
        }
    }

    async fn unlock(&self) -> Result<(), LockError> {
        match self.guard.lock().take() {
            Some(guard) => {
                drop(guard);
                Ok(())
            }
            None => Err(LockError::not_owned(&self.key)),
        }
    }
}

impl Drop for LocalLocker {
    fn drop(&mut self) {
        drop(self.guard.get_mut().take());
        // The registry entry goes with the last locker for its key.
        self.slots
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 2);
    }
}

/// Hands out [`LocalLocker`]s backed by a shared keyed registry.
#[derive(Clone)]
pub struct LocalLockFactory {
    slots: Slots,
    wait_timeout: Duration,
}

impl LocalLockFactory {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            wait_timeout,
        }
    }
}

impl Default for LocalLockFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl LockFactory for LocalLockFactory {
    fn locker(&self, key: &str) -> Arc<dyn Locker> {
        let mutex = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Arc::new(LocalLocker::new(
            key,
            Arc::clone(&self.slots),
            mutex,
            self.wait_timeout,
        ))
    }
}
