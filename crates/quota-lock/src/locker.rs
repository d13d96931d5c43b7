use std::sync::Arc;

use async_trait::async_trait;

use crate::context::OpContext;
use crate::errors::LockError;

#[async_trait]
pub trait Locker: Send + Sync {
    fn key(&self) -> &str;

    /// Blocks until the lock is held, the wait window closes, or `ctx` ends.
    async fn lock(&self, ctx: &OpContext) -> Result<(), LockError>;

    /// One acquisition attempt.
    async fn try_lock(&self) -> Result<(), LockError>;

    async fn unlock(&self) -> Result<(), LockError>;
}

pub trait LockFactory: Send + Sync {
    fn locker(&self, key: &str) -> Arc<dyn Locker>;
}
