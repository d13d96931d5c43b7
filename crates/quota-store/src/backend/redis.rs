#![cfg(feature = "redis")]

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::scripts;
use crate::config::RedisConfig;
use crate::errors::StoreError;
use crate::key::refreshed_key;
use crate::r#trait::{
    AccountingStore, LockBackend, QuotaRecord, ReleaseStream, ScriptOutcome,
};

#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|err| StoreError::unavailable(&format!("redis client: {err}")))?;
        let manager = tokio::time::timeout(
            config.connect_timeout,
            ConnectionManager::new(client.clone()),
        )
        .await
        .map_err(|_| {
            StoreError::unavailable(&format!(
                "redis connect: no answer within {:?}",
                config.connect_timeout
            ))
        })?
        .map_err(|err| StoreError::unavailable(&format!("redis connect: {err}")))?;
        debug!(url = %config.url, "redis connection manager ready");
        Ok(Self { client, manager })
    }
}

fn ttl_secs(ttl: Option<Duration>) -> u64 {
    ttl.map(|ttl| ttl.as_secs().max(1)).unwrap_or(0)
}

fn lease_ms(lease: Duration) -> u64 {
    (lease.as_millis().min(u128::from(u64::MAX)) as u64).max(1)
}

#[async_trait]
impl AccountingStore for RedisStore {
    async fn reserve(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError> {
        let mut conn = self.manager.clone();
        let code: i64 = scripts::RESERVE
            .key(key)
            .arg(num)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis reserve: {err}")))?;
        Ok(ScriptOutcome::from_code(code))
    }

    async fn rollback(
        &self,
        key: &str,
        num: u64,
        ttl: Option<Duration>,
    ) -> Result<ScriptOutcome, StoreError> {
        let mut conn = self.manager.clone();
        let code: i64 = scripts::ROLLBACK
            .key(key)
            .arg(num)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis rollback: {err}")))?;
        Ok(ScriptOutcome::from_code(code))
    }

    async fn sync(
        &self,
        key: &str,
        record: QuotaRecord,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        scripts::SYNC
            .key(key)
            .key(refreshed_key(key))
            .arg(record.used)
            .arg(record.quota)
            .arg(ttl_secs(ttl))
            .arg(Utc::now().timestamp_millis())
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis sync: {err}")))?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, StoreError> {
        let mut conn = self.manager.clone();
        let (used, quota): (Option<u64>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("used")
            .arg("quota")
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis hmget: {err}")))?;
        Ok(match (used, quota) {
            (Some(used), Some(quota)) => Some(QuotaRecord { used, quota }),
            _ => None,
        })
    }

    async fn refreshed_at(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.manager.clone();
        conn.get(refreshed_key(key))
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis get: {err}")))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(vec![key.to_string(), refreshed_key(key)])
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis del: {err}")))
    }
}

#[async_trait]
impl LockBackend for RedisStore {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.manager.clone();
        let remaining: i64 = scripts::LOCK_ACQUIRE
            .key(key)
            .arg(token)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis lock acquire: {err}")))?;
        if remaining == 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(remaining.max(1) as u64)))
        }
    }

    async fn renew(&self, key: &str, token: &str, lease: Duration) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let renewed: i64 = scripts::LOCK_RENEW
            .key(key)
            .arg(token)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis lock renew: {err}")))?;
        Ok(renewed == 1)
    }

    async fn release(&self, key: &str, token: &str, channel: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let released: i64 = scripts::LOCK_RELEASE
            .key(key)
            .arg(token)
            .arg(channel)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis lock release: {err}")))?;
        Ok(released == 1)
    }

    async fn subscribe(&self, channel: &str) -> Result<ReleaseStream, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis pubsub: {err}")))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|err| StoreError::unavailable(&format!("redis subscribe: {err}")))?;
        debug!(channel, "subscribed to lock releases");
        Ok(pubsub.into_on_message().map(|_| ()).boxed())
    }
}
