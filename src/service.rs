//! Wires configuration into a ready-to-use quota engine.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use quota_engine::prelude::*;
use quota_lock::DistributedLockFactory;
use quota_store::{default_key_fn, AccountingHandle, AccountingStore, LockHandle, MemoryStore};
use serde::Serialize;
use tracing::info;

use crate::config::{ServiceConfig, StoreBackend, StoreConfig};

/// Engine plus the pieces the CLI and HTTP layer inspect directly.
pub struct QuotaService {
    config: ServiceConfig,
    manager: Arc<ResourceQuotaManager>,
    accounting: AccountingHandle,
    handlers: HashMap<String, Arc<StaticQuotaHandler>>,
}

/// Cached view of one accounting record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub resource: String,
    pub associated_id: String,
    pub key: String,
    pub used: Option<u64>,
    pub quota: Option<u64>,
    pub refreshed_at: Option<String>,
}

impl QuotaService {
    /// Validates `config`, opens the configured store and builds the engine.
    pub async fn from_config(config: ServiceConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let (accounting, locks) = open_store(&config.store).await?;
        Self::from_parts(config, accounting, locks)
    }

    /// Builds the engine over an already opened store.
    pub fn from_parts(
        config: ServiceConfig,
        accounting: AccountingHandle,
        locks: LockHandle,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let mut handlers = HashMap::new();
        let mut builder = ResourceQuotaManager::builder()
            .key_fn(default_key_fn(config.store.key_prefix.clone()))
            .lock_factory(Arc::new(DistributedLockFactory::new(
                locks,
                config.lock.options(),
            )))
            .finisher_factory(Arc::new(StoreFinisherFactory::new(
                Arc::clone(&accounting),
                config.accounting.record_ttl(),
            )));
        if !config.exempt_accounts.is_empty() {
            builder = builder.enablement(Arc::new(ExemptAccounts::new(
                config.exempt_accounts.iter().cloned(),
            )));
        }
        for resource in &config.resources {
            let handler = Arc::new(StaticQuotaHandler::new(resource.default_quota));
            for (account, figures) in &resource.accounts {
                handler.set_figures(account.clone(), figures.used, figures.quota);
            }
            builder = builder.register(resource.name.clone(), handler.clone());
            handlers.insert(resource.name.clone(), handler);
        }
        let manager = builder.build()?;
        info!(
            resources = handlers.len(),
            backend = ?config.store.backend,
            "quota engine ready"
        );

        Ok(Self {
            config,
            manager: Arc::new(manager),
            accounting,
            handlers,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ResourceQuotaManager> {
        &self.manager
    }

    /// Ground-truth handler of a configured resource.
    pub fn handler(&self, resource: &str) -> Option<&Arc<StaticQuotaHandler>> {
        self.handlers.get(resource)
    }

    /// Every `(resource, account)` pair named in the configuration.
    pub fn configured_targets(&self) -> Vec<SyncTarget> {
        self.config
            .resources
            .iter()
            .flat_map(|resource| {
                resource
                    .accounts
                    .keys()
                    .map(|account| SyncTarget::new(account.clone(), resource.name.clone()))
            })
            .collect()
    }

    pub async fn inspect(
        &self,
        resource: &str,
        associated_id: &str,
    ) -> Result<RecordView, QuotaError> {
        if !self.manager.is_registered(resource) {
            return Err(QuotaError::unregistered(resource));
        }
        let key = self.manager.record_key(resource, associated_id);
        let record = self.accounting.load(&key).await?;
        let refreshed_at = self
            .accounting
            .refreshed_at(&key)
            .await?
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|at| at.to_rfc3339());
        Ok(RecordView {
            resource: resource.to_string(),
            associated_id: associated_id.to_string(),
            key,
            used: record.map(|record| record.used),
            quota: record.map(|record| record.quota),
            refreshed_at,
        })
    }
}

async fn open_store(config: &StoreConfig) -> Result<(AccountingHandle, LockHandle)> {
    match config.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        StoreBackend::Redis => open_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis(config: &StoreConfig) -> Result<(AccountingHandle, LockHandle)> {
    use quota_store::{RedisConfig, RedisStore};

    let store = RedisStore::connect(RedisConfig::new(config.redis_url.clone()))
        .await
        .with_context(|| format!("connecting to {}", config.redis_url))?;
    info!(url = %config.redis_url, "connected to redis");
    Ok((Arc::new(store.clone()), Arc::new(store)))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_config: &StoreConfig) -> Result<(AccountingHandle, LockHandle)> {
    anyhow::bail!("store.backend is redis but quotad was built without the `redis` feature")
}
