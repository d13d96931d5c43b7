//! Service configuration
//!
//! Loaded from YAML; every field has a default so an empty file (or no file
//! at all) yields a runnable in-memory service.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::time::Duration;

use quota_lock::LockOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const REDIS_URL_ENV: &str = "QUOTAD_REDIS_URL";
pub const BIND_ENV: &str = "QUOTAD_BIND";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("lock.lease_ms must be greater than zero")]
    ZeroLease,
    #[error("lock.wait_timeout_ms must be greater than zero")]
    ZeroWaitTimeout,
    #[error("resource names must not be empty")]
    EmptyResourceName,
    #[error("resource '{0}' is configured more than once")]
    DuplicateResource(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub accounting: AccountingConfig,
    /// Accounts for which quota is never enforced.
    pub exempt_accounts: Vec<String>,
    pub resources: Vec<ResourceConfig>,
    pub server: ServerConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: quota_store::DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub lease_ms: u64,
    pub wait_timeout_ms: u64,
    pub owner_prefix: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: 10_000,
            wait_timeout_ms: 5_000,
            owner_prefix: None,
        }
    }
}

impl LockConfig {
    pub fn options(&self) -> LockOptions {
        let owner_prefix = self
            .owner_prefix
            .clone()
            .unwrap_or_else(|| format!("quotad-{}", std::process::id()));
        LockOptions::default()
            .with_lease(Duration::from_millis(self.lease_ms))
            .with_wait_timeout(Duration::from_millis(self.wait_timeout_ms))
            .with_owner_prefix(owner_prefix)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// TTL of cached records; 0 keeps them forever.
    pub record_ttl_secs: u64,
    /// Records older than this are due for a refresh.
    pub refresh_interval_secs: u64,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            record_ttl_secs: 86_400,
            refresh_interval_secs: 3_600,
        }
    }
}

impl AccountingConfig {
    pub fn record_ttl(&self) -> Option<Duration> {
        (self.record_ttl_secs > 0).then(|| Duration::from_secs(self.record_ttl_secs))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub name: String,
    pub default_quota: u64,
    pub accounts: BTreeMap<String, AccountFigures>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountFigures {
    pub quota: u64,
    pub used: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8790".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Applies `QUOTAD_REDIS_URL` and `QUOTAD_BIND` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(REDIS_URL_ENV) {
            if !url.trim().is_empty() {
                self.store.redis_url = url;
                self.store.backend = StoreBackend::Redis;
            }
        }
        if let Ok(bind) = env::var(BIND_ENV) {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.lease_ms == 0 {
            return Err(ConfigError::ZeroLease);
        }
        if self.lock.wait_timeout_ms == 0 {
            return Err(ConfigError::ZeroWaitTimeout);
        }
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                return Err(ConfigError::EmptyResourceName);
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(ConfigError::DuplicateResource(resource.name.clone()));
            }
        }
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|resource| resource.name == name)
    }
}
