use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::config::ServiceConfig;
use crate::service::QuotaService;

pub struct CliContext {
    config: Arc<ServiceConfig>,
    config_path: PathBuf,
    service: OnceCell<Arc<QuotaService>>,
}

impl CliContext {
    pub fn new(config: ServiceConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            service: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Opens the store and builds the engine on first use.
    pub async fn service(&self) -> Result<Arc<QuotaService>> {
        self.service
            .get_or_try_init(|| async {
                QuotaService::from_config(self.config.as_ref().clone())
                    .await
                    .map(Arc::new)
            })
            .await
            .map(Arc::clone)
    }
}
