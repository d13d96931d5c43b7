use std::sync::Arc;
use std::time::Instant;

use quota_engine::ResourceQuotaManager;

use crate::service::QuotaService;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) service: Arc<QuotaService>,
    pub(crate) started_at: Instant,
}

impl ServeState {
    pub fn new(service: Arc<QuotaService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn manager(&self) -> &ResourceQuotaManager {
        self.service.manager()
    }

    pub(crate) fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
