use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use quota_lock::OpContext;
use quota_store::QuotaRecord;

use crate::errors::QuotaError;

/// Ground truth for one resource: how much an account has and uses.
#[async_trait]
pub trait UsedQuotaHandler: Send + Sync {
    async fn query_used(&self, ctx: &OpContext, associated_id: &str) -> Result<u64, QuotaError>;

    async fn query_quota(&self, ctx: &OpContext, associated_id: &str)
        -> Result<u64, QuotaError>;
}

pub type HandlerRef = Arc<dyn UsedQuotaHandler>;

/// Answers from figures held in memory: a default quota, and per-account
/// overrides seeded from configuration or set at runtime.
#[derive(Default)]
pub struct StaticQuotaHandler {
    default_quota: u64,
    figures: DashMap<String, QuotaRecord>,
}

impl StaticQuotaHandler {
    pub fn new(default_quota: u64) -> Self {
        Self {
            default_quota,
            figures: DashMap::new(),
        }
    }

    pub fn with_figures(self, associated_id: impl Into<String>, used: u64, quota: u64) -> Self {
        self.set_figures(associated_id, used, quota);
        self
    }

    pub fn set_figures(&self, associated_id: impl Into<String>, used: u64, quota: u64) {
        self.figures
            .insert(associated_id.into(), QuotaRecord { used, quota });
    }

    pub fn set_used(&self, associated_id: &str, used: u64) {
        let quota = self.figure(associated_id).quota;
        self.set_figures(associated_id, used, quota);
    }

    fn figure(&self, associated_id: &str) -> QuotaRecord {
        self.figures
            .get(associated_id)
            .map(|entry| *entry.value())
            .unwrap_or(QuotaRecord {
                used: 0,
                quota: self.default_quota,
            })
    }
}

#[async_trait]
impl UsedQuotaHandler for StaticQuotaHandler {
    async fn query_used(&self, _ctx: &OpContext, associated_id: &str) -> Result<u64, QuotaError> {
        Ok(self.figure(associated_id).used)
    }

    async fn query_quota(
        &self,
        _ctx: &OpContext,
        associated_id: &str,
    ) -> Result<u64, QuotaError> {
        Ok(self.figure(associated_id).quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_account_gets_default_quota() {
        let handler = StaticQuotaHandler::new(8).with_figures("acctA", 3, 4);
        let ctx = OpContext::new();
        assert_eq!(handler.query_quota(&ctx, "acctA").await.unwrap(), 4);
        assert_eq!(handler.query_used(&ctx, "acctA").await.unwrap(), 3);
        assert_eq!(handler.query_quota(&ctx, "acctB").await.unwrap(), 8);
        assert_eq!(handler.query_used(&ctx, "acctB").await.unwrap(), 0);

        handler.set_used("acctB", 5);
        assert_eq!(handler.query_used(&ctx, "acctB").await.unwrap(), 5);
        assert_eq!(handler.query_quota(&ctx, "acctB").await.unwrap(), 8);
    }
}
