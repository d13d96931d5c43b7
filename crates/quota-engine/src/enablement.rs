use std::collections::HashSet;

use async_trait::async_trait;
use quota_lock::OpContext;

use crate::errors::QuotaError;

/// Decides whether quota is enforced for a request's accounts. Errors
/// propagate to the caller; they never switch enforcement on or off.
#[async_trait]
pub trait QuotaEnablement: Send + Sync {
    async fn is_enabled(&self, ctx: &OpContext, accounts: &[String]) -> Result<bool, QuotaError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysEnforced;

#[async_trait]
impl QuotaEnablement for AlwaysEnforced {
    async fn is_enabled(&self, _ctx: &OpContext, _accounts: &[String]) -> Result<bool, QuotaError> {
        Ok(true)
    }
}

/// Skips enforcement when every account in the request is exempt.
#[derive(Clone, Debug, Default)]
pub struct ExemptAccounts {
    exempt: HashSet<String>,
}

impl ExemptAccounts {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt: accounts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_exempt(&self, account: &str) -> bool {
        self.exempt.contains(account)
    }
}

#[async_trait]
impl QuotaEnablement for ExemptAccounts {
    async fn is_enabled(&self, _ctx: &OpContext, accounts: &[String]) -> Result<bool, QuotaError> {
        Ok(accounts.iter().any(|account| !self.is_exempt(account)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_enforced_account_enforces_the_request() {
        let policy = ExemptAccounts::new(["ops"]);
        let ctx = OpContext::new();
        assert!(!policy.is_enabled(&ctx, &["ops".into()]).await.unwrap());
        assert!(policy
            .is_enabled(&ctx, &["ops".into(), "acctA".into()])
            .await
            .unwrap());
    }
}
