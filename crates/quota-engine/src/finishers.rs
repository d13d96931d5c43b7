use quota_lock::OpContext;
use tracing::warn;

use crate::errors::QuotaError;
use crate::finisher::FinisherRef;

/// Ordered batch of per-resource finishers reserved as one unit.
pub struct Finishers {
    members: Vec<FinisherRef>,
}

impl Finishers {
    pub fn new(members: Vec<FinisherRef>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[FinisherRef] {
        &self.members
    }

    /// Evaluates members in order. On the first failure every member that
    /// already succeeded is rolled back, newest first, before the error is
    /// returned together with any rollback errors.
    pub async fn evaluate(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        let mut ready: Vec<&FinisherRef> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let Err(err) = member.evaluate(ctx).await else {
                ready.push(member);
                continue;
            };
            let mut undo_errors = Vec::new();
            for done in ready.iter().rev() {
                if let Err(undo) = done.rollback(ctx).await {
                    warn!(
                        resource = done.resource(),
                        associated_id = done.associated_id(),
                        error = ?undo,
                        "compensating rollback failed"
                    );
                    undo_errors.push(undo);
                }
            }
            return Err(err.and_also(undo_errors));
        }
        Ok(())
    }

    pub async fn finally(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        let mut errors = Vec::new();
        for member in self.members.iter().rev() {
            if let Err(err) = member.finally(ctx).await {
                warn!(
                    resource = member.resource(),
                    associated_id = member.associated_id(),
                    error = ?err,
                    "finally failed"
                );
                errors.push(err);
            }
        }
        QuotaError::check(errors)
    }

    pub async fn rollback(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        let mut errors = Vec::new();
        for member in self.members.iter().rev() {
            if let Err(err) = member.rollback(ctx).await {
                warn!(
                    resource = member.resource(),
                    associated_id = member.associated_id(),
                    error = ?err,
                    "rollback failed"
                );
                errors.push(err);
            }
        }
        QuotaError::check(errors)
    }
}

/// Handle returned to callers of `begin`. Exactly one of `finally` or
/// `rollback` should follow; repeating either is harmless.
pub enum Reservation {
    /// Nothing was reserved: no params, or quota is not enforced.
    Noop,
    Batch(Finishers),
}

impl Reservation {
    pub fn is_noop(&self) -> bool {
        matches!(self, Reservation::Noop)
    }

    pub async fn finally(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        match self {
            Reservation::Noop => Ok(()),
            Reservation::Batch(batch) => batch.finally(ctx).await,
        }
    }

    pub async fn rollback(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        match self {
            Reservation::Noop => Ok(()),
            Reservation::Batch(batch) => batch.rollback(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finisher::FinishQuota;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use quota_errors::code::codes;
    use std::sync::Arc;

    /// Records calls into a shared journal; fails `evaluate` when asked.
    struct Scripted {
        name: &'static str,
        fail_evaluate: bool,
        fail_rollback: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn member(
            name: &'static str,
            fail_evaluate: bool,
            fail_rollback: bool,
            journal: &Arc<Mutex<Vec<String>>>,
        ) -> FinisherRef {
            Arc::new(Self {
                name,
                fail_evaluate,
                fail_rollback,
                journal: Arc::clone(journal),
            })
        }

        fn note(&self, op: &str) {
            self.journal.lock().push(format!("{op}:{}", self.name));
        }
    }

    #[async_trait]
    impl FinishQuota for Scripted {
        fn resource(&self) -> &str {
            self.name
        }

        fn associated_id(&self) -> &str {
            "acct"
        }

        async fn evaluate(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
            self.note("evaluate");
            if self.fail_evaluate {
                return Err(QuotaError::insufficient(self.name, "acct", 1));
            }
            Ok(())
        }

        async fn finally(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
            self.note("finally");
            Ok(())
        }

        async fn rollback(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
            self.note("rollback");
            if self.fail_rollback {
                return Err(QuotaError::data_abnormal(self.name, "acct", "underflow"));
            }
            Ok(())
        }

        async fn sync(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failure_rolls_back_only_ready_members_in_reverse() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let batch = Finishers::new(vec![
            Scripted::member("A", false, false, &journal),
            Scripted::member("B", false, true, &journal),
            Scripted::member("C", true, false, &journal),
            Scripted::member("D", false, false, &journal),
        ]);

        let err = batch.evaluate(&OpContext::new()).await.unwrap_err();
        assert_eq!(err.code(), codes::QUOTA_INSUFFICIENT);
        let chain = err.as_obj().cause_chain.clone().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].code, "QUOTA.DATA_ABNORMAL");
        assert_eq!(
            *journal.lock(),
            vec![
                "evaluate:A",
                "evaluate:B",
                "evaluate:C",
                "rollback:B",
                "rollback:A",
            ]
        );
    }

    #[tokio::test]
    async fn finally_visits_every_member_newest_first() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let batch = Finishers::new(vec![
            Scripted::member("A", false, true, &journal),
            Scripted::member("B", false, true, &journal),
        ]);
        batch.finally(&OpContext::new()).await.unwrap();
        let err = batch.rollback(&OpContext::new()).await.unwrap_err();
        assert_eq!(err.as_obj().cause_chain.clone().unwrap().len(), 2);
        assert_eq!(
            *journal.lock(),
            vec!["finally:B", "finally:A", "rollback:B", "rollback:A"]
        );
    }
}
