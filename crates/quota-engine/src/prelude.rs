pub use crate::{
    enablement::{AlwaysEnforced, ExemptAccounts, QuotaEnablement},
    errors::QuotaError,
    finisher::{FinishQuota, FinisherFactory, NoopFinisherFactory, StoreFinisherFactory},
    finishers::Reservation,
    handler::{HandlerRef, StaticQuotaHandler, UsedQuotaHandler},
    manager::{ManagerBuilder, ResourceQuotaManager},
    param::{Param, SyncTarget},
};
pub use quota_lock::{LockOptions, OpContext};
