//! Account-scoped quota reservation.
//!
//! [`ResourceQuotaManager::begin`] reserves several resources as one unit
//! and hands back a [`Reservation`] that is either committed with
//! `finally` or compensated with `rollback`. Accounting happens in atomic
//! store scripts; the per-record lock only guards the resync that follows
//! a cache miss.

pub mod dedup;
pub mod enablement;
pub mod errors;
pub mod finisher;
pub mod finishers;
pub mod handler;
pub mod manager;
pub mod param;
pub mod prelude;

pub use dedup::{DedupHandler, SingleFlight};
pub use enablement::{AlwaysEnforced, ExemptAccounts, QuotaEnablement};
pub use errors::QuotaError;
pub use finisher::{
    FinishQuota, FinisherFactory, FinisherParts, FinisherRef, NoopFinisher, NoopFinisherFactory,
    StoreFinisher, StoreFinisherFactory,
};
pub use finishers::{Finishers, Reservation};
pub use handler::{HandlerRef, StaticQuotaHandler, UsedQuotaHandler};
pub use manager::{ManagerBuilder, ResourceQuotaManager};
pub use param::{merge_params, Param, SyncTarget};
