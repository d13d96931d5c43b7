//! Per-resource reservation handles.
//!
//! A finisher moves through `NotStarted -> Evaluated -> Finalized`. Only
//! the first `finally`/`rollback` has an effect; a finisher that never
//! reached `Evaluated` has nothing to release or undo.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quota_lock::{Locker, OpContext};
use quota_store::{AccountingHandle, QuotaRecord, ScriptOutcome};
use tracing::{debug, info, warn};

use crate::errors::QuotaError;
use crate::handler::HandlerRef;
use crate::param::Param;

#[async_trait]
pub trait FinishQuota: Send + Sync {
    fn resource(&self) -> &str;

    fn associated_id(&self) -> &str;

    /// Takes the record lock and reserves the requested amount. On failure
    /// the lock is released and the finisher is finalized.
    async fn evaluate(&self, ctx: &OpContext) -> Result<(), QuotaError>;

    /// Commits: keeps the reservation and releases the lock.
    async fn finally(&self, ctx: &OpContext) -> Result<(), QuotaError>;

    /// Compensates: returns the reserved amount and releases the lock.
    async fn rollback(&self, ctx: &OpContext) -> Result<(), QuotaError>;

    /// Overwrites the cached record with the handler's figures.
    async fn sync(&self, ctx: &OpContext) -> Result<(), QuotaError>;

    /// Syncs only when the record was last refreshed longer than `max_age`
    /// ago, or never. Returns whether a sync ran.
    async fn sync_if_stale(
        &self,
        ctx: &OpContext,
        _max_age: Duration,
    ) -> Result<bool, QuotaError> {
        self.sync(ctx).await?;
        Ok(true)
    }
}

pub type FinisherRef = Arc<dyn FinishQuota>;

/// Everything a factory needs to build one finisher.
pub struct FinisherParts {
    /// Accounting record key.
    pub key: String,
    pub handler: HandlerRef,
    pub param: Param,
    pub lock: Arc<dyn Locker>,
}

pub trait FinisherFactory: Send + Sync {
    fn build(&self, parts: FinisherParts) -> FinisherRef;
}

const EVALUATED: u8 = 0b01;
const FINALIZED: u8 = 0b10;

/// Reserves against the shared store with the atomic accounting scripts.
pub struct StoreFinisher {
    key: String,
    handler: HandlerRef,
    param: Param,
    lock: Arc<dyn Locker>,
    store: AccountingHandle,
    ttl: Option<Duration>,
    state: AtomicU8,
}

impl StoreFinisher {
    pub fn new(parts: FinisherParts, store: AccountingHandle, ttl: Option<Duration>) -> Self {
        Self {
            key: parts.key,
            handler: parts.handler,
            param: parts.param,
            lock: parts.lock,
            store,
            ttl,
            state: AtomicU8::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_evaluated(&self) -> bool {
        self.state.load(Ordering::SeqCst) & EVALUATED != 0
    }

    pub fn is_finalized(&self) -> bool {
        self.state.load(Ordering::SeqCst) & FINALIZED != 0
    }

    /// Sets `Finalized` and reports whether this call did so and the
    /// finisher had been evaluated, i.e. whether there is work to do.
    fn finalize(&self) -> bool {
        let before = self.state.fetch_or(FINALIZED, Ordering::SeqCst);
        before & FINALIZED == 0 && before & EVALUATED != 0
    }

    fn insufficient(&self) -> QuotaError {
        QuotaError::insufficient(&self.param.name, &self.param.associated_id, self.param.num)
    }

    fn abnormal(&self, msg: &str) -> QuotaError {
        QuotaError::data_abnormal(&self.param.name, &self.param.associated_id, msg)
    }

    /// Pulls both figures from the handler and writes them to the store.
    /// Callers hold the record lock.
    async fn resync(&self, ctx: &OpContext) -> Result<QuotaRecord, QuotaError> {
        let id = self.param.associated_id.as_str();
        let (used, quota) = tokio::try_join!(
            self.handler.query_used(ctx, id),
            self.handler.query_quota(ctx, id)
        )?;
        let record = QuotaRecord { used, quota };
        self.store.sync(&self.key, record, self.ttl).await?;
        info!(key = %self.key, used, quota, "quota record resynced");
        Ok(record)
    }

    async fn reserve(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        let outcome = self.store.reserve(&self.key, self.param.num, self.ttl).await?;
        debug!(key = %self.key, num = self.param.num, ?outcome, "reserve script");
        match outcome {
            ScriptOutcome::Ok => return Ok(()),
            ScriptOutcome::Fail => return Err(self.insufficient()),
            ScriptOutcome::Invalid => {}
        }

        if let Err(err) = self.resync(ctx).await {
            return Err(QuotaError::data_abnormal_from(
                &self.param.name,
                &self.param.associated_id,
                "resync after cache miss failed",
                &err,
            ));
        }
        let outcome = self.store.reserve(&self.key, self.param.num, self.ttl).await?;
        debug!(key = %self.key, num = self.param.num, ?outcome, "reserve script after resync");
        match outcome {
            ScriptOutcome::Ok => Ok(()),
            ScriptOutcome::Fail => Err(self.insufficient()),
            ScriptOutcome::Invalid => Err(self.abnormal("record still incomplete after resync")),
        }
    }
}

#[async_trait]
impl FinishQuota for StoreFinisher {
    fn resource(&self) -> &str {
        &self.param.name
    }

    fn associated_id(&self) -> &str {
        &self.param.associated_id
    }

    async fn evaluate(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        if self.is_finalized() {
            return Err(QuotaError::internal("evaluate on a finalized finisher"));
        }
        self.lock.lock(ctx).await?;
        self.state.fetch_or(EVALUATED, Ordering::SeqCst);

        let Err(err) = self.reserve(ctx).await else {
            return Ok(());
        };
        self.state.fetch_or(FINALIZED, Ordering::SeqCst);
        match self.lock.unlock().await {
            Ok(()) => Err(err),
            Err(unlock) => Err(err.and_also(vec![unlock.into()])),
        }
    }

    async fn finally(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
        if !self.finalize() {
            return Ok(());
        }
        self.lock.unlock().await?;
        Ok(())
    }

    async fn rollback(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        if !self.finalize() {
            return Ok(());
        }
        let mut errors = Vec::new();
        match self.store.rollback(&self.key, self.param.num, self.ttl).await {
            Ok(ScriptOutcome::Ok) => {
                debug!(key = %self.key, num = self.param.num, "reservation rolled back");
            }
            Ok(ScriptOutcome::Invalid) => {
                warn!(key = %self.key, "record missing on rollback; forcing resync");
                if let Err(err) = self.resync(ctx).await {
                    errors.push(err);
                }
            }
            Ok(ScriptOutcome::Fail) => {
                warn!(key = %self.key, num = self.param.num, "rollback would drive usage negative");
                errors.push(self.abnormal("rollback would drive usage below zero"));
            }
            Err(err) => errors.push(err.into()),
        }
        if let Err(err) = self.lock.unlock().await {
            errors.push(err.into());
        }
        QuotaError::check(errors)
    }

    async fn sync(&self, ctx: &OpContext) -> Result<(), QuotaError> {
        self.lock.lock(ctx).await?;
        let synced = self.resync(ctx).await.map(|_| ());
        let released = self.lock.unlock().await.map_err(QuotaError::from);
        match (synced, released) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(err), Err(unlock)) => Err(err.and_also(vec![unlock])),
        }
    }

    async fn sync_if_stale(&self, ctx: &OpContext, max_age: Duration) -> Result<bool, QuotaError> {
        if let Some(at) = self.store.refreshed_at(&self.key).await? {
            let age = Utc::now().timestamp_millis().saturating_sub(at);
            if age >= 0 && (age as u128) < max_age.as_millis() {
                return Ok(false);
            }
        }
        self.sync(ctx).await?;
        Ok(true)
    }
}

/// Builds [`StoreFinisher`]s over one accounting store.
#[derive(Clone)]
pub struct StoreFinisherFactory {
    store: AccountingHandle,
    ttl: Option<Duration>,
}

impl StoreFinisherFactory {
    /// `ttl` applies to every record written; `None` keeps records forever.
    pub fn new(store: AccountingHandle, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }
}

impl FinisherFactory for StoreFinisherFactory {
    fn build(&self, parts: FinisherParts) -> FinisherRef {
        Arc::new(StoreFinisher::new(parts, Arc::clone(&self.store), self.ttl))
    }
}

/// Always succeeds without touching a lock or a store.
pub struct NoopFinisher {
    resource: String,
    associated_id: String,
}

impl NoopFinisher {
    pub fn new(resource: impl Into<String>, associated_id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            associated_id: associated_id.into(),
        }
    }
}

#[async_trait]
impl FinishQuota for NoopFinisher {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn associated_id(&self) -> &str {
        &self.associated_id
    }

    async fn evaluate(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
        Ok(())
    }

    async fn finally(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
        Ok(())
    }

    async fn rollback(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
        Ok(())
    }

    async fn sync(&self, _ctx: &OpContext) -> Result<(), QuotaError> {
        Ok(())
    }

    async fn sync_if_stale(&self, _ctx: &OpContext, _max_age: Duration) -> Result<bool, QuotaError> {
        Ok(false)
    }
}

/// Disables accounting while leaving call sites unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFinisherFactory;

impl FinisherFactory for NoopFinisherFactory {
    fn build(&self, parts: FinisherParts) -> FinisherRef {
        Arc::new(NoopFinisher::new(parts.param.name, parts.param.associated_id))
    }
}
