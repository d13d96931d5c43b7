use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use quota_lock::{LocalLockFactory, LockFactory, OpContext};
use quota_store::{default_key_fn, lock_key, KeyFn, DEFAULT_PREFIX};
use tracing::{debug, info, warn};

use crate::dedup::{DedupHandler, SingleFlight};
use crate::enablement::{AlwaysEnforced, QuotaEnablement};
use crate::errors::QuotaError;
use crate::finisher::{FinisherFactory, FinisherParts, FinisherRef};
use crate::finishers::{Finishers, Reservation};
use crate::handler::HandlerRef;
use crate::param::{merge_params, Param, SyncTarget};

/// Registry of resources and the strategies used to reserve them.
///
/// Built once at start-up and shared by reference; every strategy can be
/// swapped through [`ManagerBuilder`].
pub struct ResourceQuotaManager {
    handlers: HashMap<String, HandlerRef>,
    lock_factory: Arc<dyn LockFactory>,
    finisher_factory: Arc<dyn FinisherFactory>,
    enablement: Arc<dyn QuotaEnablement>,
    key_fn: KeyFn,
}

impl ResourceQuotaManager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Accounting record key for `(resource, associated_id)`.
    pub fn record_key(&self, resource: &str, associated_id: &str) -> String {
        (self.key_fn)(resource, associated_id)
    }

    fn finisher(&self, param: Param) -> Result<FinisherRef, QuotaError> {
        let handler = self
            .handlers
            .get(&param.name)
            .ok_or_else(|| QuotaError::unregistered(&param.name))?;
        let key = self.record_key(&param.name, &param.associated_id);
        let lock = self.lock_factory.locker(&lock_key(&key));
        Ok(self.finisher_factory.build(FinisherParts {
            key,
            handler: Arc::clone(handler),
            param,
            lock,
        }))
    }

    /// Reserves every param as one unit.
    ///
    /// Params are merged per `(name, associated_id)` and zero amounts are
    /// dropped. An empty request, or one whose accounts are not enforced,
    /// returns [`Reservation::Noop`] without touching any lock or store.
    pub async fn begin(&self, ctx: &OpContext, params: &[Param]) -> Result<Reservation, QuotaError> {
        let mut merged = merge_params(params);
        if merged.is_empty() {
            return Ok(Reservation::Noop);
        }

        let accounts: Vec<String> = {
            let mut seen = HashSet::new();
            merged
                .iter()
                .filter(|param| seen.insert(param.associated_id.as_str()))
                .map(|param| param.associated_id.clone())
                .collect()
        };
        if !self.enablement.is_enabled(ctx, &accounts).await? {
            debug!(?accounts, "quota not enforced; reservation skipped");
            return Ok(Reservation::Noop);
        }

        // Locks are always taken in (name, associated_id) order so that
        // batches naming the same records never wait on each other in a cycle.
        merged.sort_by(|a, b| {
            (a.name.as_str(), a.associated_id.as_str())
                .cmp(&(b.name.as_str(), b.associated_id.as_str()))
        });
        let members = merged
            .into_iter()
            .map(|param| self.finisher(param))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = Finishers::new(members);
        batch.evaluate(ctx).await?;
        Ok(Reservation::Batch(batch))
    }

    /// Runs `work` under a reservation: committed when it returns `Ok`,
    /// rolled back when it returns `Err` or panics. A panic resumes after
    /// the rollback.
    pub async fn transaction<T, F, Fut>(
        &self,
        ctx: &OpContext,
        params: &[Param],
        work: F,
    ) -> Result<T, QuotaError>
    where
        F: FnOnce(OpContext) -> Fut,
        Fut: Future<Output = Result<T, QuotaError>>,
    {
        let reservation = self.begin(ctx, params).await?;
        match AssertUnwindSafe(work(ctx.clone())).catch_unwind().await {
            Ok(Ok(value)) => {
                reservation.finally(ctx).await?;
                Ok(value)
            }
            Ok(Err(err)) => match reservation.rollback(ctx).await {
                Ok(()) => Err(err),
                Err(undo) => Err(err.and_also(vec![undo])),
            },
            Err(payload) => {
                if let Err(undo) = reservation.rollback(ctx).await {
                    warn!(error = ?undo, "rollback after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn targets(&self, targets: &[SyncTarget]) -> Vec<Result<FinisherRef, QuotaError>> {
        let mut seen = HashSet::new();
        targets
            .iter()
            .filter(|target| seen.insert(*target))
            .map(|target| {
                self.finisher(Param::new(
                    target.associated_id.clone(),
                    target.name.clone(),
                    0,
                ))
            })
            .collect()
    }

    /// Pushes authoritative figures for every target into the store.
    /// Targets run concurrently; all failures are reported together.
    pub async fn sync(&self, ctx: &OpContext, targets: &[SyncTarget]) -> Result<(), QuotaError> {
        let runs = self.targets(targets).into_iter().map(|finisher| async move {
            let finisher = finisher?;
            finisher.sync(ctx).await?;
            info!(
                resource = finisher.resource(),
                associated_id = finisher.associated_id(),
                "forced sync"
            );
            Ok::<_, QuotaError>(())
        });
        let errors = join_all(runs)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();
        QuotaError::check(errors)
    }

    /// Resyncs targets whose record was never refreshed or was refreshed
    /// more than `max_age` ago. Returns how many were resynced.
    pub async fn refresh_stale(
        &self,
        ctx: &OpContext,
        targets: &[SyncTarget],
        max_age: Duration,
    ) -> Result<usize, QuotaError> {
        let runs = self
            .targets(targets)
            .into_iter()
            .map(|finisher| async move { finisher?.sync_if_stale(ctx, max_age).await });
        let mut refreshed = 0;
        let mut errors = Vec::new();
        for outcome in join_all(runs).await {
            match outcome {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(err) => errors.push(err),
            }
        }
        debug!(refreshed, failed = errors.len(), "stale refresh finished");
        QuotaError::check(errors).map(|_| refreshed)
    }
}

/// Collects registrations and strategies; [`ManagerBuilder::build`]
/// validates them.
pub struct ManagerBuilder {
    handlers: Vec<(String, HandlerRef)>,
    lock_factory: Option<Arc<dyn LockFactory>>,
    finisher_factory: Option<Arc<dyn FinisherFactory>>,
    enablement: Arc<dyn QuotaEnablement>,
    key_fn: KeyFn,
    flight: SingleFlight<u64>,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            lock_factory: None,
            finisher_factory: None,
            enablement: Arc::new(AlwaysEnforced),
            key_fn: default_key_fn(DEFAULT_PREFIX),
            flight: SingleFlight::new(),
        }
    }
}

impl ManagerBuilder {
    /// Registers a resource. Its queries are deduplicated through the
    /// manager-wide in-flight table.
    pub fn register(mut self, name: impl Into<String>, handler: HandlerRef) -> Self {
        let name = name.into();
        let wrapped: HandlerRef =
            Arc::new(DedupHandler::new(name.clone(), handler, self.flight.clone()));
        self.handlers.push((name, wrapped));
        self
    }

    /// Defaults to a [`LocalLockFactory`].
    pub fn lock_factory(mut self, factory: Arc<dyn LockFactory>) -> Self {
        self.lock_factory = Some(factory);
        self
    }

    pub fn finisher_factory(mut self, factory: Arc<dyn FinisherFactory>) -> Self {
        self.finisher_factory = Some(factory);
        self
    }

    pub fn enablement(mut self, enablement: Arc<dyn QuotaEnablement>) -> Self {
        self.enablement = enablement;
        self
    }

    pub fn key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn build(self) -> Result<ResourceQuotaManager, QuotaError> {
        let finisher_factory = self
            .finisher_factory
            .ok_or_else(|| QuotaError::config("no finisher factory configured"))?;
        let mut handlers = HashMap::with_capacity(self.handlers.len());
        for (name, handler) in self.handlers {
            if name.is_empty() {
                return Err(QuotaError::config("resource name must not be empty"));
            }
            if handlers.insert(name.clone(), handler).is_some() {
                return Err(QuotaError::config(&format!(
                    "resource '{name}' registered twice"
                )));
            }
        }
        Ok(ResourceQuotaManager {
            handlers,
            lock_factory: self
                .lock_factory
                .unwrap_or_else(|| Arc::new(LocalLockFactory::default())),
            finisher_factory,
            enablement: self.enablement,
            key_fn: self.key_fn,
        })
    }
}
