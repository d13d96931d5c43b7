//! Collapses concurrent identical handler queries into one upstream call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use quota_lock::OpContext;

use crate::errors::QuotaError;
use crate::handler::{HandlerRef, UsedQuotaHandler};

type Call<T> = Shared<BoxFuture<'static, Result<T, QuotaError>>>;

/// In-flight call table. Callers arriving while a call for the same key is
/// running await that call's result instead of starting their own.
pub struct SingleFlight<T> {
    calls: Arc<Mutex<HashMap<String, Call<T>>>>,
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F>(&self, key: &str, call: F) -> Result<T, QuotaError>
    where
        F: Future<Output = Result<T, QuotaError>> + Send + 'static,
    {
        let shared = {
            let mut calls = self.calls.lock();
            calls
                .entry(key.to_string())
                .or_insert_with(|| call.boxed().shared())
                .clone()
        };
        let result = shared.clone().await;

        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| current.ptr_eq(&shared)) {
            calls.remove(key);
        }
        result
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Routes a resource handler's queries through a shared [`SingleFlight`],
/// keyed `name:used:id` and `name:quota:id`.
pub struct DedupHandler {
    name: String,
    inner: HandlerRef,
    flight: SingleFlight<u64>,
}

impl DedupHandler {
    pub fn new(name: impl Into<String>, inner: HandlerRef, flight: SingleFlight<u64>) -> Self {
        Self {
            name: name.into(),
            inner,
            flight,
        }
    }

    fn key(&self, field: &str, associated_id: &str) -> String {
        format!("{}:{field}:{associated_id}", self.name)
    }
}

#[async_trait]
impl UsedQuotaHandler for DedupHandler {
    async fn query_used(&self, ctx: &OpContext, associated_id: &str) -> Result<u64, QuotaError> {
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let id = associated_id.to_string();
        self.flight
            .run(&self.key("used", associated_id), async move {
                inner.query_used(&ctx, &id).await
            })
            .await
    }

    async fn query_quota(
        &self,
        ctx: &OpContext,
        associated_id: &str,
    ) -> Result<u64, QuotaError> {
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let id = associated_id.to_string();
        self.flight
            .run(&self.key("quota", associated_id), async move {
                inner.query_quota(&ctx, &id).await
            })
            .await
    }
}
