use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use quota_engine::prelude::*;
use quota_errors::code::codes;
use quota_lock::DistributedLockFactory;
use quota_store::{AccountingStore, MemoryStore, QuotaRecord};
use tokio::time::{sleep, Duration};

const CPU_KEY: &str = "dcs:resource:{acctA}:CPU";
const NET_KEY: &str = "dcs:resource:{acctA}:NET";

struct Fixture {
    store: MemoryStore,
    cpu: Arc<StaticQuotaHandler>,
    manager: Arc<ResourceQuotaManager>,
}

fn fixture_with(enablement: Arc<dyn QuotaEnablement>) -> Fixture {
    let store = MemoryStore::new();
    let cpu = Arc::new(StaticQuotaHandler::new(4));
    let net = Arc::new(StaticQuotaHandler::new(1));
    let locks = DistributedLockFactory::new(
        Arc::new(store.clone()),
        LockOptions::default().with_wait_timeout(Duration::from_secs(2)),
    );
    let manager = ResourceQuotaManager::builder()
        .register("CPU", cpu.clone())
        .register("NET", net)
        .lock_factory(Arc::new(locks))
        .finisher_factory(Arc::new(StoreFinisherFactory::new(
            Arc::new(store.clone()),
            Some(Duration::from_secs(3600)),
        )))
        .enablement(enablement)
        .build()
        .unwrap();
    Fixture {
        store,
        cpu,
        manager: Arc::new(manager),
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(AlwaysEnforced))
}

async fn used(store: &MemoryStore, key: &str) -> u64 {
    store.load(key).await.unwrap().map_or(0, |record| record.used)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_exceed_quota() {
    let fx = fixture();
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let manager = Arc::clone(&fx.manager);
        tasks.push(tokio::spawn(async move {
            let ctx = OpContext::new();
            let reservation = manager.begin(&ctx, &[Param::new("acctA", "CPU", 2)]).await?;
            sleep(Duration::from_millis(20)).await;
            reservation.finally(&ctx).await
        }));
    }

    let mut granted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => granted += 1,
            Err(err) => assert_eq!(err.code(), codes::QUOTA_INSUFFICIENT),
        }
    }
    assert_eq!(granted, 2);
    assert_eq!(used(&fx.store, CPU_KEY).await, 4);
}

/// Plenty of quota, but every ground-truth lookup takes a while.
struct SlowHandler;

#[async_trait]
impl UsedQuotaHandler for SlowHandler {
    async fn query_used(&self, _ctx: &OpContext, _id: &str) -> Result<u64, QuotaError> {
        sleep(Duration::from_millis(100)).await;
        Ok(0)
    }

    async fn query_quota(&self, _ctx: &OpContext, _id: &str) -> Result<u64, QuotaError> {
        Ok(100)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_in_opposite_order_both_complete() {
    let store = MemoryStore::new();
    let locks = DistributedLockFactory::new(
        Arc::new(store.clone()),
        LockOptions::default().with_wait_timeout(Duration::from_millis(800)),
    );
    let manager = Arc::new(
        ResourceQuotaManager::builder()
            .register("CPU", Arc::new(SlowHandler))
            .register("NET", Arc::new(SlowHandler))
            .lock_factory(Arc::new(locks))
            .finisher_factory(Arc::new(StoreFinisherFactory::new(
                Arc::new(store.clone()),
                None,
            )))
            .build()
            .unwrap(),
    );

    let orders = [["CPU", "NET"], ["NET", "CPU"]];
    let tasks: Vec<_> = orders
        .into_iter()
        .map(|order| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let ctx = OpContext::new();
                let params: Vec<_> = order.iter().map(|name| Param::new("acctA", *name, 1)).collect();
                let reservation = manager.begin(&ctx, &params).await?;
                sleep(Duration::from_millis(20)).await;
                reservation.finally(&ctx).await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(used(&store, CPU_KEY).await, 2);
    assert_eq!(used(&store, NET_KEY).await, 2);
}

#[tokio::test]
async fn zero_amount_never_touches_the_store() {
    let fx = fixture();
    fx.store.set_available(false);
    let reservation = fx
        .manager
        .begin(&OpContext::new(), &[Param::new("acctA", "CPU", 0)])
        .await
        .unwrap();
    assert!(reservation.is_noop());
    reservation.rollback(&OpContext::new()).await.unwrap();
    fx.store.set_available(true);
    assert!(fx.store.load(CPU_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_batch_leaves_no_net_usage() {
    let fx = fixture();
    let ctx = OpContext::new();
    let err = fx
        .manager
        .begin(
            &ctx,
            &[Param::new("acctA", "CPU", 2), Param::new("acctA", "NET", 5)],
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), codes::QUOTA_INSUFFICIENT);
    assert_eq!(err.as_obj().meta["resource"], "NET");
    assert_eq!(used(&fx.store, CPU_KEY).await, 0);
    assert_eq!(used(&fx.store, NET_KEY).await, 0);

    // Both locks were released on the way out.
    let reservation = fx
        .manager
        .begin(
            &ctx,
            &[Param::new("acctA", "CPU", 2), Param::new("acctA", "NET", 1)],
        )
        .await
        .unwrap();
    reservation.finally(&ctx).await.unwrap();
    assert_eq!(used(&fx.store, CPU_KEY).await, 2);
    assert_eq!(used(&fx.store, NET_KEY).await, 1);
}

#[tokio::test]
async fn exempt_account_bypasses_lock_and_store() {
    let fx = fixture_with(Arc::new(ExemptAccounts::new(["ops"])));
    fx.store.set_available(false);
    let ctx = OpContext::new();

    let reservation = fx
        .manager
        .begin(&ctx, &[Param::new("ops", "CPU", 100)])
        .await
        .unwrap();
    assert!(reservation.is_noop());
    reservation.finally(&ctx).await.unwrap();
    reservation.rollback(&ctx).await.unwrap();

    let err = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 1)])
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), codes::QUOTA_SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn repeated_rollback_undoes_once() {
    let fx = fixture();
    fx.cpu.set_figures("acctA", 1, 4);
    let ctx = OpContext::new();

    let reservation = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 2)])
        .await
        .unwrap();
    assert_eq!(used(&fx.store, CPU_KEY).await, 3);
    reservation.rollback(&ctx).await.unwrap();
    reservation.rollback(&ctx).await.unwrap();
    reservation.finally(&ctx).await.unwrap();
    assert_eq!(used(&fx.store, CPU_KEY).await, 1);
}

#[tokio::test]
async fn repeated_finally_keeps_the_reservation() {
    let fx = fixture();
    let ctx = OpContext::new();
    let reservation = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 1), Param::new("acctA", "CPU", 2)])
        .await
        .unwrap();
    reservation.finally(&ctx).await.unwrap();
    reservation.finally(&ctx).await.unwrap();
    reservation.rollback(&ctx).await.unwrap();
    assert_eq!(used(&fx.store, CPU_KEY).await, 3);
}

#[tokio::test]
async fn rollback_after_external_delete_resyncs() {
    let fx = fixture();
    fx.cpu.set_figures("acctA", 1, 4);
    let ctx = OpContext::new();

    let reservation = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 2)])
        .await
        .unwrap();
    fx.store.remove(CPU_KEY).await.unwrap();

    reservation.rollback(&ctx).await.unwrap();
    assert_eq!(
        fx.store.load(CPU_KEY).await.unwrap(),
        Some(QuotaRecord { used: 1, quota: 4 })
    );
}

#[tokio::test]
async fn record_stays_locked_until_finalized() {
    let fx = fixture();
    let ctx = OpContext::new();
    let first = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 1)])
        .await
        .unwrap();

    let hurried = OpContext::new().with_timeout(Duration::from_millis(150));
    let err = fx
        .manager
        .begin(&hurried, &[Param::new("acctA", "CPU", 1)])
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), codes::LOCK_TIMEOUT);

    // Other accounts are not held up.
    let other = fx
        .manager
        .begin(&hurried, &[Param::new("acctB", "CPU", 1)])
        .await
        .unwrap();
    other.finally(&ctx).await.unwrap();

    first.finally(&ctx).await.unwrap();
    let second = fx
        .manager
        .begin(&ctx, &[Param::new("acctA", "CPU", 1)])
        .await
        .unwrap();
    second.finally(&ctx).await.unwrap();
    assert_eq!(used(&fx.store, CPU_KEY).await, 2);
}

#[tokio::test]
async fn transaction_commits_or_compensates() {
    let fx = fixture();
    let ctx = OpContext::new();
    let params = [Param::new("acctA", "CPU", 1)];

    let value = fx
        .manager
        .transaction(&ctx, &params, |_ctx| async { Ok(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(used(&fx.store, CPU_KEY).await, 1);

    let err = fx
        .manager
        .transaction(&ctx, &params, |_ctx| async {
            Err::<(), _>(QuotaError::internal("work failed"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UNKNOWN_INTERNAL);
    assert_eq!(used(&fx.store, CPU_KEY).await, 1);
}

async fn explode(_ctx: OpContext) -> Result<(), QuotaError> {
    panic!("work panicked")
}

#[tokio::test]
async fn transaction_rolls_back_on_panic() {
    let fx = fixture();
    let ctx = OpContext::new();
    let params = [Param::new("acctA", "CPU", 3)];

    let outcome = AssertUnwindSafe(fx.manager.transaction(&ctx, &params, explode))
        .catch_unwind()
        .await;
    assert!(outcome.is_err());
    assert_eq!(used(&fx.store, CPU_KEY).await, 0);

    // The lock was released by the rollback.
    let reservation = fx.manager.begin(&ctx, &params).await.unwrap();
    reservation.finally(&ctx).await.unwrap();
}

#[tokio::test]
async fn forced_sync_reports_every_failure() {
    let fx = fixture();
    fx.cpu.set_figures("acctA", 3, 9);
    let ctx = OpContext::new();

    let err = fx
        .manager
        .sync(
            &ctx,
            &[
                SyncTarget::new("acctA", "CPU"),
                SyncTarget::new("acctA", "GPU"),
                SyncTarget::new("acctA", "DISK"),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::QUOTA_RESOURCE_UNREGISTERED);
    assert_eq!(err.as_obj().cause_chain.as_ref().unwrap().len(), 2);
    assert_eq!(
        fx.store.load(CPU_KEY).await.unwrap(),
        Some(QuotaRecord { used: 3, quota: 9 })
    );
}

#[tokio::test]
async fn refresh_stale_skips_recent_records() {
    let fx = fixture();
    let ctx = OpContext::new();
    let targets = [SyncTarget::new("acctA", "CPU"), SyncTarget::new("acctA", "NET")];

    fx.manager.sync(&ctx, &targets[..1]).await.unwrap();
    let refreshed = fx
        .manager
        .refresh_stale(&ctx, &targets, Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(refreshed, 1);
    assert!(fx.store.refreshed_at(NET_KEY).await.unwrap().is_some());
}
