#![cfg(feature = "redis")]

use std::time::Duration;

use futures::StreamExt;
use quota_store::prelude::*;

async fn connect() -> Option<RedisStore> {
    let url = std::env::var("QUOTA_TEST_REDIS_URL").ok()?;
    Some(
        RedisStore::connect(RedisConfig::new(url))
            .await
            .expect("connect redis"),
    )
}

#[tokio::test]
async fn redis_accounting_scripts() {
    let Some(store) = connect().await else {
        return;
    };
    let key = build_key("quota-test", "CPU", "redis-acct");
    store.remove(&key).await.unwrap();

    assert_eq!(
        store.reserve(&key, 1, None).await.unwrap(),
        ScriptOutcome::Invalid
    );
    store
        .sync(&key, QuotaRecord { used: 0, quota: 4 }, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(store.refreshed_at(&key).await.unwrap().is_some());
    assert_eq!(store.reserve(&key, 4, None).await.unwrap(), ScriptOutcome::Ok);
    assert_eq!(store.reserve(&key, 1, None).await.unwrap(), ScriptOutcome::Fail);
    assert_eq!(store.rollback(&key, 5, None).await.unwrap(), ScriptOutcome::Fail);
    assert_eq!(store.rollback(&key, 4, None).await.unwrap(), ScriptOutcome::Ok);
    assert_eq!(
        store.load(&key).await.unwrap(),
        Some(QuotaRecord { used: 0, quota: 4 })
    );
    store.remove(&key).await.unwrap();
}

#[tokio::test]
async fn redis_lock_release_notifies() {
    let Some(store) = connect().await else {
        return;
    };
    let key = lock_key(&build_key("quota-test", "CPU", "redis-lock"));
    let channel = release_channel(&key);
    let lease = Duration::from_secs(5);

    assert_eq!(store.try_acquire(&key, "owner-a", lease).await.unwrap(), None);
    assert!(store
        .try_acquire(&key, "owner-b", lease)
        .await
        .unwrap()
        .is_some());

    let mut releases = store.subscribe(&channel).await.unwrap();
    assert!(!store.release(&key, "owner-b", &channel).await.unwrap());
    assert!(store.renew(&key, "owner-a", lease).await.unwrap());
    assert!(store.release(&key, "owner-a", &channel).await.unwrap());
    let notified = tokio::time::timeout(Duration::from_secs(2), releases.next()).await;
    assert_eq!(notified.unwrap(), Some(()));
}
