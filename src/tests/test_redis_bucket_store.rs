use std::{env, time::Duration};

use redis::AsyncCommands;

use super::runtime::block_on;
use crate::{BucketKey, BucketStore, RedisBucketStore, RedisBucketStoreOptions};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> BucketKey {
    let n: u64 = rand::random();
    BucketKey::try_from(format!("tollgate_test_{n}")).unwrap()
}

fn key(s: &str) -> BucketKey {
    BucketKey::try_from(s).unwrap()
}

async fn build_store(url: &str) -> (RedisBucketStore, redis::aio::ConnectionManager) {
    let client = redis::Client::open(url).unwrap();
    let cm = client.get_connection_manager().await.unwrap();

    let store = RedisBucketStore::new(RedisBucketStoreOptions {
        connection_manager: cm.clone(),
        prefix: Some(unique_prefix()),
    });

    (store, cm)
}

#[test]
fn record_and_lock_live_under_separate_keys() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let (store, mut cm) = build_store(&url).await;
        let k = key("k");

        store
            .write_record(&k, &[("last_access", "10".to_string()), ("last_tokens", "3".to_string())])
            .await
            .unwrap();
        assert!(store.try_lock(&k, "t", Duration::from_secs(5)).await.unwrap());

        let record_key = store.record_key(&k);
        let lock_key = store.lock_key(&k);
        assert!(record_key.ends_with(":k:bucket"));
        assert!(lock_key.ends_with(":k:lock"));

        let record_type: String = redis::cmd("TYPE").arg(&*record_key).query_async(&mut cm).await.unwrap();
        let lock_type: String = redis::cmd("TYPE").arg(&*lock_key).query_async(&mut cm).await.unwrap();
        assert_eq!(record_type, "hash");
        assert_eq!(lock_type, "string");

        let holder: String = cm.get(&*lock_key).await.unwrap();
        assert_eq!(holder, "t");

        let ttl_ms: i64 = cm.pttl(&*lock_key).await.unwrap();
        assert!(ttl_ms > 0 && ttl_ms <= 5_000);
    });
}

#[test]
fn missing_record_reads_as_none() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let (store, _cm) = build_store(&url).await;

        assert_eq!(store.read_record(&key("missing")).await.unwrap(), None);
    });
}

#[test]
fn lock_is_exclusive_and_token_checked_on_release() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let (store, _cm) = build_store(&url).await;
        let k = key("k");
        let ttl = Duration::from_secs(5);

        assert!(store.try_lock(&k, "a", ttl).await.unwrap());
        assert!(!store.try_lock(&k, "b", ttl).await.unwrap());

        // A release with the wrong token leaves the lock in place.
        store.unlock(&k, "b").await.unwrap();
        assert!(!store.try_lock(&k, "b", ttl).await.unwrap());

        store.unlock(&k, "a").await.unwrap();
        assert!(store.try_lock(&k, "b", ttl).await.unwrap());
    });
}

#[test]
fn lock_expires_after_ttl() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let (store, _cm) = build_store(&url).await;
        let k = key("k");

        assert!(store.try_lock(&k, "a", Duration::from_millis(100)).await.unwrap());
        std::thread::sleep(Duration::from_millis(200));
        assert!(store.try_lock(&k, "b", Duration::from_millis(100)).await.unwrap());
    });
}
