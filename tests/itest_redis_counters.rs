#![cfg(any(feature = "redis-tokio", feature = "redis-smol"))]

//! Integration tests against a live Redis. Skipped unless `REDIS_URL` is set.

use std::{env, sync::Arc};

use abacus::{AbacusError, CounterOps, CounterStore, KeySet, RedisCounterStore};
use futures::future::join_all;

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> String {
    let n: u64 = rand::random();
    format!("abacus_test_{n}")
}

async fn build_counters(url: &str) -> CounterOps<RedisCounterStore> {
    let client = redis::Client::open(url).unwrap();
    let store = RedisCounterStore::connect(client).await.unwrap();
    CounterOps::new(store)
}

#[test]
fn bounded_increment_respects_the_maximum() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_counters(&url).await;
        let key = format!("{}:k", unique_prefix());

        for expected in 1..=3i64 {
            assert!(counters.bounded_increment(&key, 1, 3, 60_000).await.unwrap());
            assert_eq!(counters.store().get(&key).await.unwrap(), Some(expected));
        }

        assert!(!counters.bounded_increment(&key, 1, 3, 60_000).await.unwrap());
        assert_eq!(counters.store().get(&key).await.unwrap(), Some(3));
    });
}

#[test]
fn decrement_respects_the_floor() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_counters(&url).await;
        let key = format!("{}:k", unique_prefix());

        assert!(counters.add(&key, 3, 60_000).await.unwrap());
        assert!(!counters.bounded_decrement(&key, 5, 0, 60_000).await.unwrap());
        assert_eq!(counters.store().get(&key).await.unwrap(), Some(3));
    });
}

#[test]
fn add_is_first_writer_wins() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_counters(&url).await;
        let key = format!("{}:k", unique_prefix());

        assert!(counters.add(&key, 7, 60_000).await.unwrap());
        assert!(!counters.add(&key, 9, 60_000).await.unwrap());
        assert_eq!(counters.store().get(&key).await.unwrap(), Some(7));
    });
}

#[test]
fn successful_increment_refreshes_the_ttl() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let client = redis::Client::open(url.as_str()).unwrap();
        let counters = build_counters(&url).await;
        let key = format!("{}:k", unique_prefix());

        assert!(counters.add(&key, 1, 5_000).await.unwrap());
        assert!(counters.bounded_increment(&key, 1, 10, 60_000).await.unwrap());

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let pttl: i64 = redis::cmd("PTTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();

        // Refreshed to the 60s of the increment, not left at (or added to) the 5s.
        assert!(pttl > 55_000, "pttl was {pttl}");
        assert!(pttl <= 60_000, "pttl was {pttl}");
    });
}

#[test]
fn aggregate_bound_covers_the_sibling_sum() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_counters(&url).await;
        let prefix = unique_prefix();
        let primary = format!("{prefix}:p");
        let s1 = format!("{prefix}:s1");
        let s2 = format!("{prefix}:s2");

        assert!(counters.add(&s1, 4, 60_000).await.unwrap());
        assert!(counters.add(&s2, 3, 60_000).await.unwrap());

        let siblings = KeySet::from(vec![s1.clone(), s2.clone()]);

        // 4 + 3 + 5 = 12 > 10
        assert!(
            !counters
                .aggregate_bounded_increment(&primary, &siblings, 5, 10, 60_000)
                .await
                .unwrap()
        );
        assert_eq!(counters.store().get(&primary).await.unwrap(), None);

        // 4 + 3 + 2 = 9 <= 10
        assert!(
            counters
                .aggregate_bounded_increment(&primary, &siblings, 2, 10, 60_000)
                .await
                .unwrap()
        );
        assert_eq!(counters.store().get(&primary).await.unwrap(), Some(2));
        assert_eq!(counters.store().get(&s1).await.unwrap(), Some(4));
    });
}

#[test]
fn malformed_counter_payloads_are_surfaced_not_zeroed() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let client = redis::Client::open(url.as_str()).unwrap();
        let counters = build_counters(&url).await;
        let key = format!("{}:k", unique_prefix());

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg("not-a-counter")
            .arg("PX")
            .arg(60_000)
            .query_async(&mut conn)
            .await
            .unwrap();

        let err = counters
            .bounded_increment(&key, 1, 10, 60_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AbacusError::MalformedCounter { .. }));
    });
}

#[test]
fn concurrent_increments_admit_exactly_the_maximum() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = Arc::new(build_counters(&url).await);
        let key = Arc::new(format!("{}:k", unique_prefix()));
        let maximum = 10i64;
        let callers = 32;

        let tasks: Vec<_> = (0..callers)
            .map(|_| {
                let counters = counters.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    counters
                        .bounded_increment(&key, 1, maximum, 60_000)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let admitted = join_all(tasks)
            .await
            .into_iter()
            .map(|result| result.unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, maximum as usize);
        assert_eq!(counters.store().get(&key).await.unwrap(), Some(maximum));
    });
}
