use super::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn entry_is_fresh_until_stale_time() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let t0 = Instant::now();
    cache.insert_at("/users", json!([1, 2]), t0);

    assert_eq!(cache.get_fresh_at("/users", t0 + Duration::from_secs(59)), Some(json!([1, 2])));
    assert_eq!(cache.get_fresh_at("/users", t0 + Duration::from_secs(60)), None);
    assert_eq!(cache.get_fresh_at("/missing", t0), None);
}

#[test]
fn zero_stale_time_never_serves_cache() {
    let cache = QueryCache::new(Duration::ZERO);
    cache.insert("/users", json!(1));
    assert_eq!(cache.get_fresh("/users"), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalidate_prefix_only_drops_matching_keys() {
    let cache = QueryCache::new(Duration::from_secs(60));
    cache.insert("/users/1", json!(1));
    cache.insert("/users/2", json!(2));
    cache.insert("/products", json!(3));

    cache.invalidate_prefix("/users");
    assert_eq!(cache.len(), 1);
    assert!(cache.get_fresh("/products").is_some());

    cache.invalidate("/products");
    assert!(cache.is_empty());
}

#[tokio::test]
async fn fetch_loads_once_while_fresh() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let loads = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .fetch("/me", || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "name": "ada" }))
            })
            .await
            .unwrap();
        assert_eq!(value["name"], "ada");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_does_not_cache_errors() {
    let cache = QueryCache::new(Duration::from_secs(60));

    let err = cache
        .fetch("/me", || async { Err(ApiError::Status { status: 500, body: String::new() }) })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert!(cache.is_empty());

    let value = cache.fetch("/me", || async { Ok(json!(7)) }).await.unwrap();
    assert_eq!(value, json!(7));
}

#[tokio::test]
async fn concurrent_misses_share_one_load() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let loads = AtomicUsize::new(0);
    let loader = || async {
        loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(json!({ "id": 1 }))
    };

    let (first, second) = tokio::join!(cache.fetch("/items/1", loader), cache.fetch("/items/1", loader));

    assert_eq!(first.unwrap(), json!({ "id": 1 }));
    assert_eq!(second.unwrap(), json!({ "id": 1 }));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(cache.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn waiter_reloads_after_shared_load_fails() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let loads = AtomicUsize::new(0);
    let loader = || async {
        let n = loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if n == 0 { Err(ApiError::Request("reset".into())) } else { Ok(json!(n)) }
    };

    let (first, second) = tokio::join!(cache.fetch("/flaky", loader), cache.fetch("/flaky", loader));

    assert!(matches!(first, Err(ApiError::Request(_))));
    assert_eq!(second.unwrap(), json!(1));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
