//! Resilient store behavior against a scripted backend

use super::test_utils::{Op, ScriptedBackend};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tabpin::error::StoreError;
use tabpin::store::{KeyValueBackend, ResilientStore, StoreConfig, ValueMap};

fn unthrottled() -> StoreConfig {
    StoreConfig {
        throttle_ms: 0,
        ..StoreConfig::default()
    }
}

fn store_over(backend: &Arc<ScriptedBackend>, config: StoreConfig) -> ResilientStore {
    ResilientStore::new(Arc::clone(backend) as Arc<dyn KeyValueBackend>, config)
}

fn items(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_100_then_200_ms() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.fail_next([
        StoreError::Backend("flaky".to_string()),
        StoreError::Backend("flaky".to_string()),
    ]);

    store.set(items(&[("k", json!(1))])).await.unwrap();

    let times = backend.call_times(Op::Set);
    assert_eq!(times.len(), 3);
    assert_eq!(times[1] - times[0], Duration::from_millis(100));
    assert_eq!(times[2] - times[1], Duration::from_millis(200));
    assert_eq!(backend.peek("k"), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_after_three_attempts() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.fail_next((0..3).map(|_| StoreError::Backend("down".to_string())));

    let err = store.get(&["k"]).await.unwrap_err();
    match err {
        StoreError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(*last, StoreError::Backend("down".to_string()));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(backend.calls(Op::Get), 3);
}

#[tokio::test(start_paused = true)]
async fn test_quota_error_is_not_retried() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.fail_next([StoreError::classify("QUOTA_BYTES quota exceeded")]);

    let err = store.set(items(&[("k", json!("v"))])).await.unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded(_)));
    assert!(err.is_critical());
    assert_eq!(backend.calls(Op::Set), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(
        &backend,
        StoreConfig {
            throttle_ms: 0,
            timeout_ms: 1000,
            max_attempts: 1,
            ..StoreConfig::default()
        },
    );
    backend.set_delay(Duration::from_secs(5));

    let err = store.get(&["k"]).await.unwrap_err();
    match err {
        StoreError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(*last, StoreError::Timeout(Duration::from_millis(1000)));
        }
        other => panic!("expected a timed-out attempt, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_identical_concurrent_reads_share_one_call() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.set_delay(Duration::from_millis(100));

    let (a, b) = tokio::join!(store.get(&["a", "b"]), store.get(&["a", "b"]));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(backend.calls(Op::Get), 1);
    assert_eq!(store.pending_operations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_failure_reaches_every_caller() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.set_delay(Duration::from_millis(50));
    backend.fail_next([StoreError::PermissionDenied("blocked".to_string())]);

    let (a, b) = tokio::join!(store.get(&["a"]), store.get(&["a"]));
    assert!(matches!(a, Err(StoreError::PermissionDenied(_))));
    assert_eq!(a, b);
    assert_eq!(backend.calls(Op::Get), 1);
}

#[tokio::test(start_paused = true)]
async fn test_operations_are_spaced_by_throttle() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, StoreConfig::default());

    for key in ["a", "b", "c"] {
        store.set(items(&[(key, json!(key))])).await.unwrap();
    }

    let times = backend.call_times(Op::Set);
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(50));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_serves_repeated_reads_until_expiry() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    store.set_without_cache(items(&[("k", json!(7))])).await.unwrap();

    let first = store.get(&["k"]).await.unwrap();
    let second = store.get(&["k"]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(backend.calls(Op::Get), 1);

    tokio::time::advance(Duration::from_millis(5001)).await;
    store.get(&["k"]).await.unwrap();
    assert_eq!(backend.calls(Op::Get), 2);
}

#[tokio::test(start_paused = true)]
async fn test_write_invalidates_cached_key_sets() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    store
        .set_without_cache(items(&[("a", json!(1)), ("b", json!(2))]))
        .await
        .unwrap();

    store.get(&["a", "b"]).await.unwrap();
    assert_eq!(store.cache_stats().entries, vec!["a,b".to_string()]);

    store.set(items(&[("b", json!(3))])).await.unwrap();
    let stats = store.cache_stats();
    assert_eq!(stats.entries, vec!["b".to_string()]);

    let read = store.get(&["a", "b"]).await.unwrap();
    assert_eq!(read.get("b"), Some(&json!(3)));
    assert_eq!(backend.calls(Op::Get), 2);

    // single-key read is served from the write-through entry
    let b = store.get(&["b"]).await.unwrap();
    assert_eq!(b.get("b"), Some(&json!(3)));
    assert_eq!(backend.calls(Op::Get), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remove_drops_cache_and_data() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    store.set(items(&[("k", json!(true))])).await.unwrap();
    store.remove(&["k"]).await.unwrap();

    assert_eq!(store.cache_stats().size, 0);
    assert!(store.get(&["k"]).await.unwrap().is_empty());
    assert_eq!(backend.peek("k"), None);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_reports_failure_without_erroring() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    backend.fail_next([StoreError::Unavailable("storage is disabled".to_string())]);

    let report = store.health_check().await;
    assert!(!report.healthy);
    assert!(report.error.unwrap().contains("disabled"));

    let report = store.health_check().await;
    assert!(report.healthy);
    assert_eq!(backend.peek(tabpin::store::resilient::HEALTH_SENTINEL_KEY), None);
}

#[tokio::test(start_paused = true)]
async fn test_read_overtaken_by_write_is_not_cached() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    store
        .set_without_cache(items(&[("k", json!("old"))]))
        .await
        .unwrap();
    backend.set_read_lag(Duration::from_millis(200));

    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.get(&["k"]).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    store.set(items(&[("k", json!("new"))])).await.unwrap();

    let late = reader.await.unwrap().unwrap();
    assert_eq!(late.get("k"), Some(&json!("old")));

    let read = store.get(&["k"]).await.unwrap();
    assert_eq!(read.get("k"), Some(&json!("new")));
    assert_eq!(backend.peek("k"), Some(json!("new")));
    assert_eq!(backend.calls(Op::Get), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_uncached_write_does_not_join_stale_request() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = store_over(&backend, unthrottled());
    store
        .set_without_cache(items(&[("k", json!("old"))]))
        .await
        .unwrap();
    backend.set_read_lag(Duration::from_millis(200));

    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.get(&["k"]).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    store
        .set_without_cache(items(&[("k", json!("new"))]))
        .await
        .unwrap();

    let fresh = store.get(&["k"]).await.unwrap();
    assert_eq!(fresh.get("k"), Some(&json!("new")));
    reader.await.unwrap().unwrap();
    assert_eq!(backend.calls(Op::Get), 2);

    backend.set_read_lag(Duration::ZERO);
    let cached = store.get(&["k"]).await.unwrap();
    assert_eq!(cached.get("k"), Some(&json!("new")));
    assert_eq!(backend.calls(Op::Get), 2);
}
