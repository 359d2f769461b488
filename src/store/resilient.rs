//! Resilient store
//!
//! Wraps a [`KeyValueBackend`] with:
//! - a short-TTL read cache keyed by the requested key-set,
//! - coalescing of identical in-flight requests,
//! - a global minimum spacing between backend operations,
//! - a timeout around every backend call,
//! - retry with exponential backoff for transient failures.
//!
//! Critical failures (quota, permission, unavailable) are surfaced on the first
//! attempt.

use crate::error::StoreError;
use crate::store::retry::{with_retry, RetryFailure, RetryPolicy};
use crate::store::{KeyValueBackend, ValueMap};
use crate::ttl::TtlMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// Key written and removed by [`ResilientStore::health_check`].
pub const HEALTH_SENTINEL_KEY: &str = "__storage_health_test__";

/// Configuration for the resilient store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Minimum spacing between backend operations (milliseconds)
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Read cache lifetime (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Timeout for a single backend call (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Cap for the doubling retry delay (milliseconds)
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_throttle_ms() -> u64 {
    50
}

fn default_cache_ttl_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    100
}

fn default_max_retry_delay_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than zero".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(format!(
                "initial_retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                self.initial_retry_delay_ms, self.max_retry_delay_ms
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy<StoreError> {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            is_retryable: |e: &StoreError| !e.is_critical(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Result of [`ResilientStore::health_check`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time_millis: u64,
    pub cache_size: usize,
    pub pending_operations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend usage figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub bytes_in_use: u64,
    pub human_readable: String,
}

/// Read cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<String>,
    pub ttl_millis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OperationKind {
    Get,
    Set,
    Remove,
}

/// Identity of a coalescable request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    kind: OperationKind,
    keys: String,
    payload: Option<String>,
}

type SharedOutcome = Shared<BoxFuture<'static, Result<ValueMap, StoreError>>>;

struct PendingOperation {
    id: u64,
    future: SharedOutcome,
}

struct StoreState {
    cache: TtlMap<String, ValueMap>,
    pending: HashMap<OperationKey, PendingOperation>,
    next_slot: Option<Instant>,
    /// Bumped by every completed write, remove or clear.
    generation: u64,
    /// Generation of the last write touching each key.
    written: HashMap<String, u64>,
    cleared_at: u64,
}

impl StoreState {
    /// Note a completed write to `keys` and detach in-flight reads of them, so
    /// later readers start a fresh backend call instead of joining a stale one.
    fn record_write(&mut self, keys: &[String]) {
        self.generation += 1;
        for key in keys {
            self.written.insert(key.clone(), self.generation);
        }
        self.pending.retain(|op, _| {
            op.kind != OperationKind::Get || !op.keys.split(',').any(|k| keys.iter().any(|w| w == k))
        });
    }

    fn record_clear(&mut self) {
        self.generation += 1;
        self.cleared_at = self.generation;
        self.pending.retain(|op, _| op.kind != OperationKind::Get);
    }

    /// Whether any of `keys` was written after `generation` was observed.
    fn written_since(&self, keys: &[String], generation: u64) -> bool {
        self.cleared_at > generation
            || keys
                .iter()
                .any(|k| self.written.get(k).is_some_and(|&at| at > generation))
    }
}

struct StoreInner {
    backend: Arc<dyn KeyValueBackend>,
    config: StoreConfig,
    state: Mutex<StoreState>,
    next_operation_id: AtomicU64,
}

/// Throttled, retrying, caching wrapper over a [`KeyValueBackend`]
///
/// Cheap to clone; clones share cache, throttle clock and in-flight requests.
/// Construct one per process.
#[derive(Clone)]
pub struct ResilientStore {
    inner: Arc<StoreInner>,
}

impl ResilientStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: StoreConfig) -> Self {
        let cache_ttl = Duration::from_millis(config.cache_ttl_ms);
        info!(
            throttle_ms = config.throttle_ms,
            cache_ttl_ms = config.cache_ttl_ms,
            timeout_ms = config.timeout_ms,
            max_attempts = config.max_attempts,
            "Resilient store initialized"
        );
        Self {
            inner: Arc::new(StoreInner {
                backend,
                config,
                state: Mutex::new(StoreState {
                    cache: TtlMap::new(cache_ttl),
                    pending: HashMap::new(),
                    next_slot: None,
                    generation: 0,
                    written: HashMap::new(),
                    cleared_at: 0,
                }),
                next_operation_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Read `keys`, serving a fresh cached copy of the same key-set when available.
    pub async fn get(&self, keys: &[&str]) -> Result<ValueMap, StoreError> {
        self.get_with(keys, true).await
    }

    /// Read `keys` from the backend, bypassing and not populating the cache.
    pub async fn get_uncached(&self, keys: &[&str]) -> Result<ValueMap, StoreError> {
        self.get_with(keys, false).await
    }

    async fn get_with(&self, keys: &[&str], use_cache: bool) -> Result<ValueMap, StoreError> {
        let key_set = keys.join(",");

        if use_cache {
            let mut state = self.inner.state.lock();
            state.cache.sweep();
            if let Some(cached) = state.cache.get(&key_set) {
                debug!(keys = %key_set, "Cache hit");
                return Ok(cached.clone());
            }
        }

        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let inner = Arc::clone(&self.inner);
        let op_key = OperationKey {
            kind: OperationKind::Get,
            keys: key_set.clone(),
            payload: Some(use_cache.to_string()),
        };
        let work = async move { inner.perform_get(owned, key_set, use_cache).await }.boxed();
        self.coalesce(op_key, work).await
    }

    /// Write every entry of `items`, refreshing the cache for the written keys.
    pub async fn set(&self, items: ValueMap) -> Result<(), StoreError> {
        self.set_with(items, true).await
    }

    /// Write every entry of `items` without caching them.
    pub async fn set_without_cache(&self, items: ValueMap) -> Result<(), StoreError> {
        self.set_with(items, false).await
    }

    async fn set_with(&self, items: ValueMap, update_cache: bool) -> Result<(), StoreError> {
        let keys: Vec<String> = items.keys().cloned().collect();
        let op_key = OperationKey {
            kind: OperationKind::Set,
            keys: keys.join(","),
            payload: Some(serde_json::to_string(&items)?),
        };
        let inner = Arc::clone(&self.inner);
        let work = async move {
            inner.perform_set(items, update_cache).await?;
            Ok(ValueMap::new())
        }
        .boxed();
        self.coalesce(op_key, work).await.map(|_| ())
    }

    /// Delete `keys` from the backend and drop any cache entry mentioning them.
    pub async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let op_key = OperationKey {
            kind: OperationKind::Remove,
            keys: owned.join(","),
            payload: None,
        };
        let inner = Arc::clone(&self.inner);
        let work = async move {
            inner.perform_remove(owned).await?;
            Ok(ValueMap::new())
        }
        .boxed();
        self.coalesce(op_key, work).await.map(|_| ())
    }

    /// Delete everything in the backend and empty the cache.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.inner.throttle().await;
        let backend = Arc::clone(&self.inner.backend);
        let limit = self.inner.config.timeout();
        let result = with_retry("CLEAR", &self.inner.config.retry_policy(), |_| {
            let backend = Arc::clone(&backend);
            async move { timed(limit, async move { backend.clear().await }).await }
        })
        .await
        .map_err(|failure| into_store_error("CLEAR", failure));
        {
            let mut state = self.inner.state.lock();
            state.cache.clear();
            state.record_clear();
        }
        if result.is_ok() {
            info!("Storage cleared");
        }
        result
    }

    /// Round-trip a sentinel key through the backend. Never fails.
    pub async fn health_check(&self) -> HealthReport {
        let start = Instant::now();
        let outcome = self.health_round_trip().await;
        let response_time_millis = start.elapsed().as_millis() as u64;
        let (cache_size, pending_operations) = {
            let state = self.inner.state.lock();
            (state.cache.len(), state.pending.len())
        };
        match outcome {
            Ok(()) => HealthReport {
                healthy: true,
                response_time_millis,
                cache_size,
                pending_operations,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Storage health check failed");
                HealthReport {
                    healthy: false,
                    response_time_millis,
                    cache_size,
                    pending_operations,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn health_round_trip(&self) -> Result<(), StoreError> {
        let stamp = Value::from(chrono::Utc::now().timestamp_millis());
        let mut probe = ValueMap::new();
        probe.insert(HEALTH_SENTINEL_KEY.to_string(), stamp.clone());
        self.set_without_cache(probe).await?;

        let read = self.get_uncached(&[HEALTH_SENTINEL_KEY]).await?;
        if read.get(HEALTH_SENTINEL_KEY) != Some(&stamp) {
            return Err(StoreError::Backend(
                "health probe read back a different value".to_string(),
            ));
        }

        if let Err(e) = self.remove(&[HEALTH_SENTINEL_KEY]).await {
            warn!(error = %e, "Could not clean up health probe");
        }
        Ok(())
    }

    /// Bytes used by the backend, or zero with "Unknown" when it cannot tell.
    pub async fn usage(&self) -> StorageUsage {
        let limit = self.inner.config.timeout();
        let backend = Arc::clone(&self.inner.backend);
        match timed(limit, async move { backend.bytes_in_use().await }).await {
            Ok(Some(bytes)) => StorageUsage {
                bytes_in_use: bytes,
                human_readable: format_bytes(bytes),
            },
            Ok(None) => StorageUsage {
                bytes_in_use: 0,
                human_readable: format_bytes(0),
            },
            Err(e) => {
                warn!(error = %e, "Could not get storage usage");
                StorageUsage {
                    bytes_in_use: 0,
                    human_readable: "Unknown".to_string(),
                }
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut entries: Vec<String> = state.cache.keys().cloned().collect();
        entries.sort();
        CacheStats {
            size: state.cache.len(),
            entries,
            ttl_millis: state.cache.ttl().as_millis() as u64,
        }
    }

    pub fn clear_cache(&self) {
        self.inner.state.lock().cache.clear();
        debug!("Storage cache cleared");
    }

    /// Number of distinct requests currently in flight.
    pub fn pending_operations(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Join an identical in-flight request, or start `work` as a new one.
    ///
    /// The shared future removes its own pending entry when it completes, so the
    /// entry lives exactly as long as the underlying call.
    fn coalesce(
        &self,
        op_key: OperationKey,
        work: BoxFuture<'static, Result<ValueMap, StoreError>>,
    ) -> SharedOutcome {
        let mut state = self.inner.state.lock();
        if let Some(pending) = state.pending.get(&op_key) {
            debug!(
                operation = ?op_key.kind,
                keys = %op_key.keys,
                "Joining in-flight storage request"
            );
            return pending.future.clone();
        }

        let id = self.inner.next_operation_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let entry_key = op_key.clone();
        let future = async move {
            let result = work.await;
            let mut state = inner.state.lock();
            if state.pending.get(&entry_key).is_some_and(|p| p.id == id) {
                state.pending.remove(&entry_key);
            }
            result
        }
        .boxed()
        .shared();

        state.pending.insert(
            op_key,
            PendingOperation {
                id,
                future: future.clone(),
            },
        );
        future
    }
}

impl StoreInner {
    /// Wait for the next free slot in the global operation schedule.
    async fn throttle(&self) {
        let spacing = self.config.throttle();
        if spacing.is_zero() {
            return;
        }
        let now = Instant::now();
        let slot = {
            let mut state = self.state.lock();
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + spacing);
            slot
        };
        if slot > now {
            debug!(wait_ms = (slot - now).as_millis() as u64, "Throttling storage operation");
            sleep_until(slot).await;
        }
    }

    async fn perform_get(
        self: Arc<Self>,
        keys: Vec<String>,
        key_set: String,
        use_cache: bool,
    ) -> Result<ValueMap, StoreError> {
        let started = self.state.lock().generation;
        self.throttle().await;
        let label = format!("GET {key_set}");
        let limit = self.config.timeout();
        let keys = Arc::new(keys);
        let result = with_retry(&label, &self.config.retry_policy(), |_| {
            let backend = Arc::clone(&self.backend);
            let keys = Arc::clone(&keys);
            async move { timed(limit, async move { backend.get(&keys).await }).await }
        })
        .await
        .map_err(|failure| into_store_error("GET", failure))?;

        if use_cache {
            let mut state = self.state.lock();
            // a write that landed while this read was in flight makes the result stale
            if state.written_since(&keys, started) {
                debug!(keys = %key_set, "Not caching read overtaken by a write");
            } else {
                state.cache.insert(key_set.clone(), result.clone());
            }
        }
        debug!(keys = %key_set, "Storage GET successful");
        Ok(result)
    }

    async fn perform_set(self: Arc<Self>, items: ValueMap, update_cache: bool) -> Result<(), StoreError> {
        self.throttle().await;
        let keys: Vec<String> = items.keys().cloned().collect();
        let label = format!("SET {}", keys.join(","));
        let limit = self.config.timeout();
        let items = Arc::new(items);
        let result = with_retry(&label, &self.config.retry_policy(), |_| {
            let backend = Arc::clone(&self.backend);
            let items = Arc::clone(&items);
            async move { timed(limit, async move { backend.set((*items).clone()).await }).await }
        })
        .await
        .map_err(|failure| into_store_error("SET", failure));

        let mut state = self.state.lock();
        invalidate(&mut state.cache, &keys);
        state.record_write(&keys);
        if result.is_ok() && update_cache {
            for (key, value) in items.iter() {
                let mut single = ValueMap::new();
                single.insert(key.clone(), value.clone());
                state.cache.insert(key.clone(), single);
            }
        }
        drop(state);

        if result.is_ok() {
            debug!(keys = %keys.join(","), "Storage SET successful");
        }
        result
    }

    async fn perform_remove(self: Arc<Self>, keys: Vec<String>) -> Result<(), StoreError> {
        self.throttle().await;
        let label = format!("REMOVE {}", keys.join(","));
        let limit = self.config.timeout();
        let shared_keys = Arc::new(keys.clone());
        let result = with_retry(&label, &self.config.retry_policy(), |_| {
            let backend = Arc::clone(&self.backend);
            let keys = Arc::clone(&shared_keys);
            async move { timed(limit, async move { backend.remove(&keys).await }).await }
        })
        .await
        .map_err(|failure| into_store_error("REMOVE", failure));
        let mut state = self.state.lock();
        invalidate(&mut state.cache, &keys);
        state.record_write(&keys);
        drop(state);
        result
    }
}

/// Drop every cached key-set that mentions one of `keys`.
fn invalidate(cache: &mut TtlMap<String, ValueMap>, keys: &[String]) {
    let dropped = cache.remove_where(|cached| cached.split(',').any(|k| keys.iter().any(|w| w == k)));
    if dropped > 0 {
        debug!(dropped, "Invalidated cached key-sets");
    }
}

async fn timed<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

fn into_store_error(operation: &str, failure: RetryFailure<StoreError>) -> StoreError {
    match failure {
        RetryFailure::Rejected { error, .. } => error,
        RetryFailure::Exhausted { attempts, last } => {
            warn!(operation, attempts, error = %last, "Storage operation failed after retries");
            StoreError::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                last: Box::new(last),
            }
        }
    }
}

/// Human-readable byte count: `0 B`, `512 B`, `1.5 KB`, `2 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {}", UNITS[unit])
}
