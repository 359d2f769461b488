//! Key-value persistence
//!
//! The raw store is an unreliable asynchronous key-value API ([`KeyValueBackend`]).
//! Everything else in the crate talks to it through [`ResilientStore`], which adds
//! throttling, retry with backoff, timeouts, request coalescing and a read cache.

pub mod memory;
pub mod persistence;
pub mod resilient;
pub mod retry;

pub use memory::MemoryBackend;
pub use persistence::SledBackend;
pub use resilient::{CacheStats, HealthReport, ResilientStore, StoreConfig, StorageUsage};
pub use retry::{with_retry, RetryFailure, RetryPolicy};

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Values keyed by storage key, as returned by a read.
pub type ValueMap = Map<String, Value>;

/// Raw key-value store interface
///
/// Reads return only the keys that exist. Implementations report failures as
/// [`StoreError`]; use [`StoreError::classify`] for backends that only expose
/// messages.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, keys: &[String]) -> Result<ValueMap, StoreError>;

    async fn set(&self, items: ValueMap) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Bytes used by stored data, when the backend can tell.
    async fn bytes_in_use(&self) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }
}
