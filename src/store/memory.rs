//! In-process backend

use crate::error::StoreError;
use crate::store::{KeyValueBackend, ValueMap};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Non-durable backend holding values in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored value for `key`.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, keys: &[String]) -> Result<ValueMap, StoreError> {
        let data = self.data.read();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, items: ValueMap) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for (key, value) in items {
            data.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.data.write().clear();
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<Option<u64>, StoreError> {
        let data = self.data.read();
        let mut total = 0u64;
        for (key, value) in data.iter() {
            total += key.len() as u64 + serde_json::to_vec(value)?.len() as u64;
        }
        Ok(Some(total))
    }
}
