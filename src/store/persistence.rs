//! Durable sled-backed key-value backend

use crate::error::StoreError;
use crate::store::{KeyValueBackend, ValueMap};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

const TREE_VALUES: &str = "tabpin_values";

/// Sled-based implementation of [`KeyValueBackend`]
///
/// Each storage key maps to one JSON-encoded value in a dedicated tree.
#[derive(Clone)]
pub struct SledBackend {
    values: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a database at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(to_store_error)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let values = db.open_tree(TREE_VALUES).map_err(to_store_error)?;
        Ok(Self { values })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.values.flush().map_err(to_store_error)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for SledBackend {
    async fn get(&self, keys: &[String]) -> Result<ValueMap, StoreError> {
        let mut out = ValueMap::new();
        for key in keys {
            let Some(raw) = self.values.get(key.as_bytes()).map_err(to_store_error)? else {
                continue;
            };
            let value: Value = serde_json::from_slice(&raw)?;
            out.insert(key.clone(), value);
        }
        Ok(out)
    }

    async fn set(&self, items: ValueMap) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (key, value) in &items {
            batch.insert(key.as_bytes(), serde_json::to_vec(value)?);
        }
        self.values.apply_batch(batch).map_err(to_store_error)?;
        self.values.flush_async().await.map_err(to_store_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(key.as_bytes());
        }
        self.values.apply_batch(batch).map_err(to_store_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.values.clear().map_err(to_store_error)?;
        self.values.flush_async().await.map_err(to_store_error)?;
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<Option<u64>, StoreError> {
        let mut total = 0u64;
        for item in self.values.iter() {
            let (key, value) = item.map_err(to_store_error)?;
            total += (key.len() + value.len()) as u64;
        }
        Ok(Some(total))
    }
}

fn to_store_error(err: sled::Error) -> StoreError {
    match &err {
        sled::Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            StoreError::PermissionDenied(err.to_string())
        }
        sled::Error::Corruption { .. } => StoreError::Unavailable(err.to_string()),
        _ => StoreError::classify(err.to_string()),
    }
}
