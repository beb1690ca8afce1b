//! In-memory implementation of [`StateStore`].

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{StateStore, StoreError};

/// In-memory keyed-collection store.
///
/// Each collection is a vector of `(key, value)` pairs so insertion order is
/// preserved; `put` on an existing key replaces the value in place. Not
/// persistent -- all data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<(String, serde_json::Value)>>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    async fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock();
        let records = collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => records.push((key.to_string(), value)),
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .and_then(|records| records.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone()))
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        if let Some(records) = self.collections.lock().get_mut(collection) {
            records.retain(|(k, _)| k != key);
        }
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.lock().remove(collection);
        Ok(())
    }

    async fn values(&self, collection: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|records| records.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }
}
