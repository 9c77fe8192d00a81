use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{doc_id, Storage, StorageError};

/// Volatile backend for tests and short-lived runs.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, doc: Value) -> Result<(), StorageError> {
        let id = doc_id(&doc)?;
        self.data.write().insert(id, doc);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Value, StorageError> {
        self.data
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<Value>, StorageError> {
        Ok(self.data.read().values().cloned().collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, StorageError> {
        let data = self.data.read();
        let mut results = Vec::new();
        for doc in data.values() {
            if doc.to_string().contains(query) {
                results.push(doc.clone());
            }
        }
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.data.write().clear();
        Ok(())
    }
}
