use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{doc_id, Storage, StorageError};
use crate::config::FileStorageConfig;

const STORE_FILE: &str = "assets.json";

/// Backend that keeps every asset document in one JSON object on disk,
/// keyed by asset id. The whole store is rewritten on each save; asset
/// documents are small and saves are already coalesced upstream.
pub struct FileStorage {
    path: PathBuf,
    data: RwLock<HashMap<String, Value>>,
}

impl FileStorage {
    pub async fn open(config: &FileStorageConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.output_dir).await?;
        let path = config.output_dir.join(STORE_FILE);

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "file storage ready at {} ({} assets on disk)",
            path.display(),
            data.len()
        );

        Ok(FileStorage {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &HashMap<String, Value>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, doc: Value) -> Result<(), StorageError> {
        let id = doc_id(&doc)?;
        let mut data = self.data.write().await;
        data.insert(id, doc);
        self.persist(&data).await
    }

    async fn get(&self, id: &str) -> Result<Value, StorageError> {
        self.data
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<Value>, StorageError> {
        Ok(self.data.read().await.values().cloned().collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, StorageError> {
        let data = self.data.read().await;
        let mut results = Vec::new();
        for doc in data.values() {
            if doc.to_string().contains(query) {
                results.push(doc.clone());
            }
        }
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        if data.remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.persist(&data).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        let data = self.data.read().await;
        debug!("flushing {} assets to {}", data.len(), self.path.display());
        self.persist(&data).await
    }
}
