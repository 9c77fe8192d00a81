//! Document-oriented persistence for asset records. Backends store
//! JSON documents keyed by the document's `id` field.

pub mod elasticsearch;
pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{StorageConfig, StorageKind};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("asset document has no id field")]
    MissingId,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Upsert a document; the id is taken from its `id` field.
    async fn save(&self, doc: Value) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Value, StorageError>;

    async fn list_all(&self) -> Result<Vec<Value>, StorageError>;

    /// Substring search over the serialised documents.
    async fn search(&self, query: &str) -> Result<Vec<Value>, StorageError>;

    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;

    fn export_json(&self, value: &Value) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec_pretty(value)?)
    }
}

/// Pull the mandatory `id` field out of an asset document.
pub fn doc_id(doc: &Value) -> Result<String, StorageError> {
    doc.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(StorageError::MissingId)
}

/// Construct the configured backend. A backend that cannot be
/// initialised is a startup failure, not a silent fallback.
pub async fn build(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.kind {
        StorageKind::File => Ok(Arc::new(file::FileStorage::open(&config.file).await?)),
        StorageKind::Elasticsearch => Ok(Arc::new(
            elasticsearch::ElasticsearchStorage::connect(&config.elasticsearch).await?,
        )),
        StorageKind::Memory => Ok(Arc::new(memory::MemoryStorage::new())),
    }
}
