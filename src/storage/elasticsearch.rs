use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::info;

use super::{doc_id, Storage, StorageError};
use crate::config::ElasticsearchConfig;

const DEFAULT_URL: &str = "http://localhost:9200";
const LIST_PAGE_SIZE: usize = 10_000;

/// Minimal Elasticsearch document backend: one index, document id =
/// asset id. Only the handful of endpoints the asset store needs.
pub struct ElasticsearchStorage {
    client: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchStorage {
    /// Build the client and verify the cluster answers; an unreachable
    /// cluster is a startup failure.
    pub async fn connect(config: &ElasticsearchConfig) -> Result<Self, StorageError> {
        let base_url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let index = if config.index.is_empty() {
            "assets".to_string()
        } else {
            config.index.clone()
        };

        let storage = ElasticsearchStorage {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            index,
            username: config.username.clone(),
            password: config.password.clone(),
        };

        let response = storage
            .request(storage.client.get(&storage.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::UnexpectedStatus(response.status()));
        }

        info!(
            "elasticsearch storage ready at {} (index {})",
            storage.base_url, storage.index
        );
        Ok(storage)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => {
                builder.basic_auth(user, Some(pass))
            }
            _ => builder,
        }
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, id)
    }

    async fn run_search(&self, body: Value) -> Result<Vec<Value>, StorageError> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let response = self.request(self.client.post(&url)).json(&body).send().await?;

        // A missing index just means nothing has been stored yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StorageError::UnexpectedStatus(response.status()));
        }

        let mut result: Value = response.json().await?;
        let hits = match result["hits"]["hits"].take() {
            Value::Array(hits) => hits,
            _ => return Ok(Vec::new()),
        };

        Ok(hits
            .into_iter()
            .filter_map(|mut hit| match hit["_source"].take() {
                Value::Null => None,
                source => Some(source),
            })
            .collect())
    }
}

#[async_trait]
impl Storage for ElasticsearchStorage {
    async fn save(&self, doc: Value) -> Result<(), StorageError> {
        let id = doc_id(&doc)?;
        let url = format!("{}?refresh=true", self.doc_url(&id));
        let response = self.request(self.client.put(&url)).json(&doc).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::UnexpectedStatus(response.status()));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Value, StorageError> {
        let response = self
            .request(self.client.get(&self.doc_url(id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::UnexpectedStatus(response.status()));
        }

        let mut result: Value = response.json().await?;
        match result["_source"].take() {
            Value::Null => Err(StorageError::NotFound(id.to_string())),
            source => Ok(source),
        }
    }

    async fn list_all(&self) -> Result<Vec<Value>, StorageError> {
        self.run_search(json!({
            "query": { "match_all": {} },
            "size": LIST_PAGE_SIZE,
        }))
        .await
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, StorageError> {
        self.run_search(json!({
            "query": { "query_string": { "query": query } },
            "size": LIST_PAGE_SIZE,
        }))
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let response = self
            .request(self.client.delete(&self.doc_url(id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::UnexpectedStatus(response.status()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
