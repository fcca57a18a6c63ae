//! Search index synchronization
//!
//! A sync is a full resync of the catalogue's ready subset. Partial or
//! failed pushes flag the affected records so the next attempt knows
//! what is stale; re-running a successful sync is a no-op for the
//! index because the push is keyed by `(source, slug)`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Result, TaskError};
use crate::pipeline::INDEX_KIND;
use crate::task::{queues, TaskContext, TaskHandler};

/// Index sync task handler
pub struct IndexSyncHandler {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl IndexSyncHandler {
    /// Create a handler pushing to the search service
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TaskHandler for IndexSyncHandler {
    fn kind(&self) -> &str {
        INDEX_KIND
    }

    fn queue(&self) -> &str {
        queues::INDEXING
    }

    async fn run(&self, ctx: &TaskContext, _payload: Value) -> Result<()> {
        let ready = ctx.catalogue.list_ready().await?;
        if ready.is_empty() {
            info!("index sync: nothing ready");
            return Ok(());
        }

        let keys: Vec<(String, String)> = ready
            .iter()
            .map(|r| (r.source.clone(), r.slug.clone()))
            .collect();

        let documents: Vec<Value> = ready
            .iter()
            .map(|r| {
                json!({
                    "id": format!("{}:{}", r.source, r.slug),
                    "name_en": r.name_en,
                    "name_zh": r.name_zh,
                    "description_en": r.description_en,
                    "description_zh": r.description_zh,
                    "pricing": r.pricing,
                    "source": r.source,
                })
            })
            .collect();

        let response = self
            .client
            .post(format!("{}/documents/sync", self.endpoint.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({"documents": documents}))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                ctx.catalogue.mark_index_retry(&keys, false).await?;
                info!(documents = keys.len(), "index sync complete");
                Ok(())
            }
            Ok(response) => {
                // Next-attempt tombstone: flag everything we tried
                ctx.catalogue.mark_index_retry(&keys, true).await?;
                warn!(status = %response.status(), "index sync rejected");
                Err(TaskError::Retryable(format!(
                    "search index returned {}",
                    response.status()
                )))
            }
            Err(e) => {
                ctx.catalogue.mark_index_retry(&keys, true).await?;
                Err(TaskError::transport(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueRecord, CatalogueStore, InMemoryCatalogueStore};
    use crate::queue::InMemoryBroker;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn record(slug: &str) -> CatalogueRecord {
        CatalogueRecord {
            source: "producthunt".to_string(),
            slug: slug.to_string(),
            name_en: "X".to_string(),
            name_zh: "X".to_string(),
            description_en: String::new(),
            description_zh: String::new(),
            pricing: "free".to_string(),
            ready: true,
            index_retry_pending: false,
            updated_at: Utc::now(),
        }
    }

    fn ctx() -> (Arc<InMemoryCatalogueStore>, TaskContext) {
        let catalogue = Arc::new(InMemoryCatalogueStore::new());
        (
            catalogue.clone(),
            TaskContext {
                broker: Arc::new(InMemoryBroker::new()),
                catalogue,
            },
        )
    }

    async fn spawn_endpoint(status_line: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 65536];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_empty_catalogue_is_noop() {
        let (_, ctx) = ctx();
        let handler = IndexSyncHandler::new("http://127.0.0.1:1", "key");
        // No ready records, no push attempted, no error
        handler.run(&ctx, Value::Null).await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_sync_clears_retry_flags() {
        let (catalogue, ctx) = ctx();
        catalogue.upsert(record("a")).await.unwrap();
        let endpoint = spawn_endpoint("200 OK").await;

        let handler = IndexSyncHandler::new(endpoint, "key");
        handler.run(&ctx, Value::Null).await.unwrap();

        let ready = catalogue.list_ready().await.unwrap();
        assert!(!ready[0].index_retry_pending);
    }

    #[tokio::test]
    async fn test_failed_sync_flags_records_and_retries() {
        let (catalogue, ctx) = ctx();
        catalogue.upsert(record("a")).await.unwrap();
        let endpoint = spawn_endpoint("503 Service Unavailable").await;

        let handler = IndexSyncHandler::new(endpoint, "key");
        let err = handler.run(&ctx, Value::Null).await.unwrap_err();
        assert!(err.is_retryable());

        let ready = catalogue.list_ready().await.unwrap();
        assert!(ready[0].index_retry_pending);
    }
}
