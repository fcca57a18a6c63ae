//! Catalogue artifacts produced by the discovery pipeline

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// A tool candidate found by a crawler, before enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTool {
    /// Which crawler found it: `producthunt`, `github_trending`, `arxiv`
    pub source: String,
    /// Source-stable slug; `(source, slug)` is the dedup key
    pub slug: String,
    /// Raw source payload kept for enrichment
    pub raw_payload: Value,
    /// Discovery time
    pub discovered_at: DateTime<Utc>,
    /// Source-specific quality score (votes, stars, relevance)
    pub score: i64,
}

impl CandidateTool {
    /// The `(source, slug)` dedup key
    pub fn dedup_key(&self) -> (String, String) {
        (self.source.clone(), self.slug.clone())
    }
}

/// A fully enriched catalogue entry ready for the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueRecord {
    /// Dedup source
    pub source: String,
    /// Dedup slug
    pub slug: String,
    /// English name
    pub name_en: String,
    /// Chinese name
    pub name_zh: String,
    /// English description
    pub description_en: String,
    /// Chinese description
    pub description_zh: String,
    /// Pricing classification: `free`, `freemium`, `paid`, `unknown`
    pub pricing: String,
    /// Whether the record is ready for index sync
    pub ready: bool,
    /// Set when the last index sync attempt failed for this record
    pub index_retry_pending: bool,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary of the pipeline
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    /// Whether a record already exists for the dedup key
    async fn exists(&self, source: &str, slug: &str) -> Result<bool>;

    /// Insert-or-replace by dedup key
    async fn upsert(&self, record: CatalogueRecord) -> Result<()>;

    /// All records ready for the index
    async fn list_ready(&self) -> Result<Vec<CatalogueRecord>>;

    /// Flag records whose index sync failed, for the next attempt
    async fn mark_index_retry(&self, keys: &[(String, String)], pending: bool) -> Result<()>;

    /// Total number of records
    async fn count(&self) -> Result<usize>;
}

/// Map-backed store for tests and single-node runs
#[derive(Default)]
pub struct InMemoryCatalogueStore {
    records: Mutex<HashMap<(String, String), CatalogueRecord>>,
}

impl InMemoryCatalogueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogueStore for InMemoryCatalogueStore {
    async fn exists(&self, source: &str, slug: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .contains_key(&(source.to_string(), slug.to_string())))
    }

    async fn upsert(&self, record: CatalogueRecord) -> Result<()> {
        self.records
            .lock()
            .insert((record.source.clone(), record.slug.clone()), record);
        Ok(())
    }

    async fn list_ready(&self) -> Result<Vec<CatalogueRecord>> {
        let mut ready: Vec<CatalogueRecord> = self
            .records
            .lock()
            .values()
            .filter(|r| r.ready)
            .cloned()
            .collect();
        ready.sort_by(|a, b| (&a.source, &a.slug).cmp(&(&b.source, &b.slug)));
        Ok(ready)
    }

    async fn mark_index_retry(&self, keys: &[(String, String)], pending: bool) -> Result<()> {
        let mut records = self.records.lock();
        for key in keys {
            if let Some(record) = records.get_mut(key) {
                record.index_retry_pending = pending;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(slug: &str) -> CatalogueRecord {
        CatalogueRecord {
            source: "producthunt".to_string(),
            slug: slug.to_string(),
            name_en: "Tool".to_string(),
            name_zh: "工具".to_string(),
            description_en: "A tool".to_string(),
            description_zh: "一个工具".to_string(),
            pricing: "freemium".to_string(),
            ready: true,
            index_retry_pending: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_key() {
        let store = InMemoryCatalogueStore::new();
        store.upsert(record("x")).await.unwrap();
        store.upsert(record("x")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.exists("producthunt", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ready_sorted() {
        let store = InMemoryCatalogueStore::new();
        store.upsert(record("b")).await.unwrap();
        store.upsert(record("a")).await.unwrap();
        let mut not_ready = record("c");
        not_ready.ready = false;
        store.upsert(not_ready).await.unwrap();

        let ready = store.list_ready().await.unwrap();
        let slugs: Vec<&str> = ready.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);
    }

    #[test]
    fn test_dedup_key() {
        let candidate = CandidateTool {
            source: "arxiv".to_string(),
            slug: "2406.0001".to_string(),
            raw_payload: json!({}),
            discovered_at: Utc::now(),
            score: 10,
        };
        assert_eq!(
            candidate.dedup_key(),
            ("arxiv".to_string(), "2406.0001".to_string())
        );
    }
}
