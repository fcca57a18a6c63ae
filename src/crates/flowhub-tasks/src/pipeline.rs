//! The uniform discovery pipeline
//!
//! fetch -> quality gate -> dedup against the catalogue -> one
//! enrichment task per fresh candidate -> exactly one indexing task per
//! batch, enqueued even when the batch found nothing new so the index
//! converges after out-of-band catalogue edits.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::catalogue::CandidateTool;
use crate::error::{Result, TaskError};
use crate::sources::DiscoverySource;
use crate::task::{queues, TaskContext, TaskHandler, TaskSpec};

/// Task kind of the enrichment step
pub const ENRICH_KIND: &str = "enrich.candidate";
/// Task kind of the index sync step
pub const INDEX_KIND: &str = "index.sync";

/// Discovery task handler wrapping one source
pub struct DiscoveryHandler {
    kind: String,
    source: Arc<dyn DiscoverySource>,
}

impl DiscoveryHandler {
    /// Wrap a source; the task kind becomes `discover.<source>`
    pub fn new(source: Arc<dyn DiscoverySource>) -> Self {
        Self {
            kind: format!("discover.{}", source.name()),
            source,
        }
    }
}

#[async_trait]
impl TaskHandler for DiscoveryHandler {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn queue(&self) -> &str {
        queues::CRAWLERS
    }

    async fn run(&self, ctx: &TaskContext, _payload: Value) -> Result<()> {
        let fetched = self.source.fetch().await?;
        let total = fetched.len();

        let mut fresh = 0usize;
        for candidate in fetched {
            if !self.source.quality_gate(&candidate) {
                continue;
            }
            if ctx
                .catalogue
                .exists(&candidate.source, &candidate.slug)
                .await?
            {
                continue;
            }

            let payload = serde_json::to_value(&candidate)?;
            ctx.broker
                .enqueue(TaskSpec::new(ENRICH_KIND, queues::ENRICHMENT, payload))
                .await?;
            fresh += 1;
        }

        // One indexing task per batch, regardless of fresh count
        ctx.broker
            .enqueue(TaskSpec::new(INDEX_KIND, queues::INDEXING, Value::Null))
            .await?;

        info!(source = %self.source.name(), total, fresh, "discovery batch complete");
        Ok(())
    }
}

/// Decode a candidate payload, failing fatally on malformed input
pub(crate) fn decode_candidate(payload: Value) -> Result<CandidateTool> {
    serde_json::from_value(payload)
        .map_err(|e| TaskError::Fatal(format!("bad candidate payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueRecord, CatalogueStore, InMemoryCatalogueStore};
    use crate::queue::{Broker, InMemoryBroker};
    use chrono::Utc;
    use serde_json::json;

    struct FixedSource {
        candidates: Vec<CandidateTool>,
        min_score: i64,
    }

    #[async_trait]
    impl DiscoverySource for FixedSource {
        fn name(&self) -> &str {
            "producthunt"
        }
        async fn fetch(&self) -> Result<Vec<CandidateTool>> {
            Ok(self.candidates.clone())
        }
        fn quality_gate(&self, candidate: &CandidateTool) -> bool {
            candidate.score >= self.min_score
        }
    }

    fn candidate(slug: &str, score: i64) -> CandidateTool {
        CandidateTool {
            source: "producthunt".to_string(),
            slug: slug.to_string(),
            raw_payload: json!({"name": slug}),
            discovered_at: Utc::now(),
            score,
        }
    }

    fn ctx() -> (Arc<InMemoryBroker>, Arc<InMemoryCatalogueStore>, TaskContext) {
        let broker = Arc::new(InMemoryBroker::new());
        let catalogue = Arc::new(InMemoryCatalogueStore::new());
        let ctx = TaskContext {
            broker: broker.clone(),
            catalogue: catalogue.clone(),
        };
        (broker, catalogue, ctx)
    }

    #[tokio::test]
    async fn test_pipeline_gates_dedups_and_chains_index() {
        let (broker, catalogue, ctx) = ctx();

        // "known" already sits in the catalogue
        catalogue
            .upsert(CatalogueRecord {
                source: "producthunt".to_string(),
                slug: "known".to_string(),
                name_en: "Known".to_string(),
                name_zh: "已知".to_string(),
                description_en: String::new(),
                description_zh: String::new(),
                pricing: "unknown".to_string(),
                ready: true,
                index_retry_pending: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let handler = DiscoveryHandler::new(Arc::new(FixedSource {
            candidates: vec![
                candidate("fresh", 250),
                candidate("low-votes", 3),
                candidate("known", 500),
            ],
            min_score: 100,
        }));

        handler.run(&ctx, Value::Null).await.unwrap();

        // Only "fresh" produced an enrichment task
        assert_eq!(broker.depth(queues::ENRICHMENT).await.unwrap(), 1);
        // Exactly one indexing task per batch
        assert_eq!(broker.depth(queues::INDEXING).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_still_chains_index() {
        let (broker, _, ctx) = ctx();
        let handler = DiscoveryHandler::new(Arc::new(FixedSource {
            candidates: vec![],
            min_score: 100,
        }));

        handler.run(&ctx, Value::Null).await.unwrap();
        assert_eq!(broker.depth(queues::ENRICHMENT).await.unwrap(), 0);
        assert_eq!(broker.depth(queues::INDEXING).await.unwrap(), 1);
    }

    #[test]
    fn test_decode_candidate_fatal_on_garbage() {
        assert!(matches!(
            decode_candidate(json!({"nope": true})),
            Err(TaskError::Fatal(_))
        ));
    }
}
