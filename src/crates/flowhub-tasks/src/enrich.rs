//! LLM enrichment of discovered candidates
//!
//! Produces bilingual name/description and a pricing classification,
//! then upserts the catalogue record. The LLM answer must be a JSON
//! object; the shared repair pass tolerates fenced or prefixed output.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use flowhub_llm::{json_repair, ChatMessage, ChatModel, ChatRequest};

use crate::catalogue::{CandidateTool, CatalogueRecord};
use crate::error::{Result, TaskError};
use crate::pipeline::{decode_candidate, ENRICH_KIND};
use crate::task::{queues, TaskContext, TaskHandler};

const SYSTEM_PROMPT: &str = "You are a catalogue editor for an AI tool directory \
serving Chinese and English readers. Answer with a single JSON object with keys \
name_en, name_zh, description_en, description_zh, pricing. The pricing value \
must be one of: free, freemium, paid, unknown.";

const PRICING_VALUES: &[&str] = &["free", "freemium", "paid", "unknown"];

/// Enrichment task handler
pub struct EnrichmentHandler {
    model: Arc<dyn ChatModel>,
}

impl EnrichmentHandler {
    /// Create a handler over the shared chat model
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn prompt_for(candidate: &CandidateTool) -> String {
        format!(
            "Source: {}\nSlug: {}\nRaw metadata:\n{}\n\nProduce the catalogue entry JSON.",
            candidate.source, candidate.slug, candidate.raw_payload
        )
    }

    /// Map the model's JSON into a record, defaulting odd fields
    pub(crate) fn record_from(candidate: &CandidateTool, enriched: &Value) -> CatalogueRecord {
        let text = |key: &str| {
            enriched
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let pricing_raw = text("pricing").to_lowercase();
        let pricing = if PRICING_VALUES.contains(&pricing_raw.as_str()) {
            pricing_raw
        } else {
            "unknown".to_string()
        };

        CatalogueRecord {
            source: candidate.source.clone(),
            slug: candidate.slug.clone(),
            name_en: text("name_en"),
            name_zh: text("name_zh"),
            description_en: text("description_en"),
            description_zh: text("description_zh"),
            pricing,
            ready: true,
            index_retry_pending: false,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl TaskHandler for EnrichmentHandler {
    fn kind(&self) -> &str {
        ENRICH_KIND
    }

    fn queue(&self) -> &str {
        queues::ENRICHMENT
    }

    async fn run(&self, ctx: &TaskContext, payload: Value) -> Result<()> {
        let candidate = decode_candidate(payload)?;

        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(Self::prompt_for(&candidate)),
        ])
        .with_json_output(true);

        let response = self
            .model
            .chat(request)
            .await
            .map_err(|e| TaskError::Retryable(e.to_string()))?;

        let enriched = json_repair::parse_or_repair(&response.content)
            .map(|(value, _)| value)
            .ok_or_else(|| {
                TaskError::Fatal(format!(
                    "enrichment for {}/{} returned non-JSON",
                    candidate.source, candidate.slug
                ))
            })?;

        let record = Self::record_from(&candidate, &enriched);
        debug!(source = %record.source, slug = %record.slug, "enriched catalogue record");
        ctx.catalogue.upsert(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueStore, InMemoryCatalogueStore};
    use crate::queue::InMemoryBroker;
    use flowhub_llm::MockChatModel;
    use serde_json::json;

    fn candidate() -> CandidateTool {
        CandidateTool {
            source: "producthunt".to_string(),
            slug: "agent-kit".to_string(),
            raw_payload: json!({"name": "Agent Kit", "tagline": "build agents fast"}),
            discovered_at: Utc::now(),
            score: 300,
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

    #[tokio::test]
    async fn test_enrichment_upserts_record() {
        let (catalogue, ctx) = ctx();
        let model = Arc::new(MockChatModel::with_responses([r#"{
            "name_en": "Agent Kit",
            "name_zh": "智能体套件",
            "description_en": "Build agents fast",
            "description_zh": "快速构建智能体",
            "pricing": "freemium"
        }"#]));

        let handler = EnrichmentHandler::new(model);
        let payload = serde_json::to_value(candidate()).unwrap();
        handler.run(&ctx, payload).await.unwrap();

        assert!(catalogue.exists("producthunt", "agent-kit").await.unwrap());
        let ready = catalogue.list_ready().await.unwrap();
        assert_eq!(ready[0].name_zh, "智能体套件");
        assert_eq!(ready[0].pricing, "freemium");
    }

    #[tokio::test]
    async fn test_fenced_json_is_repaired() {
        let (catalogue, ctx) = ctx();
        let model = Arc::new(MockChatModel::with_responses([
            "```json\n{\"name_en\": \"X\", \"name_zh\": \"X\", \"description_en\": \"d\", \"description_zh\": \"d\", \"pricing\": \"paid\"}\n```",
        ]));

        let handler = EnrichmentHandler::new(model);
        handler
            .run(&ctx, serde_json::to_value(candidate()).unwrap())
            .await
            .unwrap();
        assert_eq!(catalogue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_pricing_normalized() {
        let record = EnrichmentHandler::record_from(
            &candidate(),
            &json!({"name_en": "X", "pricing": "enterprise-only"}),
        );
        assert_eq!(record.pricing, "unknown");
    }

    #[tokio::test]
    async fn test_non_json_response_is_fatal() {
        let (_, ctx) = ctx();
        let model = Arc::new(MockChatModel::with_responses(["I cannot help with that"]));
        let handler = EnrichmentHandler::new(model);

        let err = handler
            .run(&ctx, serde_json::to_value(candidate()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Fatal(_)));
    }
}
