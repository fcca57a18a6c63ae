//! End-to-end fabric runs over stubbed sources and models

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use flowhub_llm::MockChatModel;
use flowhub_tasks::{
    queues, Broker, CandidateTool, CatalogueStore, DiscoveryHandler, DiscoverySource,
    EnrichmentHandler, InMemoryBroker, InMemoryCatalogueStore, Result, TaskContext, TaskHandler,
    TaskRegistry, TaskSpec, WorkerPool,
};

struct StubSource {
    candidates: Vec<CandidateTool>,
}

#[async_trait]
impl DiscoverySource for StubSource {
    fn name(&self) -> &str {
        "producthunt"
    }
    async fn fetch(&self) -> Result<Vec<CandidateTool>> {
        Ok(self.candidates.clone())
    }
    fn quality_gate(&self, candidate: &CandidateTool) -> bool {
        candidate.score >= 100
    }
}

fn candidate(slug: &str, score: i64) -> CandidateTool {
    CandidateTool {
        source: "producthunt".to_string(),
        slug: slug.to_string(),
        raw_payload: json!({"name": slug, "tagline": "ai tool"}),
        discovered_at: Utc::now(),
        score,
    }
}

fn enrichment_json(name: &str) -> String {
    format!(
        r#"{{"name_en": "{name}", "name_zh": "{name}", "description_en": "d", "description_zh": "d", "pricing": "free"}}"#
    )
}

#[tokio::test]
async fn scenario_f_discover_twice_is_idempotent() {
    let broker = Arc::new(InMemoryBroker::new());
    let catalogue = Arc::new(InMemoryCatalogueStore::new());
    let ctx = TaskContext {
        broker: broker.clone(),
        catalogue: catalogue.clone(),
    };

    let registry = TaskRegistry::new();
    let discovery = Arc::new(DiscoveryHandler::new(Arc::new(StubSource {
        candidates: vec![candidate("alpha", 300), candidate("beta", 150)],
    })));
    let enrichment = Arc::new(EnrichmentHandler::new(Arc::new(
        MockChatModel::with_responses([enrichment_json("Alpha"), enrichment_json("Beta")]),
    )));
    registry.register(discovery.clone());
    registry.register(enrichment);

    // First discovery batch
    broker
        .enqueue(TaskSpec::new(
            discovery.kind(),
            queues::CRAWLERS,
            serde_json::Value::Null,
        ))
        .await
        .unwrap();
    WorkerPool::new(queues::CRAWLERS, 1, registry.clone(), ctx.clone())
        .drain()
        .await;
    let first_index_depth = broker.depth(queues::INDEXING).await.unwrap();
    WorkerPool::new(queues::ENRICHMENT, 2, registry.clone(), ctx.clone())
        .drain()
        .await;

    assert_eq!(catalogue.count().await.unwrap(), 2);
    assert_eq!(first_index_depth, 1);

    // Second discovery over the identical payload
    broker
        .enqueue(TaskSpec::new(
            discovery.kind(),
            queues::CRAWLERS,
            serde_json::Value::Null,
        ))
        .await
        .unwrap();
    WorkerPool::new(queues::CRAWLERS, 1, registry.clone(), ctx.clone())
        .drain()
        .await;
    WorkerPool::new(queues::ENRICHMENT, 2, registry.clone(), ctx.clone())
        .drain()
        .await;

    // Row count unchanged, and exactly one more indexing task
    assert_eq!(catalogue.count().await.unwrap(), 2);
    assert_eq!(broker.depth(queues::INDEXING).await.unwrap(), 2);
}

#[tokio::test]
async fn failing_item_does_not_roll_back_siblings() {
    let broker = Arc::new(InMemoryBroker::new());
    let catalogue = Arc::new(InMemoryCatalogueStore::new());
    let ctx = TaskContext {
        broker: broker.clone(),
        catalogue: catalogue.clone(),
    };

    let registry = TaskRegistry::new();
    // First enrichment answers garbage (fatal), second is fine
    let enrichment = Arc::new(EnrichmentHandler::new(Arc::new(
        MockChatModel::with_responses(["not json at all", &enrichment_json("Beta")]),
    )));
    registry.register(enrichment.clone());

    for slug in ["alpha", "beta"] {
        broker
            .enqueue(TaskSpec::new(
                enrichment.kind(),
                queues::ENRICHMENT,
                serde_json::to_value(candidate(slug, 200)).unwrap(),
            ))
            .await
            .unwrap();
    }

    WorkerPool::new(queues::ENRICHMENT, 1, registry, ctx)
        .drain()
        .await;

    // One record landed; the other is in the dead letter
    assert_eq!(catalogue.count().await.unwrap(), 1);
    assert_eq!(broker.dead_letters().len(), 1);
}

#[tokio::test]
async fn worker_pool_run_drains_and_stops() {
    let broker = Arc::new(InMemoryBroker::new());
    let catalogue = Arc::new(InMemoryCatalogueStore::new());
    let ctx = TaskContext {
        broker: broker.clone(),
        catalogue: catalogue.clone(),
    };

    let registry = TaskRegistry::new();
    let enrichment = Arc::new(EnrichmentHandler::new(Arc::new(
        MockChatModel::with_responses([enrichment_json("Only")]),
    )));
    registry.register(enrichment.clone());

    broker
        .enqueue(TaskSpec::new(
            enrichment.kind(),
            queues::ENRICHMENT,
            serde_json::to_value(candidate("only", 200)).unwrap(),
        ))
        .await
        .unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let pool = WorkerPool::new(queues::ENRICHMENT, 2, registry, ctx)
        .with_poll_interval(Duration::from_millis(10));
    let run = tokio::spawn(pool.run(async move {
        let _ = stop_rx.await;
    }));

    // Give the pool a moment to process, then stop it
    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = stop_tx.send(());
    run.await.unwrap();

    assert_eq!(catalogue.count().await.unwrap(), 1);
}
