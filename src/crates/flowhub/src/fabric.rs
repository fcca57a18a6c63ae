//! Composition of the automation task fabric
//!
//! Wires the discovery sources, enrichment and index-sync handlers to
//! the broker and scheduler, plus the checkpoint retention sweep as a
//! periodic maintenance task.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use flowhub_llm::ChatModel;
use flowhub_tasks::{
    queues, ArxivSource, DiscoveryHandler, EnrichmentHandler, GithubTrendingSource,
    InMemoryBroker, IndexSyncHandler, PeriodicScheduler, ProductHuntSource, Result as TaskResult,
    ScheduleEntry, TaskContext, TaskHandler, TaskRegistry, WorkerPool,
};

use crate::config::ServerConfig;
use crate::db::repositories::{SqliteCatalogueStore, SqliteCheckpointStore};
use crate::db::DatabaseConnection;
use crate::shutdown::ShutdownCoordinator;

const CHECKPOINT_GC_KIND: &str = "maintenance.checkpoint_gc";

/// Periodic checkpoint retention sweep
struct CheckpointGcHandler {
    store: Arc<SqliteCheckpointStore>,
    retention: Duration,
}

#[async_trait]
impl TaskHandler for CheckpointGcHandler {
    fn kind(&self) -> &str {
        CHECKPOINT_GC_KIND
    }

    fn queue(&self) -> &str {
        queues::INDEXING
    }

    // Pure-compute maintenance gets a single attempt
    fn max_attempts(&self) -> u32 {
        1
    }

    async fn run(&self, _ctx: &TaskContext, _payload: Value) -> TaskResult<()> {
        let horizon = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        let deleted = self
            .store
            .gc_terminal_older_than(horizon)
            .await
            .map_err(|e| flowhub_tasks::TaskError::Retryable(e.to_string()))?;
        if deleted > 0 {
            info!(deleted, "checkpoint retention sweep");
        }
        Ok(())
    }
}

/// The assembled fabric, ready to run until shutdown
pub struct Fabric {
    pub broker: Arc<InMemoryBroker>,
    pub registry: TaskRegistry,
    pub ctx: TaskContext,
    pub scheduler: PeriodicScheduler,
    pools: Vec<WorkerPool>,
}

impl Fabric {
    /// Wire sources, handlers, queues and schedules from configuration
    pub fn build(
        config: &ServerConfig,
        db: DatabaseConnection,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let catalogue = Arc::new(SqliteCatalogueStore::new(db.pool().clone()));
        let ctx = TaskContext {
            broker: broker.clone(),
            catalogue,
        };

        let registry = TaskRegistry::new();
        let producthunt_token =
            std::env::var("FLOWHUB_PRODUCTHUNT_TOKEN").unwrap_or_default();
        registry.register(Arc::new(DiscoveryHandler::new(Arc::new(
            ProductHuntSource::new(producthunt_token, config.producthunt_min_votes),
        ))));
        registry.register(Arc::new(DiscoveryHandler::new(Arc::new(
            GithubTrendingSource::new(),
        ))));
        registry.register(Arc::new(DiscoveryHandler::new(Arc::new(ArxivSource::new()))));
        registry.register(Arc::new(EnrichmentHandler::new(model)));
        registry.register(Arc::new(IndexSyncHandler::new(
            &config.search_endpoint,
            &config.search_api_key,
        )));
        registry.register(Arc::new(CheckpointGcHandler {
            store: Arc::new(SqliteCheckpointStore::new(db.pool().clone())),
            retention: config.checkpoint_retention,
        }));

        let entries = vec![
            ScheduleEntry::new(
                "discover.producthunt",
                queues::CRAWLERS,
                Value::Null,
                config.producthunt_every,
            ),
            ScheduleEntry::new(
                "discover.github_trending",
                queues::CRAWLERS,
                Value::Null,
                config.github_every,
            ),
            ScheduleEntry::new(
                "discover.arxiv",
                queues::CRAWLERS,
                Value::Null,
                config.arxiv_every,
            ),
            ScheduleEntry::new(
                CHECKPOINT_GC_KIND,
                queues::INDEXING,
                json!({}),
                Duration::from_secs(6 * 3600),
            ),
        ];
        let scheduler = PeriodicScheduler::new(broker.clone(), entries);

        let pools = vec![
            WorkerPool::new(queues::CRAWLERS, 2, registry.clone(), ctx.clone()),
            WorkerPool::new(queues::ENRICHMENT, 4, registry.clone(), ctx.clone()),
            WorkerPool::new(queues::INDEXING, 1, registry.clone(), ctx.clone()),
        ];

        Self {
            broker,
            registry,
            ctx,
            scheduler,
            pools,
        }
    }

    /// Run the scheduler and all worker pools until shutdown
    pub async fn run(self, shutdown: ShutdownCoordinator) {
        let mut handles = Vec::new();

        let scheduler_shutdown = shutdown.clone();
        handles.push(tokio::spawn(self.scheduler.run(async move {
            scheduler_shutdown.wait().await;
        })));

        for pool in self.pools {
            let pool_shutdown = shutdown.clone();
            handles.push(tokio::spawn(pool.run(async move {
                pool_shutdown.wait().await;
            })));
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!("task fabric stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhub_llm::MockChatModel;
    use flowhub_tasks::Broker;

    #[tokio::test]
    async fn test_fabric_registers_all_kinds() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        let fabric = Fabric::build(
            &ServerConfig::default(),
            db,
            Arc::new(MockChatModel::new()),
        );

        let kinds = fabric.registry.kinds();
        for expected in [
            "discover.arxiv",
            "discover.github_trending",
            "discover.producthunt",
            "enrich.candidate",
            "index.sync",
            CHECKPOINT_GC_KIND,
        ] {
            assert!(kinds.iter().any(|k| k == expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_operator_trigger_by_kind() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        let fabric = Fabric::build(
            &ServerConfig::default(),
            db,
            Arc::new(MockChatModel::new()),
        );

        fabric.scheduler.trigger("discover.arxiv").await.unwrap();
        assert_eq!(fabric.broker.depth(queues::CRAWLERS).await.unwrap(), 1);
    }
}
