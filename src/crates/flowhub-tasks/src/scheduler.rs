//! Wall-clock scheduler for periodic discovery tasks
//!
//! Each entry enqueues its task on a fixed interval. Defaults follow
//! the crawl cadence: Product Hunt daily, GitHub Trending twice daily,
//! ArXiv daily. Index sync is not scheduled here; it is chained by the
//! tail of each discovery batch. Operators can trigger any entry
//! out-of-band by kind.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{Result, TaskError};
use crate::queue::Broker;
use crate::task::TaskSpec;

/// One periodic emission
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// Task kind to enqueue
    pub kind: String,
    /// Queue the task routes to
    pub queue: String,
    /// Payload of each emission
    pub payload: Value,
    /// Emission interval
    pub every: Duration,
    /// Attempt budget for emitted tasks
    pub max_attempts: u32,
}

impl ScheduleEntry {
    /// Create an entry
    pub fn new(
        kind: impl Into<String>,
        queue: impl Into<String>,
        payload: Value,
        every: Duration,
    ) -> Self {
        Self {
            kind: kind.into(),
            queue: queue.into(),
            payload,
            every,
            max_attempts: 3,
        }
    }

    fn to_task(&self) -> TaskSpec {
        TaskSpec::new(&self.kind, &self.queue, self.payload.clone())
            .with_max_attempts(self.max_attempts)
    }
}

/// Drives periodic task emission
pub struct PeriodicScheduler {
    broker: Arc<dyn Broker>,
    entries: Vec<ScheduleEntry>,
}

impl PeriodicScheduler {
    /// Create a scheduler over the given entries
    pub fn new(broker: Arc<dyn Broker>, entries: Vec<ScheduleEntry>) -> Self {
        Self { broker, entries }
    }

    /// Enqueue one entry immediately, by kind (operator trigger)
    pub async fn trigger(&self, kind: &str) -> Result<()> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.kind == kind)
            .ok_or_else(|| TaskError::UnknownKind(kind.to_string()))?;
        info!(kind, "out-of-band trigger");
        self.broker.enqueue(entry.to_task()).await
    }

    /// Registered kinds, ascending
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.entries.iter().map(|e| e.kind.clone()).collect();
        kinds.sort();
        kinds
    }

    /// Run interval loops until `shutdown` resolves
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()> + Send) {
        let broker = self.broker;
        let mut loops = JoinSet::new();
        let (stop_tx, _) = tokio::sync::watch::channel(false);

        for entry in self.entries {
            let broker = Arc::clone(&broker);
            let mut stop_rx = stop_tx.subscribe();
            loops.spawn(async move {
                let mut ticker = tokio::time::interval(entry.every);
                // The immediate first tick would double-crawl on restart
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            info!(kind = %entry.kind, "schedule fired");
                            if let Err(e) = broker.enqueue(entry.to_task()).await {
                                warn!(kind = %entry.kind, error = %e, "schedule enqueue failed");
                            }
                        }
                        _ = stop_rx.changed() => break,
                    }
                }
            });
        }

        shutdown.await;
        let _ = stop_tx.send(true);
        while loops.join_next().await.is_some() {}
    }
}
