//! Worker pools draining the queues
//!
//! Each pool polls one queue with bounded concurrency. A failing task
//! is re-queued with exponential backoff (base 60s, factor 2, jitter)
//! until its attempt budget runs out, then dead-lettered. One failing
//! item never affects its siblings.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::queue::{Broker, LeasedTask};
use crate::registry::TaskRegistry;
use crate::task::TaskContext;

/// Retry backoff tuning
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay before the second attempt
    pub base: Duration,
    /// Multiplier per further attempt
    pub factor: f64,
    /// Jitter fraction
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` attempts (1-indexed)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = self.base.as_secs_f64() * self.factor.powi(exponent);
        let jitter_factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64(base * jitter_factor)
    }
}

/// A worker pool bound to one queue
pub struct WorkerPool {
    queue: String,
    concurrency: usize,
    registry: TaskRegistry,
    ctx: TaskContext,
    retry: RetryPolicy,
    lease_timeout: Duration,
    poll_interval: Duration,
}

impl WorkerPool {
    /// Create a pool for `queue` with the given worker count
    pub fn new(
        queue: impl Into<String>,
        concurrency: usize,
        registry: TaskRegistry,
        ctx: TaskContext,
    ) -> Self {
        Self {
            queue: queue.into(),
            concurrency: concurrency.max(1),
            registry,
            ctx,
            retry: RetryPolicy::default(),
            lease_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the poll interval (tests use a short one)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run workers until `shutdown` resolves
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()> + Send) {
        info!(queue = %self.queue, workers = self.concurrency, "worker pool starting");
        let pool = Arc::new(self);
        let mut workers = JoinSet::new();
        let (stop_tx, _) = tokio::sync::watch::channel(false);

        for worker_id in 0..pool.concurrency {
            let pool = Arc::clone(&pool);
            let mut stop_rx = stop_tx.subscribe();
            workers.spawn(async move {
                loop {
                    if *stop_rx.borrow() {
                        break;
                    }
                    match pool.ctx.broker.lease(&pool.queue, pool.lease_timeout).await {
                        Ok(Some(leased)) => pool.process(leased).await,
                        Ok(None) => {
                            tokio::select! {
                                _ = tokio::time::sleep(pool.poll_interval) => {}
                                _ = stop_rx.changed() => {}
                            }
                        }
                        Err(e) => {
                            error!(queue = %pool.queue, worker = worker_id, error = %e,
                                   "broker lease failed");
                            tokio::time::sleep(pool.poll_interval).await;
                        }
                    }
                }
            });
        }

        shutdown.await;
        let _ = stop_tx.send(true);
        while workers.join_next().await.is_some() {}
        info!("worker pool stopped");
    }

    /// Drain one queue until it is empty; used by tests and the
    /// operator's out-of-band trigger path
    pub async fn drain(&self) {
        while let Ok(Some(leased)) = self.ctx.broker.lease(&self.queue, self.lease_timeout).await {
            self.process(leased).await;
        }
    }

    async fn process(&self, leased: LeasedTask) {
        let LeasedTask { lease_id, task } = leased;
        debug!(kind = %task.kind, attempt = task.attempt, "task leased");

        let handler = match self.registry.resolve(&task.kind) {
            Ok(handler) => handler,
            Err(e) => {
                error!(kind = %task.kind, error = %e, "no handler; dead-lettering");
                let _ = self.ctx.broker.dead_letter(lease_id).await;
                return;
            }
        };

        match handler.run(&self.ctx, task.payload.clone()).await {
            Ok(()) => {
                if let Err(e) = self.ctx.broker.ack(lease_id).await {
                    error!(kind = %task.kind, error = %e, "ack failed");
                }
            }
            Err(e) if e.is_retryable() && task.attempt < task.max_attempts => {
                let delay = self.retry.delay_after(task.attempt);
                let not_before = Utc::now()
                    + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(60));
                tracing::warn!(kind = %task.kind, attempt = task.attempt, error = %e,
                               delay_s = delay.as_secs(), "task failed, retrying");
                let _ = self.ctx.broker.nack(lease_id, Some(not_before)).await;
            }
            Err(e) => {
                error!(kind = %task.kind, attempt = task.attempt, error = %e,
                       "task failed permanently");
                let _ = self.ctx.broker.dead_letter(lease_id).await;
            }
        }
    }
}
