//! Broker abstraction and the in-memory implementation
//!
//! A task is leased by exactly one worker at a time. A lease that is
//! neither acked nor nacked before its timeout re-queues the task, so a
//! crashed worker never strands work.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::task::TaskSpec;

/// A task held by a worker under a lease
#[derive(Debug, Clone)]
pub struct LeasedTask {
    /// Lease id used for ack/nack
    pub lease_id: Uuid,
    /// The leased task, with `attempt` already incremented
    pub task: TaskSpec,
}

/// Queue transport shared by workers and producers
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a task onto its queue
    async fn enqueue(&self, task: TaskSpec) -> Result<()>;

    /// Lease the next runnable task of a queue, if any
    async fn lease(&self, queue: &str, lease_timeout: std::time::Duration)
        -> Result<Option<LeasedTask>>;

    /// Acknowledge successful completion
    async fn ack(&self, lease_id: Uuid) -> Result<()>;

    /// Return a failed task; it is re-queued no earlier than `not_before`
    async fn nack(&self, lease_id: Uuid, not_before: Option<DateTime<Utc>>) -> Result<()>;

    /// Move a task to the dead letter after exhausted retries
    async fn dead_letter(&self, lease_id: Uuid) -> Result<()>;

    /// Number of runnable plus delayed tasks in a queue
    async fn depth(&self, queue: &str) -> Result<usize>;
}

struct Lease {
    task: TaskSpec,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<TaskSpec>>,
    leases: HashMap<Uuid, Lease>,
    dead: Vec<TaskSpec>,
}

/// Process-local broker used by tests and single-node deployments
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks that exhausted their attempts
    pub fn dead_letters(&self) -> Vec<TaskSpec> {
        self.state.lock().dead.clone()
    }

    /// Re-queue tasks whose lease expired
    fn reap_expired(state: &mut BrokerState) {
        let now = Utc::now();
        let expired: Vec<Uuid> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for lease_id in expired {
            if let Some(lease) = state.leases.remove(&lease_id) {
                warn!(task = %lease.task.id, kind = %lease.task.kind, "lease expired, re-queueing");
                state
                    .queues
                    .entry(lease.task.queue.clone())
                    .or_default()
                    .push_back(lease.task);
            }
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, task: TaskSpec) -> Result<()> {
        let mut state = self.state.lock();
        state
            .queues
            .entry(task.queue.clone())
            .or_default()
            .push_back(task);
        Ok(())
    }

    async fn lease(
        &self,
        queue: &str,
        lease_timeout: std::time::Duration,
    ) -> Result<Option<LeasedTask>> {
        let mut state = self.state.lock();
        Self::reap_expired(&mut state);

        let now = Utc::now();
        let Some(tasks) = state.queues.get_mut(queue) else {
            return Ok(None);
        };

        // First runnable task wins; delayed tasks rotate to the back
        let mut picked = None;
        for _ in 0..tasks.len() {
            let Some(task) = tasks.pop_front() else { break };
            match task.not_before {
                Some(not_before) if not_before > now => tasks.push_back(task),
                _ => {
                    picked = Some(task);
                    break;
                }
            }
        }

        let Some(mut task) = picked else {
            return Ok(None);
        };
        task.attempt += 1;

        let lease_id = Uuid::new_v4();
        let expires_at = now
            + ChronoDuration::from_std(lease_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(60));
        state.leases.insert(
            lease_id,
            Lease {
                task: task.clone(),
                expires_at,
            },
        );

        Ok(Some(LeasedTask { lease_id, task }))
    }

    async fn ack(&self, lease_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        state
            .leases
            .remove(&lease_id)
            .map(|_| ())
            .ok_or_else(|| TaskError::Broker(format!("unknown lease {}", lease_id)))
    }

    async fn nack(&self, lease_id: Uuid, not_before: Option<DateTime<Utc>>) -> Result<()> {
        let mut state = self.state.lock();
        let lease = state
            .leases
            .remove(&lease_id)
            .ok_or_else(|| TaskError::Broker(format!("unknown lease {}", lease_id)))?;
        let mut task = lease.task;
        task.not_before = not_before;
        state
            .queues
            .entry(task.queue.clone())
            .or_default()
            .push_back(task);
        Ok(())
    }

    async fn dead_letter(&self, lease_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let lease = state
            .leases
            .remove(&lease_id)
            .ok_or_else(|| TaskError::Broker(format!("unknown lease {}", lease_id)))?;
        warn!(task = %lease.task.id, kind = %lease.task.kind, attempts = lease.task.attempt,
              "task dead-lettered");
        state.dead.push(lease.task);
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        let mut state = self.state.lock();
        Self::reap_expired(&mut state);
        Ok(state.queues.get(queue).map(VecDeque::len).unwrap_or(0))
    }
}
