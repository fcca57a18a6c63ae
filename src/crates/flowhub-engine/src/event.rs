//! Per-execution step event stream
//!
//! Every state change of a run is a [`StepEvent`] with a strictly
//! increasing `seq`. The [`EventBus`] serializes appends, retains a
//! bounded replay buffer, and fans events out to any number of
//! subscribers. When the buffer bound is exceeded the oldest `token`
//! events are dropped first; terminal and lifecycle events are always
//! retained.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Kind of a step event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventKind {
    /// Node evaluation dispatched
    Started,
    /// One streamed content chunk from an LLM node
    Token,
    /// Node evaluation finished with a value
    Completed,
    /// Node evaluation failed
    Failed,
    /// Node was never dispatched in this run
    Skipped,
    /// Node evaluation observed cancellation
    Cancelled,
}

impl StepEventKind {
    /// String form used in SSE `event:` fields and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StepEventKind::Started => "started",
            StepEventKind::Token => "token",
            StepEventKind::Completed => "completed",
            StepEventKind::Failed => "failed",
            StepEventKind::Skipped => "skipped",
            StepEventKind::Cancelled => "cancelled",
        }
    }
}

/// One entry of an execution's step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Strictly increasing per execution
    pub seq: u64,
    /// Node this event belongs to; empty for run-level events
    pub node_id: String,
    /// Emission time
    pub at: DateTime<Utc>,
    /// Event kind
    pub kind: StepEventKind,
    /// Kind-specific payload
    pub payload: Value,
}

struct BusInner {
    next_seq: u64,
    buffer: VecDeque<StepEvent>,
    buffer_bound: usize,
    subscribers: Vec<mpsc::UnboundedSender<StepEvent>>,
    closed: bool,
}

impl BusInner {
    fn trim(&mut self) {
        while self.buffer.len() > self.buffer_bound {
            // Drop the oldest token event; if none remain, drop the
            // oldest event outright rather than grow unbounded
            let position = self
                .buffer
                .iter()
                .position(|e| e.kind == StepEventKind::Token);
            match position {
                Some(index) => {
                    self.buffer.remove(index);
                }
                None => {
                    self.buffer.pop_front();
                }
            }
        }
    }
}

/// Ordered, replayable event channel for one execution
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create a bus retaining at most `buffer_bound` events for replay
    pub fn new(buffer_bound: usize) -> Self {
        Self::with_start(buffer_bound, 1)
    }

    /// Create a bus whose first event gets `next_seq`; used when
    /// resuming an execution so sequence numbers stay monotonic
    pub fn with_start(buffer_bound: usize, next_seq: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_seq: next_seq.max(1),
                buffer: VecDeque::new(),
                buffer_bound: buffer_bound.max(16),
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Append an event, assigning the next sequence number
    pub fn emit(&self, node_id: impl Into<String>, kind: StepEventKind, payload: Value) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let event = StepEvent {
            seq,
            node_id: node_id.into(),
            at: Utc::now(),
            kind,
            payload,
        };

        inner.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        inner.buffer.push_back(event);
        inner.trim();
        seq
    }

    /// Subscribe from `after_seq + 1`: buffered events newer than
    /// `after_seq` are replayed first, live events follow in order
    pub fn subscribe(&self, after_seq: u64) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        for event in inner.buffer.iter().filter(|e| e.seq > after_seq) {
            // Send cannot fail: we hold the receiver
            let _ = tx.send(event.clone());
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        EventSubscription {
            stream: UnboundedReceiverStream::new(rx),
        }
    }

    /// Stop accepting subscribers and drop live senders, ending all
    /// subscription streams after their queued events drain
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    /// Highest sequence number assigned so far
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().next_seq - 1
    }

    /// Snapshot of the replay buffer
    pub fn buffered(&self) -> Vec<StepEvent> {
        self.inner.lock().buffer.iter().cloned().collect()
    }
}

/// A subscriber's ordered view of the event stream
pub struct EventSubscription {
    stream: UnboundedReceiverStream<StepEvent>,
}

impl EventSubscription {
    /// Consume the subscription as a stream
    pub fn into_stream(self) -> UnboundedReceiverStream<StepEvent> {
        self.stream
    }

    /// Receive the next event, `None` when the bus closed
    pub async fn next(&mut self) -> Option<StepEvent> {
        use tokio_stream::StreamExt;
        self.stream.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seq_strictly_increasing() {
        let bus = EventBus::new(64);
        let s1 = bus.emit("a", StepEventKind::Started, json!({}));
        let s2 = bus.emit("a", StepEventKind::Completed, json!({}));
        let s3 = bus.emit("b", StepEventKind::Started, json!({}));
        assert!(s1 < s2 && s2 < s3);
    }

    #[tokio::test]
    async fn test_replay_from_cursor() {
        let bus = EventBus::new(64);
        bus.emit("a", StepEventKind::Started, json!({}));
        bus.emit("a", StepEventKind::Completed, json!({}));
        bus.emit("b", StepEventKind::Started, json!({}));

        let mut sub = bus.subscribe(1);
        assert_eq!(sub.next().await.unwrap().seq, 2);
        assert_eq!(sub.next().await.unwrap().seq, 3);
    }

    #[tokio::test]
    async fn test_live_events_follow_replay() {
        let bus = EventBus::new(64);
        bus.emit("a", StepEventKind::Started, json!({}));

        let mut sub = bus.subscribe(0);
        bus.emit("a", StepEventKind::Completed, json!({}));

        assert_eq!(sub.next().await.unwrap().seq, 1);
        assert_eq!(sub.next().await.unwrap().seq, 2);
    }

    #[test]
    fn test_token_events_dropped_first_under_pressure() {
        let bus = EventBus::new(16);
        bus.emit("a", StepEventKind::Started, json!({}));
        for _ in 0..40 {
            bus.emit("a", StepEventKind::Token, json!({"content": "x"}));
        }
        bus.emit("a", StepEventKind::Completed, json!({}));

        let buffered = bus.buffered();
        assert!(buffered.len() <= 16);
        assert!(buffered.iter().any(|e| e.kind == StepEventKind::Started));
        assert!(buffered.iter().any(|e| e.kind == StepEventKind::Completed));
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let bus = EventBus::new(16);
        bus.emit("a", StepEventKind::Started, json!({}));
        let mut sub = bus.subscribe(0);
        bus.close();

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }
}
