//! Real-time event hub.
//!
//! Fan-out of status-change events to long-lived subscribers (WebSocket
//! streams). Broadcast is best-effort: events are serialized once, delivered
//! in order to each subscriber, and slow subscribers fall behind in their
//! bounded buffer and are dropped rather than blocking producers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::models::{TaskRun, Worker, WorkflowRun};

/// Default per-subscriber buffer capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Kind of real-time event being broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A workflow run changed state.
    WorkflowStatus,
    /// A task run changed state.
    TaskStatus,
    /// A worker sent a heartbeat.
    WorkerHeartbeat,
}

/// JSON envelope sent to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

impl Event {
    pub fn workflow_status(run: &WorkflowRun) -> Self {
        Self {
            event_type: EventType::WorkflowStatus,
            payload: serde_json::to_value(run).unwrap_or(Value::Null),
        }
    }

    pub fn task_status(run: &TaskRun) -> Self {
        Self {
            event_type: EventType::TaskStatus,
            payload: serde_json::to_value(run).unwrap_or(Value::Null),
        }
    }

    pub fn worker_heartbeat(worker: &Worker) -> Self {
        Self {
            event_type: EventType::WorkerHeartbeat,
            payload: serde_json::to_value(worker).unwrap_or(Value::Null),
        }
    }
}

/// Multicast hub for scheduler and worker lifecycle events.
///
/// Cheap to clone; all clones share the same subscriber set.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Arc<str>>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Serialize `event` once and deliver it to every current subscriber.
    /// A no-op with zero subscribers or once `cancel` has fired.
    pub fn broadcast(&self, cancel: &CancellationToken, event: &Event) {
        if cancel.is_cancelled() {
            return;
        }
        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                warn!(error = %err, "failed to serialize event, dropping");
                return;
            }
        };
        // send() errors only when there are no subscribers, which is fine.
        let _ = self.sender.send(frame);
    }

    /// Register a new subscriber. The receiver observes events in broadcast
    /// order; if it lags past its buffer it is disconnected.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
