//! Event types and the broadcast event bus
//!
//! Job progress is published as [`ReplayEvent`]s on an [`EventBus`]; the
//! HTTP layer forwards them to SSE clients. Publishing never blocks and
//! never fails the publisher: a bus with no subscribers drops events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Job lifecycle events
///
/// Serialized with a `type` tag so SSE clients can dispatch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReplayEvent {
    /// Job accepted and waiting in the work queue
    JobQueued {
        job_id: String,
        track_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Job entered a new processing phase
    JobPhaseChanged {
        job_id: String,
        phase: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress inside the current phase (e.g. chunks converted)
    JobProgress {
        job_id: String,
        current: usize,
        total: usize,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job finished successfully
    JobCompleted {
        job_id: String,
        output_path: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Job failed
    JobFailed {
        job_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Job observed a stop request
    JobStopped {
        job_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Job record removed
    JobCleared {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ReplayEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ReplayEvent::JobQueued { .. } => "JobQueued",
            ReplayEvent::JobPhaseChanged { .. } => "JobPhaseChanged",
            ReplayEvent::JobProgress { .. } => "JobProgress",
            ReplayEvent::JobCompleted { .. } => "JobCompleted",
            ReplayEvent::JobFailed { .. } => "JobFailed",
            ReplayEvent::JobStopped { .. } => "JobStopped",
            ReplayEvent::JobCleared { .. } => "JobCleared",
        }
    }

    /// Id of the job this event concerns
    pub fn job_id(&self) -> &str {
        match self {
            ReplayEvent::JobQueued { job_id, .. }
            | ReplayEvent::JobPhaseChanged { job_id, .. }
            | ReplayEvent::JobProgress { job_id, .. }
            | ReplayEvent::JobCompleted { job_id, .. }
            | ReplayEvent::JobFailed { job_id, .. }
            | ReplayEvent::JobStopped { job_id, .. }
            | ReplayEvent::JobCleared { job_id, .. } => job_id,
        }
    }
}

/// Broadcast bus for [`ReplayEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReplayEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ReplayEvent,
    ) -> Result<usize, broadcast::error::SendError<ReplayEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ReplayEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(id: &str) -> ReplayEvent {
        ReplayEvent::JobStopped {
            job_id: id.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(stopped("abc")).unwrap();
        assert_eq!(json["type"], "JobStopped");
        assert_eq!(json["job_id"], "abc");
    }

    #[test]
    fn test_event_type_and_job_id() {
        let event = ReplayEvent::JobProgress {
            job_id: "j1".to_string(),
            current: 1,
            total: 4,
            message: "Converting chunk 1/4".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "JobProgress");
        assert_eq!(event.job_id(), "j1");
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(8);
        assert!(bus.emit(stopped("x")).is_err());
        // Lossy variant must not panic
        bus.emit_lossy(stopped("x"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(stopped("first"));
        bus.emit_lossy(stopped("second"));

        assert_eq!(rx.recv().await.unwrap().job_id(), "first");
        assert_eq!(rx.recv().await.unwrap().job_id(), "second");
    }

    #[test]
    fn test_capacity_reported() {
        assert_eq!(EventBus::new(100).capacity(), 100);
    }
}
