//! Engine event stream for observability collaborators.
//!
//! Broadcast-based: any number of subscribers, none required for
//! correctness. Events carry a monotonically increasing sequence number
//! assigned at publication.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::models::EngineState;

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EnginePayload {
    /// Phase 1 reached a goal configuration.
    CandidateFound {
        canonical_key: String,
        score: f64,
        evaluation_time_ms: u64,
    },
    /// The controller moved between lifecycle states.
    PhaseSwitch { from: EngineState, to: EngineState },
    /// Phase 1 finished (exhausted, deadline, or cancel).
    SearchFinished { candidates: usize, exhausted: bool },
    /// Phase 2 committed to a configuration.
    CandidateSelected {
        canonical_key: String,
        score: f64,
        revalidated: bool,
    },
}

/// Envelope published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: EnginePayload,
}

/// Broadcast bus for [`EngineEvent`]s. Publishing never blocks and never
/// fails; events published with no live subscriber are dropped.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    next_sequence: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, next_sequence: AtomicU64::new(0) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, payload: EnginePayload) {
        let event = EngineEvent {
            sequence: SequenceNumber(self.next_sequence.fetch_add(1, Ordering::SeqCst)),
            timestamp: Utc::now(),
            payload,
        };
        trace!(sequence = %event.sequence, "publishing engine event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_carry_increasing_sequence_numbers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(EnginePayload::SearchFinished { candidates: 1, exhausted: true });
        bus.publish(EnginePayload::PhaseSwitch {
            from: EngineState::Searching,
            to: EngineState::Selecting,
        });
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish(EnginePayload::SearchFinished { candidates: 0, exhausted: false });
    }
}
