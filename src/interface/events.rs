//! Event bus to UI observers
//!
//! Core events are published in order over a broadcast channel. Slow
//! observers lag and lose the oldest events rather than stalling the core.

use crate::domain::events::{CoreEvent, EventEnvelope};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publish an event, stamping it with the next sequence number
    pub fn publish(&self, event: CoreEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Event #{} {}", sequence, event.event_type());
        let envelope = EventEnvelope {
            sequence,
            occurred_at: Utc::now(),
            event,
        };
        if self.tx.send(envelope).is_err() {
            debug!("No event subscribers");
        }
        sequence
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = CoreEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
