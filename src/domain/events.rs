//! Events raised by the core for UI observers
//!
//! Components record events into an outbox while they mutate state; the
//! softphone drains the outboxes after each operation and publishes them in
//! order.

use crate::domain::connection::{HealthTier, RegistrationState, TransportState};
use crate::domain::line::Line;
use crate::domain::presence::Presence;
use crate::domain::session::{Direction, EndReason, SessionState};
use crate::domain::shared::value_objects::{DtmfTone, LineNumber, RemoteParty, SessionId};
use crate::domain::transfer::TransferRecord;
use crate::domain::transport::RejectReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    SessionCreated {
        session_id: SessionId,
        direction: Direction,
        remote: RemoteParty,
        line: Option<LineNumber>,
    },
    SessionStateChanged {
        session_id: SessionId,
        from: SessionState,
        to: SessionState,
    },
    SessionTerminated {
        session_id: SessionId,
        state: SessionState,
        reason: EndReason,
    },
    LineStateChanged {
        line: Line,
    },
    LineSelected {
        line: LineNumber,
    },
    InboundRejected {
        remote: RemoteParty,
        reason: RejectReason,
    },
    DtmfReceived {
        session_id: SessionId,
        tone: DtmfTone,
    },
    BlfStateChanged {
        extension: String,
        presence: Presence,
    },
    TransferInitiated {
        record: TransferRecord,
    },
    TransferCompleted {
        record: TransferRecord,
    },
    RegistrationStateChanged {
        state: RegistrationState,
    },
    TransportStateChanged {
        state: TransportState,
    },
    ConnectivityHealthChanged {
        tier: HealthTier,
    },
}

impl CoreEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CoreEvent::SessionCreated { .. } => "session.created",
            CoreEvent::SessionStateChanged { .. } => "session.state_changed",
            CoreEvent::SessionTerminated { .. } => "session.terminated",
            CoreEvent::LineStateChanged { .. } => "line.state_changed",
            CoreEvent::LineSelected { .. } => "line.selected",
            CoreEvent::InboundRejected { .. } => "session.inbound_rejected",
            CoreEvent::DtmfReceived { .. } => "session.dtmf_received",
            CoreEvent::BlfStateChanged { .. } => "blf.state_changed",
            CoreEvent::TransferInitiated { .. } => "transfer.initiated",
            CoreEvent::TransferCompleted { .. } => "transfer.completed",
            CoreEvent::RegistrationStateChanged { .. } => "connection.registration_changed",
            CoreEvent::TransportStateChanged { .. } => "connection.transport_changed",
            CoreEvent::ConnectivityHealthChanged { .. } => "connection.health_changed",
        }
    }
}

/// Event with delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonic per-softphone sequence number
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub event: CoreEvent,
}

/// Ordered buffer of pending events
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<CoreEvent>,
}

impl Outbox {
    pub fn record(&mut self, event: CoreEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
