//! Session value objects

use crate::domain::transport::CallFailure;
use serde::{Deserialize, Serialize};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, nothing sent yet
    Initiating,
    /// Outbound request sent
    Dialing,
    /// Alerting (remote for outbound, local for inbound)
    Ringing,
    /// Connected
    Active,
    /// Connected and held
    Hold,
    /// Ended normally
    Terminated,
    /// Ended by error, rejection or timeout
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Initiating => "initiating",
            SessionState::Dialing => "dialing",
            SessionState::Ringing => "ringing",
            SessionState::Active => "active",
            SessionState::Hold => "hold",
            SessionState::Terminated => "terminated",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Failed)
    }

    /// Answered and not yet ended
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Hold)
    }

    /// Apply an event, returning the resulting state if the edge exists
    pub fn next(&self, event: &SessionEvent) -> Option<SessionState> {
        if self.is_terminal() {
            return None;
        }

        match (self, event) {
            (SessionState::Initiating, SessionEvent::Dial) => Some(SessionState::Dialing),
            (SessionState::Initiating, SessionEvent::Alert) => Some(SessionState::Ringing),
            (SessionState::Dialing, SessionEvent::Alert) => Some(SessionState::Ringing),

            // 200 OK without a provisional response
            (SessionState::Dialing, SessionEvent::Answer) => Some(SessionState::Active),
            (SessionState::Ringing, SessionEvent::Answer) => Some(SessionState::Active),

            (SessionState::Active, SessionEvent::Hold) => Some(SessionState::Hold),
            (SessionState::Hold, SessionEvent::Resume) => Some(SessionState::Active),

            (_, SessionEvent::End(_)) => Some(SessionState::Terminated),
            (_, SessionEvent::Fail(_)) => Some(SessionState::Failed),

            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the session state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "reason", rename_all = "snake_case")]
pub enum SessionEvent {
    Dial,
    Alert,
    Answer,
    Hold,
    Resume,
    End(EndReason),
    Fail(CallFailure),
}

/// Why a session reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// Local user hung up
    LocalHangup,
    /// Remote party hung up
    RemoteHangup,
    /// Local user declined an inbound offer
    Declined,
    /// Call left the client through a transfer
    Transferred,
    /// Consultation leg dropped by a cancelled attended transfer
    TransferCancelled,
    /// Transport failure
    Failed(CallFailure),
}
