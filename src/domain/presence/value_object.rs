//! Presence value objects

use serde::{Deserialize, Serialize};

/// Presence shown on a BLF key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Available,
    Busy,
    Ringing,
    Hold,
    /// Subscription dropped with the transport, waiting to be recreated
    Inactive,
    /// Subscription rejected
    Offline,
    /// No notification received yet
    Unknown,
}

impl Presence {
    pub fn as_str(&self) -> &str {
        match self {
            Presence::Available => "available",
            Presence::Busy => "busy",
            Presence::Ringing => "ringing",
            Presence::Hold => "hold",
            Presence::Inactive => "inactive",
            Presence::Offline => "offline",
            Presence::Unknown => "unknown",
        }
    }

    /// Map a dialog-info state to presence
    pub fn from_dialog_state(state: &DialogState) -> Presence {
        match state {
            DialogState::Terminated => Presence::Available,
            DialogState::Early => Presence::Ringing,
            DialogState::Confirmed => Presence::Busy,
            DialogState::Other => Presence::Unknown,
        }
    }
}

impl Default for Presence {
    fn default() -> Self {
        Presence::Unknown
    }
}

/// Dialog state carried by a presence notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Early,
    Confirmed,
    Terminated,
    Other,
}

impl DialogState {
    pub fn parse(value: &str) -> DialogState {
        match value.trim().to_ascii_lowercase().as_str() {
            "early" => DialogState::Early,
            "confirmed" => DialogState::Confirmed,
            "terminated" => DialogState::Terminated,
            _ => DialogState::Other,
        }
    }
}

/// Presence for a raw dialog state string
pub fn presence_for(dialog_state: &str) -> Presence {
    Presence::from_dialog_state(&DialogState::parse(dialog_state))
}
