//! Transport capability port
//!
//! The signaling/media engine is an external collaborator. The core talks to
//! it through [`TransportCapability`] and receives its callbacks as
//! [`TransportEvent`] values, which are fed into the dispatch loop one at a
//! time. Adapters live in the infrastructure layer.

use crate::config::AccountConfig;
use crate::domain::connection::RegistrationState;
use crate::domain::shared::value_objects::{
    DtmfTone, RemoteParty, SubscriptionHandle, TransportHandle,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Remote party or server declined the request
    #[error("Rejected ({code}): {reason}")]
    Rejected { code: u16, reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn rejected(code: u16, reason: impl Into<String>) -> Self {
        TransportError::Rejected {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Rejected { .. })
    }
}

/// Why an inbound offer is being declined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// All lines occupied (486 Busy Here)
    Busy,
    /// User declined the call (603 Decline)
    Declined,
}

impl RejectReason {
    pub fn sip_response_code(&self) -> u16 {
        match self {
            RejectReason::Busy => 486,
            RejectReason::Declined => 603,
        }
    }
}

/// Options for an outbound session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundOptions {
    pub display_name: Option<String>,
    pub ice_gathering_timeout: Duration,
}

/// Why the transport failed a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum CallFailure {
    Rejected(u16),
    Busy,
    NoAnswer,
    Timeout,
    MediaFailure(String),
    TransportLost,
}

/// Session state as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum TransportSessionState {
    /// Provisional response (remote is alerting)
    Progress,
    /// Session confirmed and media flowing
    Established,
    /// Remote ended the session normally
    Terminated,
    /// Session failed
    Failed(CallFailure),
}

/// Callbacks raised by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    TransportConnected,
    TransportDisconnected {
        error: String,
    },
    RegistrationStateChanged {
        state: RegistrationState,
    },
    SessionStateChanged {
        handle: TransportHandle,
        state: TransportSessionState,
    },
    InboundOffer {
        handle: TransportHandle,
        remote: RemoteParty,
    },
    DtmfReceived {
        handle: TransportHandle,
        tone: DtmfTone,
    },
    PresenceNotify {
        subscription: SubscriptionHandle,
        dialog_state: String,
        remote_target: Option<String>,
    },
    PresenceRejected {
        subscription: SubscriptionHandle,
        reason: String,
    },
    KeepAliveTimeout,
    /// Any successful exchange with the server, unrelated to keep-alive
    Activity,
}

/// Narrow capability interface onto the signaling/media engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportCapability: Send + Sync {
    /// Open the signaling socket
    async fn connect(&self) -> Result<(), TransportError>;

    async fn register(&self, account: &AccountConfig) -> Result<(), TransportError>;

    async fn deregister(&self) -> Result<(), TransportError>;

    async fn create_outbound_session(
        &self,
        target: &str,
        options: &OutboundOptions,
    ) -> Result<TransportHandle, TransportError>;

    /// Resolves once ICE/media negotiation for the session is ready
    async fn await_media_ready(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn accept_inbound_offer(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn reject_inbound_offer(
        &self,
        handle: &TransportHandle,
        reason: RejectReason,
    ) -> Result<(), TransportError>;

    async fn terminate(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn hold(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn unhold(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn mute(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn unmute(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    async fn send_dtmf(&self, handle: &TransportHandle, tone: DtmfTone) -> Result<(), TransportError>;

    /// REFER without consultation. `Ok` means the transfer was accepted.
    async fn blind_refer(&self, handle: &TransportHandle, target: &str) -> Result<(), TransportError>;

    /// REFER with Replaces pointing at the consultation leg
    async fn attended_refer(
        &self,
        handle: &TransportHandle,
        replaces: &TransportHandle,
    ) -> Result<(), TransportError>;

    async fn subscribe_presence(&self, extension: &str) -> Result<SubscriptionHandle, TransportError>;

    async fn unsubscribe_presence(&self, handle: &SubscriptionHandle) -> Result<(), TransportError>;

    /// `Err(TransportError::Timeout)` when the probe went unanswered
    async fn send_keep_alive(&self) -> Result<(), TransportError>;
}
