//! Domain errors

use crate::domain::shared::value_objects::{LineNumber, SessionId};
use crate::domain::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Session {0} is already terminal")]
    AlreadyTerminal(SessionId),

    #[error("Line {line} is occupied by session {occupant}")]
    LineOccupied {
        line: LineNumber,
        occupant: SessionId,
    },

    #[error("All lines are busy")]
    AllLinesBusy,

    #[error("Transfer already in progress for session {0}")]
    TransferInProgress(SessionId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Softphone runtime stopped")]
    RuntimeStopped,
}
