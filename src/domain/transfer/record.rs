//! Transfer record

use crate::domain::shared::value_objects::{SessionId, TransferId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Blind,
    Attended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Pending,
    /// Blind transfer accepted by the far end
    Accepted,
    /// Attended transfer merged
    Completed,
    Rejected,
    Cancelled,
}

impl Disposition {
    pub fn is_final(&self) -> bool {
        !matches!(self, Disposition::Pending)
    }
}

/// Audit trail of one transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub kind: TransferKind,
    pub session_id: SessionId,
    pub destination: String,
    pub initiated_at: DateTime<Utc>,
    pub disposition: Disposition,
    pub disposed_at: Option<DateTime<Utc>>,
    /// Consultation leg of an attended transfer
    pub consultation_session_id: Option<SessionId>,
    /// Free-form outcome detail (rejection reason, completion note)
    pub detail: Option<String>,
}

impl TransferRecord {
    pub fn new(kind: TransferKind, session_id: SessionId, destination: String) -> Self {
        Self {
            id: TransferId::new(),
            kind,
            session_id,
            destination,
            initiated_at: Utc::now(),
            disposition: Disposition::Pending,
            disposed_at: None,
            consultation_session_id: None,
            detail: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.disposition.is_final()
    }
}
