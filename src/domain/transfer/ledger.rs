//! Transfer ledger
//!
//! Holds every transfer record and enforces one pending transfer per
//! originating session.

use crate::domain::events::{CoreEvent, Outbox};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{SessionId, TransferId};
use crate::domain::transfer::record::{Disposition, TransferKind, TransferRecord};
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

#[derive(Default)]
pub struct TransferLedger {
    records: Vec<TransferRecord>,
    active: HashMap<SessionId, TransferId>,
    outbox: Outbox,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(
        &mut self,
        kind: TransferKind,
        session_id: SessionId,
        destination: &str,
    ) -> Result<TransferId> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(DomainError::ValidationError(
                "Transfer destination must not be empty".to_string(),
            ));
        }
        if self.active.contains_key(&session_id) {
            return Err(DomainError::TransferInProgress(session_id));
        }

        let record = TransferRecord::new(kind, session_id, destination.to_string());
        let id = record.id;
        info!(
            "{:?} transfer {} of session {} to {}",
            kind, id, session_id, destination
        );

        self.outbox.record(CoreEvent::TransferInitiated {
            record: record.clone(),
        });
        self.active.insert(session_id, id);
        self.records.push(record);
        Ok(id)
    }

    pub fn attach_consultation(&mut self, id: TransferId, consultation: SessionId) -> Result<()> {
        let record = self.record_mut(id)?;
        record.consultation_session_id = Some(consultation);
        Ok(())
    }

    /// Finalize a pending record. Disposing twice is an error.
    pub fn dispose(
        &mut self,
        id: TransferId,
        disposition: Disposition,
        detail: Option<String>,
    ) -> Result<TransferRecord> {
        if !disposition.is_final() {
            return Err(DomainError::InvalidOperation(
                "Cannot dispose a transfer as pending".to_string(),
            ));
        }

        let record = self.record_mut(id)?;
        if record.disposition.is_final() {
            return Err(DomainError::InvalidOperation(format!(
                "Transfer {} already {:?}",
                id, record.disposition
            )));
        }

        record.disposition = disposition;
        record.disposed_at = Some(Utc::now());
        record.detail = detail;
        let record = record.clone();

        self.active.remove(&record.session_id);
        info!("Transfer {} {:?}", id, disposition);
        self.outbox.record(CoreEvent::TransferCompleted {
            record: record.clone(),
        });
        Ok(record)
    }

    /// Pending transfer originating from the session
    pub fn active_for(&self, session_id: &SessionId) -> Option<&TransferRecord> {
        self.active.get(session_id).and_then(|id| self.get(*id))
    }

    /// Pending attended transfer whose consultation leg is the session
    pub fn active_by_consultation(&self, consultation: &SessionId) -> Option<&TransferRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.is_active() && r.consultation_session_id == Some(*consultation))
    }

    pub fn get(&self, id: TransferId) -> Option<&TransferRecord> {
        self.records.iter().rev().find(|r| r.id == id)
    }

    pub fn history(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        self.outbox.take_events()
    }

    fn record_mut(&mut self, id: TransferId) -> Result<&mut TransferRecord> {
        self.records
            .iter_mut()
            .rev()
            .find(|r| r.id == id)
            .ok_or_else(|| DomainError::NotFound(format!("transfer {}", id)))
    }
}
