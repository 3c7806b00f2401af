//! Blind and attended transfer workflows

use super::Softphone;
use crate::domain::session::{EndReason, Session, SessionEvent, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{RemoteParty, SessionId, TransferId};
use crate::domain::transfer::{Disposition, TransferKind, TransferRecord};
use crate::interface::metrics;
use tracing::{debug, info, warn};

impl Softphone {
    /// Hand a connected call to `destination` without consultation.
    ///
    /// A refusal from the far end leaves the call untouched and returns the
    /// rejected record; only transport failures are errors.
    pub async fn blind_transfer(
        &mut self,
        session: Option<SessionId>,
        destination: &str,
    ) -> Result<TransferRecord> {
        let session = self.target(session)?;
        let id = session.id();
        ensure_connected(&session)?;
        let handle = Self::handle_of(&session)?;

        let transfer = self.transfers.begin(TransferKind::Blind, id, destination)?;
        self.flush();
        let destination = destination.trim();

        match self.transport.blind_refer(&handle, destination).await {
            Ok(()) => {
                let record = self.finish_transfer(transfer, Disposition::Accepted, None)?;
                if let Err(e) = self.transport.terminate(&handle).await {
                    debug!("Transferred session {} already gone: {}", id, e);
                }
                self.end_session(id, EndReason::Transferred).await;
                info!("Session {} transferred to {}", id, destination);
                self.flush();
                Ok(record)
            }
            Err(e) if e.is_rejection() => {
                warn!("Transfer of session {} to {} refused: {}", id, destination, e);
                let record =
                    self.finish_transfer(transfer, Disposition::Rejected, Some(e.to_string()))?;
                self.flush();
                Ok(record)
            }
            Err(e) => {
                warn!("Transfer of session {} failed: {}", id, e);
                self.finish_transfer(transfer, Disposition::Rejected, Some(e.to_string()))?;
                self.flush();
                Err(e.into())
            }
        }
    }

    /// Hold the call and dial `destination` as a consultation leg.
    /// Returns the consultation session.
    pub async fn start_attended_transfer(
        &mut self,
        session: Option<SessionId>,
        destination: &str,
    ) -> Result<SessionId> {
        let session = self.target(session)?;
        let original = session.id();
        ensure_connected(&session)?;
        Self::handle_of(&session)?;

        let transfer = self
            .transfers
            .begin(TransferKind::Attended, original, destination)?;
        self.flush();
        let destination = destination.trim();

        if session.state() == SessionState::Active {
            if let Err(e) = self.set_hold(Some(original), true).await {
                self.finish_transfer(transfer, Disposition::Rejected, Some(e.to_string()))?;
                self.flush();
                return Err(e);
            }
        }

        let consultation = match self
            .switchboard
            .create_consultation_session(RemoteParty::new(destination, None), original)
        {
            Ok(id) => id,
            Err(e) => {
                self.finish_transfer(transfer, Disposition::Rejected, Some(e.to_string()))?;
                self.resume_original(original).await;
                self.flush();
                return Err(e);
            }
        };
        self.transfers.attach_consultation(transfer, consultation)?;
        metrics::record_call_placed();
        self.flush();

        info!(
            "Consulting {} for session {} as session {}",
            destination, original, consultation
        );
        // A failed consultation settles the record through the leg-ended hook
        self.place_call(consultation, destination).await?;
        self.flush();
        Ok(consultation)
    }

    /// Join the original caller with the consultation party
    pub async fn complete_attended_transfer(
        &mut self,
        original: Option<SessionId>,
    ) -> Result<TransferRecord> {
        let targeted = self.target(original)?;
        let (transfer, original, consultation) = self.pending_attended(&targeted)?;

        let consult_session = self
            .switchboard
            .get(&consultation)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("session {}", consultation)))?;
        ensure_connected(&consult_session)?;

        let original_handle = Self::handle_of(&original)?;
        let consult_handle = Self::handle_of(&consult_session)?;

        if let Err(e) = self
            .transport
            .attended_refer(&original_handle, &consult_handle)
            .await
        {
            warn!("Attended transfer of session {} refused: {}", original.id(), e);
            self.finish_transfer(transfer, Disposition::Rejected, Some(e.to_string()))?;
            self.flush();
            return Err(e.into());
        }

        let record = self.finish_transfer(
            transfer,
            Disposition::Completed,
            Some(format!("replaced {}", consult_handle)),
        )?;

        for (id, handle) in [
            (original.id(), &original_handle),
            (consultation, &consult_handle),
        ] {
            if let Err(e) = self.transport.terminate(handle).await {
                debug!("Transferred leg {} already gone: {}", id, e);
            }
            self.end_session(id, EndReason::Transferred).await;
        }

        info!(
            "Attended transfer of session {} completed via session {}",
            original.id(),
            consultation
        );
        self.flush();
        Ok(record)
    }

    /// Drop the consultation leg and return to the original caller
    pub async fn cancel_attended_transfer(
        &mut self,
        original: Option<SessionId>,
    ) -> Result<TransferRecord> {
        let targeted = self.target(original)?;
        let (transfer, original, consultation) = self.pending_attended(&targeted)?;

        let record = self.finish_transfer(
            transfer,
            Disposition::Cancelled,
            Some("cancelled by user".to_string()),
        )?;

        if let Some(handle) = self
            .switchboard
            .get(&consultation)
            .and_then(|s| s.handle().cloned())
        {
            if let Err(e) = self.transport.terminate(&handle).await {
                debug!("Consultation leg {} already gone: {}", consultation, e);
            }
        }
        self.end_session(consultation, EndReason::TransferCancelled)
            .await;
        self.resume_original(original.id()).await;

        info!("Attended transfer of session {} cancelled", original.id());
        self.flush();
        Ok(record)
    }

    pub fn active_transfer(&self, session: &SessionId) -> Option<&TransferRecord> {
        self.transfers.active_for(session)
    }

    pub fn transfer_history(&self) -> &[TransferRecord] {
        self.transfers.history()
    }

    /// Settle transfers that depend on a leg that just ended
    pub(super) async fn on_transfer_leg_ended(&mut self, session: &Session) {
        let id = session.id();

        if let Some(record) = self.transfers.active_by_consultation(&id) {
            let transfer = record.id;
            let original = record.session_id;
            let (disposition, detail) = match session.end_reason() {
                Some(EndReason::Failed(failure)) => (
                    Disposition::Rejected,
                    format!("consultation failed: {:?}", failure),
                ),
                Some(EndReason::RemoteHangup) => (
                    Disposition::Cancelled,
                    "consultation party hung up".to_string(),
                ),
                _ => (
                    Disposition::Cancelled,
                    "consultation ended".to_string(),
                ),
            };
            if let Err(e) = self.finish_transfer(transfer, disposition, Some(detail)) {
                warn!("Failed to settle transfer {}: {}", transfer, e);
            }
            self.resume_original(original).await;
            return;
        }

        if let Some(record) = self.transfers.active_for(&id) {
            if record.kind == TransferKind::Attended {
                // The consultation call carries on by itself
                let transfer = record.id;
                if let Err(e) = self.finish_transfer(
                    transfer,
                    Disposition::Cancelled,
                    Some("original call ended".to_string()),
                ) {
                    warn!("Failed to settle transfer {}: {}", transfer, e);
                }
            }
        }
    }

    async fn resume_original(&mut self, original: SessionId) {
        let Some(session) = self.switchboard.get(&original).cloned() else {
            return;
        };
        if session.state() != SessionState::Hold {
            return;
        }
        let Some(handle) = session.handle().cloned() else {
            return;
        };

        match self.transport.unhold(&handle).await {
            Ok(()) => {
                if let Err(e) = self.switchboard.transition(original, SessionEvent::Resume) {
                    warn!("Failed to resume session {}: {}", original, e);
                }
            }
            Err(e) => warn!("Session {} stays on hold, resume refused: {}", original, e),
        }
    }

    /// Pending attended transfer reached from either leg. The consultation
    /// leg holds focus once dialed, so it resolves back to the original.
    fn pending_attended(&self, targeted: &Session) -> Result<(TransferId, Session, SessionId)> {
        let id = targeted.id();
        let record = self
            .transfers
            .active_for(&id)
            .filter(|r| r.kind == TransferKind::Attended)
            .or_else(|| self.transfers.active_by_consultation(&id))
            .ok_or_else(|| {
                DomainError::InvalidOperation(format!(
                    "No attended transfer pending for session {}",
                    id
                ))
            })?;
        let consultation = record.consultation_session_id.ok_or_else(|| {
            DomainError::InvalidOperation(format!(
                "Transfer {} has no consultation leg yet",
                record.id
            ))
        })?;

        let original = if record.session_id == id {
            targeted.clone()
        } else {
            self.switchboard
                .get(&record.session_id)
                .cloned()
                .ok_or_else(|| DomainError::NotFound(format!("session {}", record.session_id)))?
        };
        Ok((record.id, original, consultation))
    }

    fn finish_transfer(
        &mut self,
        transfer: TransferId,
        disposition: Disposition,
        detail: Option<String>,
    ) -> Result<TransferRecord> {
        let record = self.transfers.dispose(transfer, disposition, detail)?;
        metrics::record_transfer(
            match record.kind {
                TransferKind::Blind => "blind",
                TransferKind::Attended => "attended",
            },
            match record.disposition {
                Disposition::Pending => "pending",
                Disposition::Accepted => "accepted",
                Disposition::Completed => "completed",
                Disposition::Rejected => "rejected",
                Disposition::Cancelled => "cancelled",
            },
        );
        Ok(record)
    }
}

fn ensure_connected(session: &Session) -> Result<()> {
    if session.state().is_connected() {
        Ok(())
    } else {
        Err(DomainError::InvalidOperation(format!(
            "Session {} is not connected ({})",
            session.id(),
            session.state()
        )))
    }
}
