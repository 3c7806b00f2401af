//! User call actions

use super::{call_failure, Softphone};
use crate::domain::session::{Direction, EndReason, Session, SessionEvent, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{
    DtmfTone, LineNumber, RemoteParty, SessionId, TransportHandle,
};
use crate::domain::transport::{CallFailure, OutboundOptions, RejectReason, TransportError};
use crate::interface::metrics;
use tokio::time::timeout;
use tracing::{debug, info, warn};

impl Softphone {
    /// Place an outbound call on the selected line, or the next free one
    pub async fn dial(&mut self, target: &str) -> Result<SessionId> {
        let target = validate_target(target)?;
        let id = self
            .switchboard
            .create_session(Direction::Outgoing, RemoteParty::new(target, None))?;
        metrics::record_call_placed();
        self.flush();

        let result = self.place_call(id, target).await;
        self.flush();
        result.map(|_| id)
    }

    /// Put an admitted outbound session on the wire and wait for media
    pub(super) async fn place_call(&mut self, id: SessionId, target: &str) -> Result<()> {
        let options = OutboundOptions {
            display_name: self.config.account.display_name.clone(),
            ice_gathering_timeout: self.config.timers.ice_ready_timeout(),
        };

        let handle = match self.transport.create_outbound_session(target, &options).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Outbound call {} to {} failed: {}", id, target, e);
                self.fail_session(id, call_failure(&e)).await;
                return Err(e.into());
            }
        };

        self.switchboard.bind_handle(id, handle.clone())?;
        self.switchboard.transition(id, SessionEvent::Dial)?;
        self.flush();
        info!("Dialing {} as session {}", target, id);

        self.wait_for_media(id, &handle).await
    }

    async fn wait_for_media(&mut self, id: SessionId, handle: &TransportHandle) -> Result<()> {
        let limit = self.config.timers.ice_ready_timeout();
        match timeout(limit, self.transport.await_media_ready(handle)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Media setup for session {} failed: {}", id, e);
                self.abandon(id, handle, CallFailure::MediaFailure(e.to_string()))
                    .await;
                Err(e.into())
            }
            Err(_) if self.config.timers.proceed_on_ice_timeout => {
                warn!(
                    "Media for session {} not ready after {:?}, proceeding",
                    id, limit
                );
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Media for session {} not ready after {:?}, abandoning call",
                    id, limit
                );
                self.abandon(
                    id,
                    handle,
                    CallFailure::MediaFailure("ICE gathering timed out".to_string()),
                )
                .await;
                Err(TransportError::Timeout.into())
            }
        }
    }

    async fn abandon(&mut self, id: SessionId, handle: &TransportHandle, failure: CallFailure) {
        if let Err(e) = self.transport.terminate(handle).await {
            debug!("Terminating abandoned session {}: {}", id, e);
        }
        self.fail_session(id, failure).await;
    }

    /// Answer a ringing inbound call; `None` picks the one on the selected
    /// line, else the oldest ringing offer
    pub async fn answer(&mut self, session: Option<SessionId>) -> Result<()> {
        let session = match session {
            Some(id) => self.target(Some(id))?,
            None => self.ringing_offer()?,
        };
        let id = session.id();
        ensure_ringing_inbound(&session)?;

        let handle = Self::handle_of(&session)?;
        let line = self
            .switchboard
            .line_of(&id)
            .ok_or_else(|| DomainError::NotFound(format!("line offering session {}", id)))?;

        if let Err(e) = self.transport.accept_inbound_offer(&handle).await {
            warn!("Failed to answer session {}: {}", id, e);
            self.fail_session(id, call_failure(&e)).await;
            self.flush();
            return Err(e.into());
        }

        self.switchboard.assign_to_line(id, line)?;
        self.switchboard.transition(id, SessionEvent::Answer)?;
        self.switchboard.select_line(line);
        info!("Answered session {} on line {}", id, line);
        self.flush();
        Ok(())
    }

    /// Decline a ringing inbound call
    pub async fn reject(&mut self, session: Option<SessionId>) -> Result<()> {
        let session = match session {
            Some(id) => self.target(Some(id))?,
            None => self.ringing_offer()?,
        };
        ensure_ringing_inbound(&session)?;
        self.decline(&session).await;
        self.flush();
        Ok(())
    }

    async fn decline(&mut self, session: &Session) {
        let id = session.id();
        if let Some(handle) = session.handle() {
            if let Err(e) = self
                .transport
                .reject_inbound_offer(handle, RejectReason::Declined)
                .await
            {
                warn!("Failed to decline session {}: {}", id, e);
            }
        }
        info!("Declined session {}", id);
        self.end_session(id, EndReason::Declined).await;
    }

    /// End a call. Hanging up a ringing inbound call declines it.
    pub async fn hang_up(&mut self, session: Option<SessionId>) -> Result<()> {
        let session = self.target(session)?;
        let id = session.id();

        if session.direction() == Direction::Incoming && session.state() == SessionState::Ringing {
            self.decline(&session).await;
            self.flush();
            return Ok(());
        }

        if let Some(handle) = session.handle() {
            if let Err(e) = self.transport.terminate(handle).await {
                // The local leg ends regardless
                warn!("Transport refused to terminate session {}: {}", id, e);
            }
        }
        info!("Hung up session {}", id);
        self.end_session(id, EndReason::LocalHangup).await;
        self.flush();
        Ok(())
    }

    /// Put a call on hold or take it off. A refused request leaves the call
    /// as it was.
    pub async fn set_hold(&mut self, session: Option<SessionId>, hold: bool) -> Result<()> {
        let session = self.target(session)?;
        let id = session.id();

        match (session.state(), hold) {
            (SessionState::Hold, true) | (SessionState::Active, false) => return Ok(()),
            (SessionState::Active, true) | (SessionState::Hold, false) => {}
            (state, _) => {
                return Err(DomainError::InvalidOperation(format!(
                    "Cannot change hold on session {} while {}",
                    id, state
                )))
            }
        }

        let handle = Self::handle_of(&session)?;
        let result = if hold {
            self.transport.hold(&handle).await
        } else {
            self.transport.unhold(&handle).await
        };

        if let Err(e) = result {
            warn!(
                "{} refused for session {}, keeping it {}: {}",
                if hold { "Hold" } else { "Resume" },
                id,
                session.state(),
                e
            );
            return Err(e.into());
        }

        let event = if hold {
            SessionEvent::Hold
        } else {
            SessionEvent::Resume
        };
        self.switchboard.transition(id, event)?;
        self.flush();
        Ok(())
    }

    pub async fn toggle_hold(&mut self, session: Option<SessionId>) -> Result<bool> {
        let current = self.target(session)?;
        let hold = current.state() != SessionState::Hold;
        self.set_hold(Some(current.id()), hold).await?;
        Ok(hold)
    }

    /// Flip the microphone of a call; returns the new mute flag
    pub async fn toggle_mute(&mut self, session: Option<SessionId>) -> Result<bool> {
        let session = self.target(session)?;
        let id = session.id();
        let handle = Self::handle_of(&session)?;
        let muted = !session.is_muted();

        let result = if muted {
            self.transport.mute(&handle).await
        } else {
            self.transport.unmute(&handle).await
        };
        if let Err(e) = result {
            warn!("Mute change refused for session {}: {}", id, e);
            return Err(e.into());
        }

        self.switchboard.set_muted(id, muted)?;
        self.flush();
        Ok(muted)
    }

    pub async fn send_dtmf(&mut self, session: Option<SessionId>, tone: char) -> Result<()> {
        let tone = DtmfTone::new(tone).map_err(DomainError::ValidationError)?;
        let session = self.target(session)?;
        if session.state() != SessionState::Active {
            return Err(DomainError::InvalidOperation(format!(
                "Cannot send DTMF on session {} while {}",
                session.id(),
                session.state()
            )));
        }

        let handle = Self::handle_of(&session)?;
        self.transport.send_dtmf(&handle, tone).await?;
        debug!("Sent DTMF {} on session {}", tone.as_char(), session.id());
        Ok(())
    }

    pub fn select_line(&mut self, line: LineNumber) {
        self.switchboard.select_line(line);
        self.flush();
    }

    pub fn reassign_line(&mut self, session: SessionId, line: LineNumber) -> Result<()> {
        let result = self.switchboard.reassign_line(session, line);
        self.flush();
        result
    }

    pub(super) async fn end_session(&mut self, id: SessionId, reason: EndReason) {
        match self.switchboard.terminate(id, reason) {
            Ok(_) => self.session_ended(id).await,
            Err(e) => debug!("Session {} already ended: {}", id, e),
        }
    }

    pub(super) async fn fail_session(&mut self, id: SessionId, failure: CallFailure) {
        match self.switchboard.fail(id, failure) {
            Ok(_) => self.session_ended(id).await,
            Err(e) => debug!("Session {} already ended: {}", id, e),
        }
    }

    fn ringing_offer(&self) -> Result<Session> {
        if let Some(session) = self.switchboard.selected_session() {
            if ensure_ringing_inbound(session).is_ok() {
                return Ok(session.clone());
            }
        }
        self.switchboard
            .sessions()
            .filter(|s| ensure_ringing_inbound(s).is_ok())
            .min_by_key(|s| *s.started_at())
            .cloned()
            .ok_or_else(|| DomainError::NotFound("ringing inbound call".to_string()))
    }
}

fn ensure_ringing_inbound(session: &Session) -> Result<()> {
    if session.direction() == Direction::Incoming && session.state() == SessionState::Ringing {
        Ok(())
    } else {
        Err(DomainError::InvalidOperation(format!(
            "Session {} is not a ringing inbound call",
            session.id()
        )))
    }
}

fn validate_target(target: &str) -> Result<&str> {
    let target = target.trim();
    if target.is_empty() {
        return Err(DomainError::ValidationError(
            "Dial target must not be empty".to_string(),
        ));
    }
    Ok(target)
}
