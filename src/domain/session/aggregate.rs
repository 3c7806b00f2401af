//! Session aggregate root

use crate::domain::session::value_object::{Direction, EndReason, SessionEvent, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LineNumber, RemoteParty, SessionId, TransportHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One call leg
///
/// Fields are only mutated through the switchboard so that line bindings and
/// terminal states stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    /// Transport call handle, once the transport knows about the call
    handle: Option<TransportHandle>,
    /// Line the session is assigned to; `None` while an inbound offer rings
    line: Option<LineNumber>,
    direction: Direction,
    state: SessionState,
    remote: RemoteParty,
    on_hold: bool,
    muted: bool,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<EndReason>,
    is_consultation_call: bool,
    original_session_id: Option<SessionId>,
}

impl Session {
    pub fn new(direction: Direction, remote: RemoteParty) -> Self {
        Self {
            id: SessionId::new(),
            handle: None,
            line: None,
            direction,
            state: SessionState::Initiating,
            remote,
            on_hold: false,
            muted: false,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            end_reason: None,
            is_consultation_call: false,
            original_session_id: None,
        }
    }

    /// Mark this session as the consultation leg of an attended transfer
    pub fn consulting_for(mut self, original: SessionId) -> Self {
        self.is_consultation_call = true;
        self.original_session_id = Some(original);
        self
    }

    /// Apply a state machine event, returning the new state
    pub(crate) fn apply(&mut self, event: &SessionEvent) -> Result<SessionState> {
        if self.state.is_terminal() {
            return Err(DomainError::AlreadyTerminal(self.id));
        }

        let next = self.state.next(event).ok_or_else(|| {
            DomainError::InvalidTransition(format!(
                "Session {} cannot handle {:?} in state {}",
                self.id, event, self.state
            ))
        })?;

        match event {
            SessionEvent::Answer => self.answered_at = Some(Utc::now()),
            SessionEvent::Hold => self.on_hold = true,
            SessionEvent::Resume => self.on_hold = false,
            SessionEvent::End(reason) => self.finish(reason.clone()),
            SessionEvent::Fail(failure) => self.finish(EndReason::Failed(failure.clone())),
            SessionEvent::Dial | SessionEvent::Alert => {}
        }

        self.state = next;
        Ok(next)
    }

    fn finish(&mut self, reason: EndReason) {
        self.ended_at = Some(Utc::now());
        self.end_reason = Some(reason);
        self.on_hold = false;
    }

    pub(crate) fn set_line(&mut self, line: LineNumber) {
        self.line = Some(line);
    }

    pub(crate) fn set_handle(&mut self, handle: TransportHandle) {
        self.handle = Some(handle);
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    // Getters
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handle(&self) -> Option<&TransportHandle> {
        self.handle.as_ref()
    }

    pub fn line(&self) -> Option<LineNumber> {
        self.line
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remote(&self) -> &RemoteParty {
        &self.remote
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn started_at(&self) -> &DateTime<Utc> {
        &self.started_at
    }

    pub fn answered_at(&self) -> Option<&DateTime<Utc>> {
        self.answered_at.as_ref()
    }

    pub fn ended_at(&self) -> Option<&DateTime<Utc>> {
        self.ended_at.as_ref()
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn is_consultation_call(&self) -> bool {
        self.is_consultation_call
    }

    pub fn original_session_id(&self) -> Option<SessionId> {
        self.original_session_id
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Talk time since answer, up to now or to the end of the call.
    /// Hold does not pause it.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.answered_at.map(|answered| {
            let until = self.ended_at.unwrap_or_else(Utc::now);
            until - answered
        })
    }
}
