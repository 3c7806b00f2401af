//! Switchboard - the single choke point over sessions and lines
//!
//! Every mutation of the session registry or the line allocator goes through
//! here, so that one-session-per-line and absorbing terminal states are
//! enforced in one place. Each operation either succeeds completely or leaves
//! both tables untouched.

use crate::domain::events::{CoreEvent, Outbox};
use crate::domain::line::{Line, LineAllocator};
use crate::domain::session::{
    Direction, EndReason, Session, SessionEvent, SessionRegistry, SessionState,
};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LineNumber, RemoteParty, SessionId, TransportHandle};
use crate::domain::transport::CallFailure;
use tracing::{debug, info};

pub struct Switchboard {
    registry: SessionRegistry,
    lines: LineAllocator,
    outbox: Outbox,
}

impl Switchboard {
    pub fn new(history_limit: usize) -> Self {
        Self {
            registry: SessionRegistry::new(history_limit),
            lines: LineAllocator::new(),
            outbox: Outbox::default(),
        }
    }

    /// Create a session.
    ///
    /// Outgoing sessions are assigned the selected line (or the next free one)
    /// straight away. Incoming sessions ring on a free line but stay
    /// unassigned until they are answered. Fails with `AllLinesBusy` without
    /// touching the registry when every line is taken.
    pub fn create_session(&mut self, direction: Direction, remote: RemoteParty) -> Result<SessionId> {
        self.admit(Session::new(direction, remote))
    }

    /// Create the consultation leg of an attended transfer
    pub fn create_consultation_session(
        &mut self,
        remote: RemoteParty,
        original: SessionId,
    ) -> Result<SessionId> {
        if self.registry.get(&original).is_none() {
            return Err(DomainError::NotFound(format!("session {}", original)));
        }
        self.admit(Session::new(Direction::Outgoing, remote).consulting_for(original))
    }

    fn admit(&mut self, mut session: Session) -> Result<SessionId> {
        let line = self
            .lines
            .find_free(Some(self.lines.selected()))
            .ok_or(DomainError::AllLinesBusy)?;

        let direction = session.direction();
        match direction {
            Direction::Outgoing => session.set_line(line),
            Direction::Incoming => {
                session.apply(&SessionEvent::Alert)?;
            }
        }

        // The line was checked idle above, bind cannot fail
        self.lines.bind(line, &session)?;

        let id = session.id();
        info!(
            "Session {} created ({:?}, remote {}) on line {}",
            id,
            direction,
            session.remote().number(),
            line
        );

        self.outbox.record(CoreEvent::SessionCreated {
            session_id: id,
            direction,
            remote: session.remote().clone(),
            line: session.line(),
        });
        self.registry.insert(session);
        self.record_line(line);

        // Inbound offers land on the selected line only when it was idle, so
        // they never pull focus away from a call
        if direction == Direction::Outgoing {
            self.focus(line);
        }

        Ok(id)
    }

    /// Bind a session to a line permanently
    pub fn assign_to_line(&mut self, id: SessionId, line: LineNumber) -> Result<()> {
        let session = self.live_session(&id)?;

        if let Some(current) = session.line() {
            if current == line {
                return Ok(());
            }
            return Err(DomainError::InvalidOperation(format!(
                "Session {} is already assigned to line {}",
                id, current
            )));
        }

        if let Some(occupant) = self.lines.line(line).session_id() {
            if occupant != id {
                return Err(DomainError::LineOccupied { line, occupant });
            }
        }

        // Drop a ringing offer shown on another line
        let offered_on = self.lines.line_of(&id).filter(|offered| *offered != line);

        let session = self.session_mut(&id)?;
        session.set_line(line);
        let session = session.clone();
        self.lines.bind(line, &session)?;

        if let Some(previous) = offered_on {
            self.lines.release(previous);
            self.record_line(previous);
        }
        self.record_line(line);

        debug!("Session {} assigned to line {}", id, line);
        Ok(())
    }

    /// Move an assigned session to another idle line
    pub fn reassign_line(&mut self, id: SessionId, line: LineNumber) -> Result<()> {
        let session = self.live_session(&id)?;
        let current = session.line().ok_or_else(|| {
            DomainError::InvalidOperation(format!("Session {} has no line to move from", id))
        })?;

        if current == line {
            return Ok(());
        }

        if let Some(occupant) = self.lines.line(line).session_id() {
            return Err(DomainError::LineOccupied { line, occupant });
        }

        let session = self.session_mut(&id)?;
        session.set_line(line);
        let session = session.clone();
        self.lines.bind(line, &session)?;
        self.lines.release(current);

        self.record_line(current);
        self.record_line(line);

        if self.lines.selected() == current {
            self.focus(line);
        }

        info!("Session {} moved from line {} to line {}", id, current, line);
        Ok(())
    }

    /// Apply a state machine event
    ///
    /// A terminal outcome releases the session's line in the same step. The
    /// session itself stays in the registry until [`Switchboard::retire`].
    pub fn transition(&mut self, id: SessionId, event: SessionEvent) -> Result<SessionState> {
        let session = self
            .registry
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound(format!("session {}", id)))?;

        let from = session.state();
        let to = session.apply(&event)?;
        let session = session.clone();

        debug!("Session {} {} -> {}", id, from, to);
        self.outbox.record(CoreEvent::SessionStateChanged {
            session_id: id,
            from,
            to,
        });

        let line = self.lines.line_of(&id);
        if to.is_terminal() {
            if let Some(reason) = session.end_reason() {
                self.outbox.record(CoreEvent::SessionTerminated {
                    session_id: id,
                    state: to,
                    reason: reason.clone(),
                });
            }
            if let Some(line) = line {
                self.lines.release(line);
                self.record_line(line);
            }
        } else if let Some(line) = line {
            if self.lines.refresh(line, &session) {
                self.record_line(line);
            }
        }

        Ok(to)
    }

    pub fn terminate(&mut self, id: SessionId, reason: EndReason) -> Result<SessionState> {
        self.transition(id, SessionEvent::End(reason))
    }

    pub fn fail(&mut self, id: SessionId, failure: CallFailure) -> Result<SessionState> {
        self.transition(id, SessionEvent::Fail(failure))
    }

    pub fn set_muted(&mut self, id: SessionId, muted: bool) -> Result<()> {
        let session = self.session_mut(&id)?;
        if session.is_terminal() {
            return Err(DomainError::AlreadyTerminal(id));
        }
        session.set_muted(muted);
        let session = session.clone();

        if let Some(line) = self.lines.line_of(&id) {
            if self.lines.refresh(line, &session) {
                self.record_line(line);
            }
        }
        Ok(())
    }

    pub fn bind_handle(&mut self, id: SessionId, handle: TransportHandle) -> Result<()> {
        if self.registry.bind_handle(&id, handle) {
            Ok(())
        } else {
            Err(DomainError::NotFound(format!("session {}", id)))
        }
    }

    /// Remove a terminal session from the registry into history
    pub fn retire(&mut self, id: SessionId) -> Option<Session> {
        let session = self.registry.retire(&id)?;
        // Normally released on the terminal transition already
        if let Some(line) = self.lines.line_of(&id) {
            self.lines.release(line);
            self.record_line(line);
        }
        Some(session)
    }

    pub fn select_line(&mut self, line: LineNumber) {
        self.focus(line);
    }

    fn focus(&mut self, line: LineNumber) {
        if self.lines.selected() != line {
            self.lines.select(line);
            self.outbox.record(CoreEvent::LineSelected { line });
        }
    }

    pub fn selected_line(&self) -> LineNumber {
        self.lines.selected()
    }

    /// Session bound to the selected line, the implicit target of user actions
    pub fn selected_session(&self) -> Option<&Session> {
        self.lines
            .line(self.lines.selected())
            .session_id()
            .and_then(|id| self.registry.get(&id))
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.registry.get(id)
    }

    pub fn find_recent(&self, id: &SessionId) -> Option<&Session> {
        self.registry.find_recent(id)
    }

    pub fn find_by_handle(&self, handle: &TransportHandle) -> Option<SessionId> {
        self.registry.find_by_handle(handle)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.registry.iter()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &Session> {
        self.registry.history()
    }

    pub fn lines(&self) -> &[Line] {
        self.lines.lines()
    }

    pub fn line(&self, line: LineNumber) -> &Line {
        self.lines.line(line)
    }

    pub fn line_of(&self, id: &SessionId) -> Option<LineNumber> {
        self.lines.line_of(id)
    }

    pub fn free_lines(&self) -> usize {
        self.lines.free_count()
    }

    /// Lines in key order with their bound sessions
    pub fn list_by_line(&self) -> Vec<(LineNumber, Option<&Session>)> {
        self.lines
            .lines()
            .iter()
            .map(|line| {
                (
                    line.number(),
                    line.session_id().and_then(|id| self.registry.get(&id)),
                )
            })
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        self.outbox.take_events()
    }

    fn live_session(&self, id: &SessionId) -> Result<&Session> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| DomainError::NotFound(format!("session {}", id)))?;
        if session.is_terminal() {
            return Err(DomainError::AlreadyTerminal(*id));
        }
        Ok(session)
    }

    fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session> {
        self.registry
            .get_mut(id)
            .ok_or_else(|| DomainError::NotFound(format!("session {}", id)))
    }

    fn record_line(&mut self, line: LineNumber) {
        self.outbox.record(CoreEvent::LineStateChanged {
            line: self.lines.line(line).clone(),
        });
    }
}
