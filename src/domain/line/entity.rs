//! Line entity and its caller-info projection

use crate::domain::session::{Direction, Session, SessionState};
use crate::domain::shared::value_objects::{LineNumber, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Line key state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineState {
    Idle,
    Ringing,
    Dialing,
    Active,
    Hold,
}

impl LineState {
    /// Line state shown for a session
    pub fn project(session: &Session) -> LineState {
        match (session.state(), session.direction()) {
            (SessionState::Initiating | SessionState::Dialing, _) => LineState::Dialing,
            (SessionState::Ringing, Direction::Incoming) => LineState::Ringing,
            (SessionState::Ringing, Direction::Outgoing) => LineState::Dialing,
            (SessionState::Active, _) => LineState::Active,
            (SessionState::Hold, _) => LineState::Hold,
            (SessionState::Terminated | SessionState::Failed, _) => LineState::Idle,
        }
    }
}

/// Caller details denormalized onto a line for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub number: String,
    pub display_name: Option<String>,
    pub direction: Direction,
    pub on_hold: bool,
    pub muted: bool,
    pub answered_at: Option<DateTime<Utc>>,
    pub is_consultation_call: bool,
}

impl CallerInfo {
    pub fn project(session: &Session) -> Self {
        Self {
            number: session.remote().number().to_string(),
            display_name: session.remote().display_name().map(str::to_string),
            direction: session.direction(),
            on_hold: session.is_on_hold(),
            muted: session.is_muted(),
            answered_at: session.answered_at().copied(),
            is_consultation_call: session.is_consultation_call(),
        }
    }
}

/// A physical line slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    number: LineNumber,
    session_id: Option<SessionId>,
    state: LineState,
    caller: Option<CallerInfo>,
}

impl Line {
    pub fn new(number: LineNumber) -> Self {
        Self {
            number,
            session_id: None,
            state: LineState::Idle,
            caller: None,
        }
    }

    /// Recompute state and caller info from the bound session.
    /// Returns true when the visible snapshot changed.
    pub(crate) fn refresh(&mut self, session: &Session) -> bool {
        let before = (self.state, self.caller.clone());
        self.session_id = Some(session.id());
        self.state = LineState::project(session);
        self.caller = Some(CallerInfo::project(session));
        before != (self.state, self.caller.clone())
    }

    pub(crate) fn clear(&mut self) {
        self.session_id = None;
        self.state = LineState::Idle;
        self.caller = None;
    }

    pub fn number(&self) -> LineNumber {
        self.number
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn state(&self) -> LineState {
        self.state
    }

    pub fn caller(&self) -> Option<&CallerInfo> {
        self.caller.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.session_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionEvent;
    use crate::domain::shared::value_objects::RemoteParty;

    #[test]
    fn test_projection_follows_session() {
        let mut session = Session::new(
            Direction::Incoming,
            RemoteParty::new("+15550100", Some("Front Desk".to_string())),
        );
        session.apply(&SessionEvent::Alert).unwrap();

        let mut line = Line::new(LineNumber::default());
        assert!(line.refresh(&session));
        assert_eq!(line.state(), LineState::Ringing);
        assert_eq!(line.caller().unwrap().display_name.as_deref(), Some("Front Desk"));

        // Nothing changed, nothing to report
        assert!(!line.refresh(&session));

        session.apply(&SessionEvent::Answer).unwrap();
        assert!(line.refresh(&session));
        assert_eq!(line.state(), LineState::Active);

        line.clear();
        assert!(line.is_idle());
        assert_eq!(line.state(), LineState::Idle);
        assert!(line.caller().is_none());
    }

    #[test]
    fn test_outbound_ringing_shows_dialing() {
        let mut session = Session::new(Direction::Outgoing, RemoteParty::new("101", None));
        session.apply(&SessionEvent::Dial).unwrap();
        session.apply(&SessionEvent::Alert).unwrap();
        assert_eq!(LineState::project(&session), LineState::Dialing);
    }
}
