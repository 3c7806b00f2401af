//! Line allocator
//!
//! Maps the fixed set of lines onto sessions and tracks which line has UI
//! focus.

use crate::domain::line::entity::Line;
use crate::domain::session::Session;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LineNumber, SessionId};

pub struct LineAllocator {
    lines: Vec<Line>,
    selected: LineNumber,
}

impl LineAllocator {
    pub fn new() -> Self {
        Self {
            lines: LineNumber::all().map(Line::new).collect(),
            selected: LineNumber::default(),
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, number: LineNumber) -> &Line {
        &self.lines[number.index()]
    }

    pub fn selected(&self) -> LineNumber {
        self.selected
    }

    pub(crate) fn select(&mut self, number: LineNumber) {
        self.selected = number;
    }

    /// Line currently bound to the session, if any
    pub fn line_of(&self, session: &SessionId) -> Option<LineNumber> {
        self.lines
            .iter()
            .find(|line| line.session_id() == Some(*session))
            .map(Line::number)
    }

    /// `preferred` if it is idle, otherwise the lowest idle line
    pub fn find_free(&self, preferred: Option<LineNumber>) -> Option<LineNumber> {
        if let Some(number) = preferred {
            if self.line(number).is_idle() {
                return Some(number);
            }
        }
        self.lines.iter().find(|line| line.is_idle()).map(Line::number)
    }

    pub fn free_count(&self) -> usize {
        self.lines.iter().filter(|line| line.is_idle()).count()
    }

    /// Bind a session to a line. Rebinding the same session is a refresh.
    pub(crate) fn bind(&mut self, number: LineNumber, session: &Session) -> Result<bool> {
        let line = &mut self.lines[number.index()];
        match line.session_id() {
            Some(occupant) if occupant != session.id() => Err(DomainError::LineOccupied {
                line: number,
                occupant,
            }),
            _ => Ok(line.refresh(session)),
        }
    }

    /// Recompute the projection of a bound line
    pub(crate) fn refresh(&mut self, number: LineNumber, session: &Session) -> bool {
        self.lines[number.index()].refresh(session)
    }

    /// Return a line to idle. Returns false if it already was.
    pub(crate) fn release(&mut self, number: LineNumber) -> bool {
        let line = &mut self.lines[number.index()];
        if line.is_idle() {
            return false;
        }
        line.clear();
        true
    }
}

impl Default for LineAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Direction;
    use crate::domain::shared::value_objects::RemoteParty;

    fn session(number: &str) -> Session {
        Session::new(Direction::Outgoing, RemoteParty::new(number, None))
    }

    #[test]
    fn test_three_idle_lines() {
        let allocator = LineAllocator::new();
        assert_eq!(allocator.lines().len(), 3);
        assert_eq!(allocator.free_count(), 3);
        assert_eq!(allocator.selected(), LineNumber::default());
    }

    #[test]
    fn test_bind_rejects_other_session() {
        let mut allocator = LineAllocator::new();
        let line = LineNumber::new(2).unwrap();
        let first = session("101");
        let second = session("102");

        allocator.bind(line, &first).unwrap();
        assert_eq!(allocator.line_of(&first.id()), Some(line));

        let err = allocator.bind(line, &second).unwrap_err();
        assert_eq!(
            err,
            DomainError::LineOccupied {
                line,
                occupant: first.id()
            }
        );
        assert!(allocator.bind(line, &first).is_ok());
    }

    #[test]
    fn test_find_free_prefers_requested_line() {
        let mut allocator = LineAllocator::new();
        let one = LineNumber::new(1).unwrap();
        let three = LineNumber::new(3).unwrap();

        assert_eq!(allocator.find_free(Some(three)), Some(three));

        allocator.bind(three, &session("101")).unwrap();
        assert_eq!(allocator.find_free(Some(three)), Some(one));

        allocator.bind(one, &session("102")).unwrap();
        allocator.bind(LineNumber::new(2).unwrap(), &session("103")).unwrap();
        assert_eq!(allocator.find_free(None), None);

        assert!(allocator.release(three));
        assert!(!allocator.release(three));
        assert_eq!(allocator.find_free(None), Some(three));
    }
}
