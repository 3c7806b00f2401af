//! Session registry
//!
//! Authoritative table of in-progress sessions, indexed by id and by
//! transport handle. Sessions that reached a terminal state are moved into a
//! bounded history once every dependent has been notified.

use crate::domain::session::aggregate::Session;
use crate::domain::shared::value_objects::{SessionId, TransportHandle};
use std::collections::{HashMap, VecDeque};

pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    by_handle: HashMap<TransportHandle, SessionId>,
    history: VecDeque<Session>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            by_handle: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    pub(crate) fn insert(&mut self, session: Session) -> SessionId {
        let id = session.id();
        if let Some(handle) = session.handle() {
            self.by_handle.insert(handle.clone(), id);
        }
        self.sessions.insert(id, session);
        id
    }

    pub(crate) fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub(crate) fn bind_handle(&mut self, id: &SessionId, handle: TransportHandle) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                if let Some(previous) = session.handle() {
                    self.by_handle.remove(previous);
                }
                session.set_handle(handle.clone());
                self.by_handle.insert(handle, *id);
                true
            }
            None => false,
        }
    }

    /// Move a terminal session into history. Live sessions are left alone.
    pub(crate) fn retire(&mut self, id: &SessionId) -> Option<Session> {
        if !self.sessions.get(id)?.is_terminal() {
            return None;
        }

        let session = self.sessions.remove(id)?;
        if let Some(handle) = session.handle() {
            self.by_handle.remove(handle);
        }

        if self.history_limit > 0 {
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(session.clone());
        }

        Some(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Live session or one still held in the recently-terminated history
    pub fn find_recent(&self, id: &SessionId) -> Option<&Session> {
        self.sessions
            .get(id)
            .or_else(|| self.history.iter().rev().find(|s| s.id() == *id))
    }

    pub fn find_by_handle(&self, handle: &TransportHandle) -> Option<SessionId> {
        self.by_handle.get(handle).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Recently ended sessions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Session> {
        self.history.iter()
    }
}
