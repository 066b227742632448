use super::session::Session;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::types::SessionId;
use std::collections::HashMap;

/// Independent sessions keyed by id. Sessions share no state.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Starts a session with the registry's config and returns its id.
    pub fn create(&mut self) -> SessionId {
        let session = Session::new(self.config.clone());
        let id = session.id().clone();
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Adopts a session built elsewhere, e.g. restored from a snapshot.
    pub fn insert(&mut self, session: Session) -> SessionId {
        let id = session.id().clone();
        self.sessions.insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &SessionId) -> SessionResult<&Session> {
        self.sessions
            .get(id)
            .ok_or_else(|| SessionError::not_found("session", id))
    }

    pub fn get_mut(&mut self, id: &SessionId) -> SessionResult<&mut Session> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found("session", id))
    }

    /// Closes the session (denying its pending tool calls) and drops it.
    pub fn close(&mut self, id: &SessionId) -> SessionResult<Session> {
        let mut session = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::not_found("session", id))?;
        session.close();
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
