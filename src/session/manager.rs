use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{SessionId, SessionState, SessionStore, SessionVersion};
use crate::error::ChatError;

/// A session checked out for the duration of one request.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    /// Version the state was read at; `None` until the session is first saved
    pub version: Option<SessionVersion>,
}

impl Session {
    pub fn is_new(&self) -> bool {
        self.version.is_none()
    }
}

/// Allocates session identities and resolves existing sessions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a fresh, empty session. Does not touch the store.
    pub fn create_session(&self) -> Session {
        let id = SessionId::generate();
        info!(session_id = %id, "created new session");
        Session {
            id,
            state: SessionState::new(),
            version: None,
        }
    }

    /// Load an existing session.
    ///
    /// An absent record is [`ChatError::SessionNotFound`]; any read failure is
    /// [`ChatError::SessionUnreadable`]. Neither falls back to a new session.
    pub async fn load_session(&self, id: &SessionId) -> Result<Session, ChatError> {
        match self.store.get(id).await {
            Ok(Some(found)) => {
                debug!(session_id = %id, turns = found.state.turns().len(), "loaded session");
                Ok(Session {
                    id: id.clone(),
                    state: found.state,
                    version: Some(found.version),
                })
            }
            Ok(None) => {
                info!(session_id = %id, "session not found");
                Err(ChatError::SessionNotFound(id.clone()))
            }
            Err(source) => {
                warn!(session_id = %id, store = self.store.name(), error = %source, "session read failed");
                Err(ChatError::SessionUnreadable {
                    id: id.clone(),
                    source,
                })
            }
        }
    }
}
