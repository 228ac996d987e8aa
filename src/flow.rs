use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::ChatFlowBuilder;
use crate::error::ChatError;
use crate::session::{SessionId, SessionLocks, SessionManager};
use crate::turn::{Persistence, TurnOrchestrator, TurnOutcome};

/// Inbound request: `{ text, sessionId? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            session_id: None,
        }
    }

    pub fn in_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Successful reply: `{ out, sessionId }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub out: String,
    pub session_id: SessionId,
}

/// Entry point for one conversational request.
///
/// Resolves the session (load when an id is supplied, create otherwise),
/// advances it by one exchange and reports the reply with the session id.
pub struct ChatFlow {
    manager: SessionManager,
    orchestrator: TurnOrchestrator,
    locks: SessionLocks,
}

impl ChatFlow {
    pub fn new(manager: SessionManager, orchestrator: TurnOrchestrator) -> Self {
        Self {
            manager,
            orchestrator,
            locks: SessionLocks::new(),
        }
    }

    pub fn builder() -> ChatFlowBuilder {
        ChatFlowBuilder::new()
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Handle a request and shape the reply for the caller
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let outcome = self.run(request).await?;
        Ok(ChatResponse {
            out: outcome.agent_text,
            session_id: outcome.session.id,
        })
    }

    /// Handle a request and return the full outcome, including whether the
    /// session was persisted.
    pub async fn run(&self, request: ChatRequest) -> Result<TurnOutcome, ChatError> {
        let text = match request.text {
            Some(text) if !text.trim().is_empty() => text,
            Some(_) => return Err(ChatError::Validation("text must not be empty".to_string())),
            None => return Err(ChatError::Validation("text is required".to_string())),
        };

        // An empty id means "no session", same as leaving it out
        let requested = match request.session_id.as_deref() {
            Some(raw) if !raw.is_empty() => Some(SessionId::parse(raw)?),
            _ => None,
        };

        let outcome = match requested {
            Some(id) => {
                let _guard = self.locks.acquire(&id).await;
                let session = self.manager.load_session(&id).await?;
                self.orchestrator.advance(session, &text).await?
            }
            None => {
                let session = self.manager.create_session();
                self.orchestrator.advance(session, &text).await?
            }
        };

        match &outcome.persistence {
            Persistence::Saved { .. } => {
                info!(session_id = %outcome.session.id, "turn completed");
            }
            Persistence::Failed(e) => {
                warn!(session_id = %outcome.session.id, error = %e, "turn completed without persisting");
            }
        }

        Ok(outcome)
    }
}
