use crate::session::SessionId;

/// Flow-level failure returned to the caller.
///
/// A failed commit is not an error at this level; it is reported inside a
/// successful [`TurnOutcome`](crate::turn::TurnOutcome).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {id} could not be read: {source}")]
    SessionUnreadable {
        id: SessionId,
        #[source]
        source: StoreError,
    },

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failure reported by a [`SessionStore`](crate::session::SessionStore).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable for '{key}': {message}")]
    Unavailable { key: String, message: String },

    #[error("stale write rejected for '{key}'")]
    Conflict { key: String },

    #[error("corrupt record at '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("failed to encode record for '{key}': {message}")]
    Encode { key: String, message: String },
}

impl StoreError {
    pub fn unavailable(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Unavailable {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Failure reported by a [`Generator`](crate::llm::Generator).
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation backend timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("generation backend returned an empty response")]
    EmptyResponse,

    #[error("failed to set up generation backend: {0}")]
    Setup(String),
}
