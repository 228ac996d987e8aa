use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;
use crate::error::StoreError;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Text supplied by the caller
    User,
    /// Text produced by the generation backend
    Agent,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// One role-tagged unit of conversation content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
        }
    }
}

/// Conversation state persisted between requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Turn history, oldest first. Only ever appended to.
    turns: Vec<Turn>,

    /// Free-form caller data carried along untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Create an empty session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: Vec::new(),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn to the end of the history
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of a [`SessionState`] as written to the store.
///
/// Encoded as JSON with a schema version so older records stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Schema version for forward compatibility
    pub version: u32,

    /// The key this record was written under
    pub id: SessionId,

    pub state: SessionState,
}

impl StoredRecord {
    /// Current schema version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(id: SessionId, state: SessionState) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            id,
            state,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Encode {
            key: self.id.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode bytes read from `key`, rejecting records from a newer schema
    /// or written under a different key.
    pub fn decode(key: &SessionId, bytes: &[u8]) -> Result<Self, StoreError> {
        let record: Self = serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        if record.version > Self::CURRENT_VERSION {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                message: format!("unsupported record version {}", record.version),
            });
        }
        if &record.id != key {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                message: format!("record belongs to session '{}'", record.id),
            });
        }

        Ok(record)
    }
}

/// Opaque version token of a stored record, checked by conditional writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionVersion {
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

/// A session as read from the store, with the version it was read at
#[derive(Debug, Clone)]
pub struct VersionedState {
    pub state: SessionState,
    pub version: SessionVersion,
}
