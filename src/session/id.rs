use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;

/// Characters accepted in a session id. Ids double as object keys, so path
/// separators, whitespace and control characters are excluded.
static SESSION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid session id pattern")
});

/// Opaque, storage-safe session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh identifier from a random v4 UUID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        if SESSION_ID_PATTERN.is_match(raw) && !raw.contains("..") {
            Ok(Self(raw.to_string()))
        } else {
            Err(ChatError::Validation(format!(
                "session id '{}' contains characters that are not allowed",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_pass_validation() {
        let id = SessionId::generate();
        assert!(SessionId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_rejects_key_unsafe_ids() {
        for raw in ["", "a/b", "../etc", "with space", "tab\tid", "-leading", "a..b"] {
            assert!(
                matches!(SessionId::parse(raw), Err(ChatError::Validation(_))),
                "expected '{}' to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_accepts_common_formats() {
        for raw in ["S1", "abc-123", "session_42.v2", "0b7a1c8e-8f5c-4b0e-9d7e-3a1f2c4d5e6f"] {
            assert!(SessionId::parse(raw).is_ok(), "expected '{}' to be accepted", raw);
        }
    }

    #[test]
    fn test_rejects_overlong_ids() {
        let raw = "a".repeat(129);
        assert!(SessionId::parse(&raw).is_err());
        assert!(SessionId::parse(&raw[..128]).is_ok());
    }
}
