use async_trait::async_trait;

use super::{SessionId, SessionState, SessionVersion, VersionedState};
use crate::error::StoreError;

/// Durable key-value backend for session state.
///
/// `get` reports an absent key as `Ok(None)`; every other failure is an
/// `Err`, so callers can tell "no such session" from "could not read it".
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the record stored under `id`, with its version token
    async fn get(&self, id: &SessionId) -> Result<Option<VersionedState>, StoreError>;

    /// Overwrite the record under `id` unconditionally (last write wins)
    async fn save(&self, id: &SessionId, state: &SessionState)
    -> Result<SessionVersion, StoreError>;

    /// Write the record only if the stored version still equals `expected`.
    ///
    /// `expected = None` means the key must not exist yet. A mismatch yields
    /// [`StoreError::Conflict`].
    async fn save_if(
        &self,
        id: &SessionId,
        state: &SessionState,
        expected: Option<&SessionVersion>,
    ) -> Result<SessionVersion, StoreError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
