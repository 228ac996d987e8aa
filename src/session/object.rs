use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, ObjectStore, PutMode, PutOptions, PutPayload, PutResult, UpdateVersion,
};
use tracing::debug;

use super::{SessionId, SessionState, SessionStore, SessionVersion, StoredRecord, VersionedState};
use crate::error::StoreError;

/// Session storage on top of any `object_store` backend (GCS, in-memory, ...).
///
/// Each session is one object whose key is the session id, optionally under
/// a prefix. Objects are replaced whole; the backend's e-tag and generation
/// serve as the version token for conditional writes.
pub struct ObjectSessionStore {
    inner: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl ObjectSessionStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            prefix: None,
        }
    }

    /// Store sessions under `prefix/` instead of the bucket root
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    fn path_for(&self, id: &SessionId) -> ObjectPath {
        match &self.prefix {
            Some(prefix) => ObjectPath::from(format!("{}/{}", prefix, id)),
            None => ObjectPath::from(id.as_str()),
        }
    }

    async fn put(
        &self,
        id: &SessionId,
        state: &SessionState,
        mode: PutMode,
    ) -> Result<SessionVersion, StoreError> {
        let path = self.path_for(id);
        let bytes = StoredRecord::new(id.clone(), state.clone()).encode()?;

        let result = self
            .inner
            .put_opts(&path, PutPayload::from(bytes), PutOptions::from(mode))
            .await
            .map_err(|e| match e {
                object_store::Error::Precondition { .. }
                | object_store::Error::AlreadyExists { .. }
                | object_store::Error::NotFound { .. } => StoreError::Conflict {
                    key: path.to_string(),
                },
                other => StoreError::unavailable(path.to_string(), other),
            })?;

        debug!(id = %id, path = %path, "wrote session object");
        Ok(version_of(result))
    }
}

fn version_of(result: PutResult) -> SessionVersion {
    SessionVersion {
        e_tag: result.e_tag,
        version: result.version,
    }
}

#[async_trait]
impl SessionStore for ObjectSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<VersionedState>, StoreError> {
        let path = self.path_for(id);

        let result = match self.inner.get_opts(&path, GetOptions::default()).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                debug!(id = %id, "no session object");
                return Ok(None);
            }
            Err(e) => return Err(StoreError::unavailable(path.to_string(), e)),
        };

        let version = SessionVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let bytes = result
            .bytes()
            .await
            .map_err(|e| StoreError::unavailable(path.to_string(), e))?;

        let record = StoredRecord::decode(id, &bytes)?;
        debug!(id = %id, turns = record.state.turns().len(), "loaded session object");

        Ok(Some(VersionedState {
            state: record.state,
            version,
        }))
    }

    async fn save(
        &self,
        id: &SessionId,
        state: &SessionState,
    ) -> Result<SessionVersion, StoreError> {
        self.put(id, state, PutMode::Overwrite).await
    }

    async fn save_if(
        &self,
        id: &SessionId,
        state: &SessionState,
        expected: Option<&SessionVersion>,
    ) -> Result<SessionVersion, StoreError> {
        let mode = match expected {
            None => PutMode::Create,
            Some(v) => PutMode::Update(UpdateVersion {
                e_tag: v.e_tag.clone(),
                version: v.version.clone(),
            }),
        };
        self.put(id, state, mode).await
    }

    fn name(&self) -> &str {
        "object_store"
    }
}
