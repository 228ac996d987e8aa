use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::task;
use tracing::debug;

use super::{SessionId, SessionState, SessionStore, SessionVersion, StoredRecord, VersionedState};
use crate::error::StoreError;

/// SQLite-based session storage for single-host deployments.
///
/// Every row carries an integer version bumped on each write, which backs
/// [`SessionStore::save_if`].
pub struct SqliteSessionStore {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

/// Open a SQLite connection with standard pragmas (busy_timeout).
fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;
    conn.execute_batch("PRAGMA busy_timeout=5000;")
        .context("failed to set busy_timeout")?;
    Ok(conn)
}

fn version_token(version: i64) -> SessionVersion {
    SessionVersion {
        e_tag: None,
        version: Some(version.to_string()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl SqliteSessionStore {
    /// Create a new SQLite store at the given path
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let store = Self { db_path };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = open_connection(&self.db_path)?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("failed to set WAL mode")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                turns INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )
        .context("failed to create sessions table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at)",
            [],
        )
        .context("failed to create updated_at index")?;

        debug!(path = %self.db_path.display(), "initialized SQLite session store");

        Ok(())
    }

    /// Run a blocking write on the pool and map join/driver failures.
    async fn write<F>(&self, id: &SessionId, op: F) -> Result<SessionVersion, StoreError>
    where
        F: FnOnce(&Connection) -> Result<Option<i64>, rusqlite::Error> + Send + 'static,
    {
        let key = id.to_string();
        let db_path = self.db_path.clone();

        let written = task::spawn_blocking(move || {
            let conn = open_connection(&db_path).map_err(|e| StoreError::unavailable(&key, e))?;
            op(&conn).map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::Conflict { key: key.clone() }
                } else {
                    StoreError::unavailable(&key, e)
                }
            })
        })
        .await
        .map_err(|e| StoreError::unavailable(id.as_str(), e))??;

        match written {
            Some(version) => {
                debug!(id = %id, version, "saved session");
                Ok(version_token(version))
            }
            None => Err(StoreError::Conflict {
                key: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<VersionedState>, StoreError> {
        let key = id.to_string();
        let db_path = self.db_path.clone();

        let row = task::spawn_blocking(move || {
            let conn = open_connection(&db_path).map_err(|e| StoreError::unavailable(&key, e))?;
            conn.query_row(
                "SELECT version, data FROM sessions WHERE id = ?1",
                [&key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::unavailable(&key, e))
        })
        .await
        .map_err(|e| StoreError::unavailable(id.as_str(), e))??;

        match row {
            Some((version, data)) => {
                let record = StoredRecord::decode(id, &data)?;
                debug!(id = %id, version, "loaded session");
                Ok(Some(VersionedState {
                    state: record.state,
                    version: version_token(version),
                }))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        id: &SessionId,
        state: &SessionState,
    ) -> Result<SessionVersion, StoreError> {
        let data = StoredRecord::new(id.clone(), state.clone()).encode()?;
        let row = Row::new(id, state, data);

        self.write(id, move |conn| {
            conn.query_row(
                "INSERT INTO sessions (id, version, turns, created_at, updated_at, data)
                 VALUES (?1, 1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    version = version + 1,
                    turns = excluded.turns,
                    updated_at = excluded.updated_at,
                    data = excluded.data
                 RETURNING version",
                params![row.id, row.turns, row.created_at, row.updated_at, row.data],
                |r| r.get(0),
            )
            .map(Some)
        })
        .await
    }

    async fn save_if(
        &self,
        id: &SessionId,
        state: &SessionState,
        expected: Option<&SessionVersion>,
    ) -> Result<SessionVersion, StoreError> {
        let data = StoredRecord::new(id.clone(), state.clone()).encode()?;
        let row = Row::new(id, state, data);

        let Some(expected) = expected else {
            return self
                .write(id, move |conn| {
                    conn.execute(
                        "INSERT INTO sessions (id, version, turns, created_at, updated_at, data)
                         VALUES (?1, 1, ?2, ?3, ?4, ?5)",
                        params![row.id, row.turns, row.created_at, row.updated_at, row.data],
                    )
                    .map(|_| Some(1))
                })
                .await;
        };

        let expected: i64 = expected
            .version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StoreError::Conflict { key: id.to_string() })?;

        self.write(id, move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET version = version + 1, turns = ?2, updated_at = ?3, data = ?4
                 WHERE id = ?1 AND version = ?5",
                params![row.id, row.turns, row.updated_at, row.data, expected],
            )?;
            Ok((changed == 1).then_some(expected + 1))
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Column values for one session row
struct Row {
    id: String,
    turns: i64,
    created_at: String,
    updated_at: String,
    data: Vec<u8>,
}

impl Row {
    fn new(id: &SessionId, state: &SessionState, data: Vec<u8>) -> Self {
        Self {
            id: id.to_string(),
            turns: state.turns().len() as i64,
            created_at: state.created_at.to_rfc3339(),
            updated_at: state.updated_at.to_rfc3339(),
            data,
        }
    }
}
