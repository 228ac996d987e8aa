mod id;
mod locks;
mod manager;
mod object;
mod sqlite;
mod state;
mod storage;

pub use id::SessionId;
pub use locks::{SessionGuard, SessionLocks};
pub use manager::{Session, SessionManager};
pub use object::ObjectSessionStore;
pub use sqlite::SqliteSessionStore;
pub use state::{SessionState, SessionVersion, StoredRecord, Turn, TurnRole, VersionedState};
pub use storage::SessionStore;
