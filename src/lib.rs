pub mod builder;
pub mod config;
pub mod error;
pub mod flow;
pub mod llm;
pub mod server;
pub mod session;
pub mod turn;

pub use builder::{ChatFlowBuilder, open_store};
pub use config::{CommitConfig, GenerationConfig, ServiceConfig, StorageBackend, StorageConfig};
pub use error::{ChatError, GenerationError, StoreError};
pub use flow::{ChatFlow, ChatRequest, ChatResponse};
pub use llm::{GenerationRequest, Generator, LlmGenerator};
pub use session::{
    ObjectSessionStore, Session, SessionId, SessionLocks, SessionManager, SessionState,
    SessionStore, SessionVersion, SqliteSessionStore, StoredRecord, Turn, TurnRole,
    VersionedState,
};
pub use turn::{Persistence, TurnOrchestrator, TurnOutcome};
