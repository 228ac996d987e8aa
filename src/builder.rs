use std::sync::Arc;

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::{debug, info};

use crate::config::{CommitConfig, GenerationConfig, ServiceConfig, StorageBackend, StorageConfig};
use crate::error::ChatError;
use crate::flow::ChatFlow;
use crate::llm::{Generator, LlmGenerator};
use crate::session::{ObjectSessionStore, SessionManager, SessionStore, SqliteSessionStore};
use crate::turn::TurnOrchestrator;

/// Builder for constructing a [`ChatFlow`].
///
/// # Example
///
/// ```no_run
/// # use parlance::{ChatFlow, ChatRequest};
/// # async fn example() -> Result<(), parlance::ChatError> {
/// let flow = ChatFlow::builder()
///     .memory_storage()
///     .llm("google", "gemini-2.0-flash-001")?
///     .system_instruction("talk like a pirate")
///     .build()?;
///
/// let reply = flow.handle(ChatRequest::new("ahoy")).await?;
/// println!("{} ({})", reply.out, reply.session_id);
/// # Ok(())
/// # }
/// ```
pub struct ChatFlowBuilder {
    store: Option<Arc<dyn SessionStore>>,
    generator: Option<Arc<dyn Generator>>,
    system_instruction: String,
    commit: CommitConfig,
}

impl ChatFlowBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            generator: None,
            system_instruction: GenerationConfig::default().system_instruction,
            commit: CommitConfig::default(),
        }
    }

    /// Set a custom session store.
    pub fn store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a shared session store.
    pub fn shared_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep sessions in process memory (lost on exit).
    pub fn memory_storage(self) -> Self {
        self.store(ObjectSessionStore::new(Arc::new(InMemory::new())))
    }

    /// Open the store described by `config`.
    pub fn storage(mut self, config: &StorageConfig) -> Result<Self, ChatError> {
        self.store = Some(open_store(config)?);
        Ok(self)
    }

    /// Set a custom generation backend.
    pub fn generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Set a shared generation backend.
    pub fn shared_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use an `llm`-crate backend by provider name.
    pub fn llm(self, provider: &str, model: &str) -> Result<Self, ChatError> {
        let generator =
            LlmGenerator::new(provider, model).map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(self.generator(generator))
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn commit(mut self, commit: CommitConfig) -> Self {
        self.commit = commit;
        self
    }

    /// Apply every section of a validated service configuration.
    ///
    /// A store or generator set earlier is kept.
    pub fn from_config(mut self, config: &ServiceConfig) -> Result<Self, ChatError> {
        config.validate()?;

        if self.store.is_none() {
            self = self.storage(&config.storage)?;
        }
        if self.generator.is_none() {
            let generator = LlmGenerator::from_config(&config.generation)
                .map_err(|e| ChatError::Config(e.to_string()))?;
            self = self.generator(generator);
        }
        self.system_instruction = config.generation.system_instruction.clone();
        self.commit = config.commit.clone();

        debug!(
            provider = %config.generation.provider,
            model = %config.generation.model,
            location = %config.generation.location,
            "applied service configuration"
        );
        Ok(self)
    }

    /// Build the [`ChatFlow`].
    ///
    /// Fails if no store or no generator has been configured.
    pub fn build(self) -> Result<ChatFlow, ChatError> {
        let store = self
            .store
            .ok_or_else(|| ChatError::Config("no session store configured".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| ChatError::Config("no generation backend configured".to_string()))?;

        if self.commit.max_attempts == 0 {
            return Err(ChatError::Config(
                "commit.max_attempts must be at least 1".to_string(),
            ));
        }

        let manager = SessionManager::new(Arc::clone(&store));
        let orchestrator =
            TurnOrchestrator::new(generator, store, self.system_instruction, self.commit);

        Ok(ChatFlow::new(manager, orchestrator))
    }
}

impl Default for ChatFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Session store over an object store, keyed under `config.prefix` when set
fn object_sessions(inner: Arc<dyn ObjectStore>, config: &StorageConfig) -> ObjectSessionStore {
    let store = ObjectSessionStore::new(inner);
    match &config.prefix {
        Some(prefix) => store.with_prefix(prefix.clone()),
        None => store,
    }
}

/// Open the session store selected by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn SessionStore>, ChatError> {
    let store: Arc<dyn SessionStore> = match config.backend {
        StorageBackend::Gcs => {
            let gcs = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(&config.bucket)
                .build()
                .map_err(|e| ChatError::Config(format!("failed to open GCS bucket: {}", e)))?;
            info!(bucket = %config.bucket, project = %config.project_id, "using GCS session storage");
            Arc::new(object_sessions(Arc::new(gcs), config))
        }
        StorageBackend::Memory => {
            info!("using in-memory session storage");
            Arc::new(object_sessions(Arc::new(InMemory::new()), config))
        }
        StorageBackend::Sqlite => {
            let path = config.path.as_ref().ok_or_else(|| {
                ChatError::Config("storage.path is required for the sqlite backend".to_string())
            })?;
            info!(path = %path.display(), "using SQLite session storage");
            Arc::new(SqliteSessionStore::new(path).map_err(|e| {
                ChatError::Config(format!("failed to initialize SQLite storage: {}", e))
            })?)
        }
    };
    Ok(store)
}
