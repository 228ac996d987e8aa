//! Deployment configuration.
//!
//! Values resolve with precedence: command line > environment > config file >
//! defaults. The binary applies command-line overrides after [`ServiceConfig::load`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatError;

pub const DEFAULT_PORT: u16 = 2222;
pub const DEFAULT_CONFIG_FILE: &str = "parlance.toml";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Port the HTTP listener binds to
    pub port: u16,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub commit: CommitConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

/// Where sessions are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Google Cloud Storage bucket
    #[default]
    Gcs,
    /// Process-local, lost on exit
    Memory,
    /// SQLite database file
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            _ => anyhow::bail!(
                "invalid storage backend '{}' (expected: gcs, memory, sqlite)",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// GCS bucket holding session objects
    pub bucket: String,
    /// GCP project owning the bucket
    pub project_id: String,
    /// Optional key prefix inside the bucket
    pub prefix: Option<String>,
    /// Database path for the sqlite backend
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            bucket: "lon-next.firebasestorage.app".to_string(),
            project_id: "lon-next".to_string(),
            prefix: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Backend provider ("google", "anthropic", "openai")
    pub provider: String,
    pub model: String,
    /// Instruction sent with every request
    pub system_instruction: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on a single backend call
    pub timeout_secs: u64,
    /// Serving region of the backend, informational
    pub location: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            model: "gemini-2.0-flash-001".to_string(),
            system_instruction: "talk like a pirate".to_string(),
            temperature: 1.0,
            max_tokens: 8192,
            timeout_secs: 120,
            location: "us-central1".to_string(),
        }
    }
}

/// How the orchestrator commits updated sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Reject stale writes by version and merge instead of overwriting
    pub optimistic: bool,
    /// Write attempts before a conflict is reported as a persistence failure
    pub max_attempts: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            optimistic: true,
            max_attempts: 3,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path` (or `./parlance.toml` when present),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `PORT`, `PARLANCE_STORAGE`, `PARLANCE_BUCKET` and `PARLANCE_MODEL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value: {}", port))?;
        }
        if let Some(backend) = lookup("PARLANCE_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(bucket) = lookup("PARLANCE_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(model) = lookup("PARLANCE_MODEL") {
            self.generation.model = model;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        let invalid = |msg: &str| Err(ChatError::Config(msg.to_string()));

        if self.port == 0 {
            return invalid("port must be non-zero");
        }
        match self.storage.backend {
            StorageBackend::Gcs if self.storage.bucket.trim().is_empty() => {
                return invalid("storage.bucket is required for the gcs backend");
            }
            StorageBackend::Sqlite if self.storage.path.is_none() => {
                return invalid("storage.path is required for the sqlite backend");
            }
            _ => {}
        }
        if self.commit.max_attempts == 0 {
            return invalid("commit.max_attempts must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return invalid("generation.temperature must be between 0.0 and 2.0");
        }
        if self.generation.timeout_secs == 0 {
            return invalid("generation.timeout_secs must be non-zero");
        }
        if self.generation.system_instruction.trim().is_empty() {
            return invalid("generation.system_instruction must not be empty");
        }
        Ok(())
    }
}
