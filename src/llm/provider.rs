use async_trait::async_trait;

use crate::error::GenerationError;
use crate::session::Turn;

/// Everything a backend needs to produce the next agent turn
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Fixed per-deployment instruction
    pub system: String,
    /// Prior turns, oldest first
    pub history: Vec<Turn>,
    /// The new user text
    pub prompt: String,
}

/// Trait for generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the agent's reply to `request.prompt`
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Get the backend name
    fn name(&self) -> &str;
}
