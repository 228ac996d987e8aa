mod backend;
mod provider;

pub use backend::LlmGenerator;
pub use provider::{GenerationRequest, Generator};
