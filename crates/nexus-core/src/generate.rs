//! Text generation capability.
//!
//! Chat providers are external collaborators; the pipeline only needs
//! "prompt in, text out". Implementations live in the `nexus` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Sampling parameters passed through to the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Produces text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.1:8b-instruct"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}
