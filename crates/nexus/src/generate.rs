//! Text generation providers.
//!
//! - **[`DisabledGenerator`]**: returns errors; `nexus ask` then fails with a
//!   configuration hint.
//! - **[`OllamaGenerator`]**: non-streaming `POST {url}/api/generate`.
//!
//! Requests share the retry policy of the embedding providers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use nexus_core::generate::{GenerationParams, Generator};

use crate::config::GenerationConfig;
use crate::embedding::post_json_with_retry;

const GENERATION_MAX_RETRIES: u32 = 2;

/// Placeholder used when no generation provider is configured.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        bail!("Generation provider is disabled; set [generation] provider in the config")
    }
}

/// Generator backed by a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

fn request_body(model: &str, prompt: &str, params: &GenerationParams) -> serde_json::Value {
    let mut options = serde_json::Map::new();
    if let Some(max_tokens) = params.max_tokens {
        options.insert("num_predict".to_string(), max_tokens.into());
    }
    if let Some(temperature) = params.temperature {
        options.insert("temperature".to_string(), temperature.into());
    }
    serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": options,
    })
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = request_body(&self.model, prompt, params);
        let json = match post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            None,
            &body,
            GENERATION_MAX_RETRIES,
            "Ollama",
        )
        .await?
        {
            Ok(json) => json,
            Err(f) => bail!("Ollama API error {}: {}", f.status, f.body),
        };

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response text"))
    }
}

/// Create a generator from configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_maps_options() {
        let params = GenerationParams {
            max_tokens: Some(128),
            temperature: Some(0.5),
        };
        let body = request_body("llama", "hi", &params);
        assert_eq!(body["model"], "llama");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_request_body_omits_unset_options() {
        let body = request_body("llama", "hi", &GenerationParams::default());
        assert!(body["options"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.model_name(), "disabled");
        assert!(generator
            .generate("prompt", &GenerationParams::default())
            .await
            .is_err());
    }
}
