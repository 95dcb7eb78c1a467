//! Configuration parsing and validation.
//!
//! Nexus is configured via a TOML file (default: `config/nexus.toml`).
//! Every section except `[db]` and `[collections.*]` has defaults, so a
//! minimal file names a database and at least one collection.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/nexus.sqlite"
//!
//! [embedding]
//! provider = "ollama"
//! model = "mxbai-embed-large"
//! dims = 1024
//!
//! [collections.library]
//! roots = ["/corpora/library"]
//! exclude = ["**/drafts/**"]
//! tags = ["library"]
//! ```
//!
//! [`load_config`] validates the file after parsing and rejects anything
//! the ingestion pipeline cannot run with.

use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nexus_core::chunk::ChunkParams;
use nexus_core::quality::QualityThresholds;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/nexus.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub quality: QualityThresholds,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Input length used for the single retry after an Ollama
    /// "context length" rejection.
    pub truncate_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            truncate_chars: 400,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 80,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_file_size_mb: u64,
    /// When non-empty, every root must lie under one of these.
    pub allowed_roots: Vec<PathBuf>,
    pub blocked_roots: Vec<PathBuf>,
    /// Follow symlinked files and directories while walking.
    pub follow_symlinks: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            allowed_roots: Vec::new(),
            blocked_roots: ["/etc", "/proc", "/sys", "/dev"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            follow_symlinks: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OcrConfig {
    pub program: String,
    pub processed_dir: PathBuf,
    pub jobs: u32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            program: "ocrmypdf".to_string(),
            processed_dir: PathBuf::from("./processed"),
            jobs: 4,
            timeout_secs: 300,
            max_attempts: 3,
            backoff_initial_secs: 2,
            backoff_max_secs: 60,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HooksConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("./hooks"),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: Option<String>,
    pub url: String,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
            max_tokens: Some(4096),
            temperature: None,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_score: None,
        }
    }
}

/// One `[collections.<name>]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Config {
    /// Look up a collection's configuration by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.get(name)
    }

    /// Declared embedding dimensionality, `0` when unset.
    pub fn embed_dim(&self) -> usize {
        self.embedding.dims.unwrap_or(0)
    }
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        tracing::warn!(
            chunk_size = config.chunking.chunk_size,
            overlap = config.chunking.overlap,
            "chunking.overlap >= chunk_size; windows will advance one character at a time"
        );
    }

    // Quality
    if !(0.0..=1.0).contains(&config.quality.max_empty_ratio) {
        anyhow::bail!("quality.max_empty_ratio must be in [0.0, 1.0]");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    // OCR
    if config.ocr.max_attempts < 1 {
        anyhow::bail!("ocr.max_attempts must be >= 1");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Collections
    for (name, collection) in &config.collections {
        if collection.roots.is_empty() {
            anyhow::bail!("collections.{} must list at least one root", name);
        }
        for pattern in collection.include.iter().chain(collection.exclude.iter()) {
            Glob::new(pattern).with_context(|| {
                format!("collections.{}: invalid glob pattern '{}'", name, pattern)
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/nexus.sqlite"

[collections.library]
roots = ["/corpora/library"]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.overlap, 80);
        assert_eq!(config.quality.min_chars, 500);
        assert!((config.quality.max_empty_ratio - 0.30).abs() < 1e-9);
        assert_eq!(config.discovery.max_file_size_mb, 100);
        assert_eq!(config.ocr.program, "ocrmypdf");
        assert_eq!(config.ocr.max_attempts, 3);
        assert_eq!(config.hooks.timeout_secs, 60);
        assert!(!config.embedding.is_enabled());
        assert!(config.collection("library").is_some());
        assert!(config.collection("missing").is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let text = r#"
[db]
path = "/tmp/nexus.sqlite"

[embedding]
provider = "ollama"
model = "mxbai-embed-large"
dims = 1024

[chunking]
chunk_size = 400
overlap = 40

[quality]
min_chars = 100

[discovery]
allowed_roots = ["/corpora"]

[collections.library]
roots = ["/corpora/library"]
include = ["**/*.pdf"]
exclude = ["**/drafts/**"]
tags = ["library", "2024"]
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.embed_dim(), 1024);
        assert_eq!(config.chunking.params().step(), 360);
        assert_eq!(config.quality.min_chars, 100);
        assert!((config.quality.max_empty_ratio - 0.30).abs() < 1e-9);
        assert_eq!(config.discovery.allowed_roots, vec![PathBuf::from("/corpora")]);
        assert_eq!(config.discovery.blocked_roots.len(), 4);
        let lib = config.collection("library").unwrap();
        assert_eq!(lib.tags, vec!["library", "2024"]);
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let text = format!("{}\n[chunking]\nchunk_size = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_overlap_larger_than_size_is_allowed() {
        let text = format!("{}\n[chunking]\nchunk_size = 10\noverlap = 20\n", MINIMAL);
        assert!(parse_config(&text).is_ok());
    }

    #[test]
    fn test_rejects_bad_empty_ratio() {
        let text = format!("{}\n[quality]\nmax_empty_ratio = 1.5\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_dims_and_model() {
        let no_dims = format!("{}\n[embedding]\nprovider = \"ollama\"\nmodel = \"m\"\n", MINIMAL);
        assert!(parse_config(&no_dims).is_err());
        let no_model = format!("{}\n[embedding]\nprovider = \"openai\"\ndims = 8\n", MINIMAL);
        assert!(parse_config(&no_model).is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let embed = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&embed).is_err());
        let generation = format!("{}\n[generation]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&generation).is_err());
    }

    #[test]
    fn test_rejects_collection_without_roots() {
        let text = "[db]\npath = \"x.sqlite\"\n[collections.empty]\nroots = []\n";
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn test_rejects_invalid_glob() {
        let text = "[db]\npath = \"x.sqlite\"\n[collections.c]\nroots = [\"/a\"]\nexclude = [\"a[\"]\n";
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn test_rejects_zero_ocr_attempts() {
        let text = format!("{}\n[ocr]\nmax_attempts = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }
}
