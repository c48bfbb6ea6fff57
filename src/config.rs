/// Configuration module for MediGuide.
///
/// Handles loading, validating, and providing default configuration values.
/// Credentials are never stored in the file itself — the config holds the
/// names of the environment variables that carry them.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_corpus_patterns() -> Vec<String> {
    vec!["./data".to_string()]
}

fn default_index_path() -> String {
    "./vectorstore/index.db".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    3
}

fn default_history_window() -> usize {
    6
}

fn default_embed_workers() -> usize {
    4
}

fn default_embed_batch_size() -> usize {
    32
}

fn default_read_pool_size() -> u32 {
    8
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "./models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_primary_key_env() -> String {
    "MEDIGUIDE_PRIMARY_API_KEY".to_string()
}

fn default_fallback_key_env() -> String {
    "MEDIGUIDE_FALLBACK_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_in_flight() -> usize {
    8
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Glob patterns (or plain directories) selecting corpus files.
    #[serde(default = "default_corpus_patterns")]
    pub corpus_patterns: Vec<String>,

    /// Path of the persisted index artifact.
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks, in characters. Must be smaller
    /// than `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// How many trailing conversation turns are kept in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Bounded worker pool size for embedding during an index build.
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,

    /// Number of chunks embedded per worker task.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    /// Read-only connection pool size for serving retrievals.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: u32,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root, e.g. `https://api.groq.com/openai/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for the primary attempt.
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Model used for the fallback attempt (defaults to the primary model).
    #[serde(default = "default_generation_model")]
    pub fallback_model: String,

    /// Environment variable holding the primary credential.
    #[serde(default = "default_primary_key_env")]
    pub primary_key_env: String,

    /// Environment variable holding the fallback credential.
    #[serde(default = "default_fallback_key_env")]
    pub fallback_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout applied to each provider attempt independently.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent in-flight provider calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus_patterns: default_corpus_patterns(),
            index_path: default_index_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            history_window: default_history_window(),
            embed_workers: default_embed_workers(),
            embed_batch_size: default_embed_batch_size(),
            read_pool_size: default_read_pool_size(),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_generation_model(),
            fallback_model: default_generation_model(),
            primary_key_env: default_primary_key_env(),
            fallback_key_env: default_fallback_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"mediguide.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file at the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "mediguide.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "mediguide.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.top_k > 0, "top_k must be positive");
        anyhow::ensure!(self.embed_workers > 0, "embed_workers must be positive");
        anyhow::ensure!(
            self.embed_batch_size > 0,
            "embed_batch_size must be positive"
        );
        anyhow::ensure!(self.read_pool_size > 0, "read_pool_size must be positive");
        anyhow::ensure!(
            !self.corpus_patterns.is_empty(),
            "at least one corpus pattern must be specified"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.generation.temperature >= 0.0 && self.generation.temperature.is_finite(),
            "generation.temperature must be non-negative"
        );
        anyhow::ensure!(
            self.generation.timeout_secs > 0,
            "generation.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.generation.max_in_flight > 0,
            "generation.max_in_flight must be positive"
        );
        Ok(())
    }
}

impl GenerationConfig {
    /// Resolve the primary credential from the environment.
    pub fn primary_key(&self) -> Result<String> {
        std::env::var(&self.primary_key_env)
            .with_context(|| format!("missing credential: set {}", self.primary_key_env))
    }

    /// Resolve the fallback credential from the environment.
    pub fn fallback_key(&self) -> Result<String> {
        std::env::var(&self.fallback_key_env)
            .with_context(|| format!("missing credential: set {}", self.fallback_key_env))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.history_window, 6);
        assert_eq!(config.model.dimensions, 384);
        assert_eq!(config.model.name, "all-MiniLM-L6-v2");
        assert_eq!(config.generation.model, "llama-3.1-8b-instant");
        assert_eq!(config.generation.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.generation.max_tokens, 512);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 1000, "index_path": "./test.db"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.index_path, "./test.db");
        // Other fields should have defaults
        assert_eq!(config.top_k, 3);
        assert_eq!(config.model.dimensions, 384);
        assert_eq!(config.generation.timeout_secs, 30);
    }

    #[test]
    fn test_nested_generation_overrides() {
        let json = r#"{"generation": {"model": "llama-3.3-70b-versatile", "temperature": 0.2}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.generation.model, "llama-3.3-70b-versatile");
        assert!((config.generation.temperature - 0.2).abs() < f32::EPSILON);
        // Fallback model keeps its own default, independent of the primary
        assert_eq!(config.generation.fallback_model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.chunk_size = 100;
        config.chunk_overlap = 100;
        assert!(config.validate().is_err());

        config.chunk_overlap = 150;
        assert!(config.validate().is_err());

        config.chunk_overlap = 99;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_patterns() {
        let mut config = Config::default();
        config.corpus_patterns = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credential_names_env_var() {
        let mut generation = GenerationConfig::default();
        generation.primary_key_env = "MEDIGUIDE_TEST_NO_SUCH_KEY".to_string();
        let err = generation.primary_key().unwrap_err();
        assert!(err.to_string().contains("MEDIGUIDE_TEST_NO_SUCH_KEY"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert_eq!(parsed.index_path, config.index_path);
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(parsed.generation.primary_key_env, config.generation.primary_key_env);
    }

    #[test]
    fn test_credentials_never_serialized() {
        // The config file carries env var names, never key material.
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("MEDIGUIDE_PRIMARY_API_KEY"));
        assert!(!json.to_lowercase().contains("api_key\":\"gsk_"));
    }
}
