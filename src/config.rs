//! Configuration parsing and validation.
//!
//! SQL Copilot is configured with a TOML file (default `./config/copilot.toml`).
//! Only `[db]` is required; every other section has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/ecommerce.db"
//!
//! [index]
//! path = "./data/schema_index.sqlite"
//!
//! [retrieval]
//! rag_enabled = true
//! top_k = 5
//! min_similarity = 0.3
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [llm]
//! provider = "ollama"
//! model = "qwen2.5-coder:7b"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sql_copilot_core::synthesis::SynthesisConfig;
use sql_copilot_core::validator::{Validator, DEFAULT_ALLOWED_STATEMENTS, DEFAULT_DENIED_KEYWORDS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The target database that questions are asked about.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the persistent schema index lives.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/schema_index.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub rag_enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_max_fk_hops")]
    pub max_fk_hops: usize,
    #[serde(default = "default_max_tables")]
    pub max_tables: usize,
    #[serde(default)]
    pub include_referencing_tables: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_enabled: true,
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            max_fk_hops: default_max_fk_hops(),
            max_tables: default_max_tables(),
            include_referencing_tables: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.3
}
fn default_max_fk_hops() -> usize {
    1
}
fn default_max_tables() -> usize {
    12
}

/// `[synthesis]`: loop budget, timeouts, and validator lists.
#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
    #[serde(default = "default_allowed_statements")]
    pub allowed_statements: Vec<String>,
    #[serde(default = "default_denied_keywords")]
    pub denied_keywords: Vec<String>,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            execution_timeout_secs: default_execution_timeout_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            max_result_rows: default_max_result_rows(),
            allowed_statements: default_allowed_statements(),
            denied_keywords: default_denied_keywords(),
        }
    }
}

fn default_max_rounds() -> u32 {
    3
}
fn default_execution_timeout_secs() -> u64 {
    30
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_max_result_rows() -> usize {
    1000
}
fn default_allowed_statements() -> Vec<String> {
    DEFAULT_ALLOWED_STATEMENTS.iter().map(|s| s.to_string()).collect()
}
fn default_denied_keywords() -> Vec<String> {
    DEFAULT_DENIED_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 32,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "qwen2.5-coder:7b".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Config pointing at a database path with every other section defaulted.
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisSettings::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// The per-request settings handed to the synthesis loop.
    ///
    /// Retrieval is only enabled when an embedding provider is configured.
    pub fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            rag_enabled: self.retrieval.rag_enabled && self.embedding.is_enabled(),
            top_k: self.retrieval.top_k,
            min_similarity: self.retrieval.min_similarity,
            max_fk_hops: self.retrieval.max_fk_hops,
            max_tables: self.retrieval.max_tables,
            include_referencing_tables: self.retrieval.include_referencing_tables,
            max_rounds: self.synthesis.max_rounds,
            generation_timeout: Duration::from_secs(self.synthesis.generation_timeout_secs),
            execution_timeout: Duration::from_secs(self.synthesis.execution_timeout_secs),
            max_result_rows: self.synthesis.max_result_rows,
        }
    }

    /// [`synthesis_config`](Self::synthesis_config) with per-request
    /// overrides from `--no-rag`/`--max-rounds` or the HTTP body.
    pub fn request_config(
        &self,
        rag_enabled: Option<bool>,
        max_rounds: Option<u32>,
    ) -> SynthesisConfig {
        let mut synth = self.synthesis_config();
        if let Some(rag) = rag_enabled {
            synth.rag_enabled = rag && self.embedding.is_enabled();
        }
        if let Some(rounds) = max_rounds {
            synth.max_rounds = rounds.max(1);
        }
        synth
    }

    pub fn validator(&self) -> Validator {
        Validator::new(
            self.synthesis.allowed_statements.clone(),
            self.synthesis.denied_keywords.clone(),
        )
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }
    if config.retrieval.max_tables < 1 {
        anyhow::bail!("retrieval.max_tables must be >= 1");
    }

    // Validate synthesis
    if config.synthesis.max_rounds < 1 {
        anyhow::bail!("synthesis.max_rounds must be >= 1");
    }
    if config.synthesis.max_result_rows < 1 {
        anyhow::bail!("synthesis.max_result_rows must be >= 1");
    }
    if config.synthesis.execution_timeout_secs == 0
        || config.synthesis.generation_timeout_secs == 0
    {
        anyhow::bail!("synthesis timeouts must be > 0");
    }
    if config.synthesis.allowed_statements.is_empty() {
        anyhow::bail!("synthesis.allowed_statements must not be empty");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.provider != "local" {
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
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"shop.db\"\n").unwrap();
        assert_eq!(config.db.path, PathBuf::from("shop.db"));
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.synthesis.max_rounds, 3);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.server.bind, "127.0.0.1:7331");

        let synth = config.synthesis_config();
        assert!(!synth.rag_enabled, "no embedder means no retrieval");
        assert_eq!(synth.execution_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/copilot.example.toml")).unwrap();
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.synthesis.allowed_statements, vec!["SELECT", "WITH"]);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(parse("[db]\npath = \"a\"\n[retrieval]\nmin_similarity = 1.5\n").is_err());
        assert!(parse("[db]\npath = \"a\"\n[retrieval]\ntop_k = 0\n").is_err());
        assert!(parse("[db]\npath = \"a\"\n[synthesis]\nmax_rounds = 0\n").is_err());
        assert!(parse("[db]\npath = \"a\"\n[llm]\nprovider = \"bard\"\n").is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse("[db]\npath = \"a\"\n[embedding]\nprovider = \"ollama\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("embedding.dims"), "got: {err}");

        let config = parse(
            "[db]\npath = \"a\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        assert!(config.synthesis_config().rag_enabled);

        let overridden = config.request_config(Some(false), Some(0));
        assert!(!overridden.rag_enabled);
        assert_eq!(overridden.max_rounds, 1);
        assert_eq!(config.synthesis_config().max_rounds, 3);
    }
}
