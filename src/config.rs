use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Pool size. A handful is plenty for a single-process knowledge base.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of results returned by search when the caller does
    /// not pass an explicit limit.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Maximum characters of chunk text quoted per result by the formatter.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_limit() -> i64 {
    5
}
fn default_snippet_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`. Disabled runs the store in
    /// degraded mode: chunks are stored without vectors and search falls
    /// back to the keyword index.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    /// Retries for transient provider failures (429/5xx/network) only.
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
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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
    "127.0.0.1:7410".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // The chunker cursor advances by chunk_size - overlap; reject any
    // configuration that would fail to advance.
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap == 0 || config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap must satisfy 0 < overlap < chunk_size (got overlap={}, chunk_size={})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.limit < 1 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("[db]\npath = \"kb.sqlite\"\n").unwrap();
        assert_eq!(config.db.max_connections, 5);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.limit, 5);
        assert_eq!(config.embedding.provider, "disabled");
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_overlap_underflow_rejected() {
        let err = parse(
            "[db]\npath = \"kb.sqlite\"\n[chunking]\nchunk_size = 200\noverlap = 200\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let err = parse(
            "[db]\npath = \"kb.sqlite\"\n[embedding]\nprovider = \"openai\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            "[db]\npath = \"kb.sqlite\"\n[embedding]\nprovider = \"cohere\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
