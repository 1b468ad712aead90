use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ingest::ChunkingParams;
use crate::retrieval::RecencyParams;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `openai` (any OpenAI-compatible server) or `none`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// `openai` (any OpenAI-compatible server) or `none`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    /// Minimum candidate count pulled from each retriever before fusion.
    pub candidate_floor: usize,
    pub rrf_k: usize,
    pub half_life_days: f64,
    pub recency_weight: f64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub search_preview_chars: usize,
    pub source_preview_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5278,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_data_dir()
            .join("journal.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            base_url: "http://127.0.0.1:8081".into(),
            model: "nomic-embed-text".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            base_url: "http://127.0.0.1:8080".into(),
            model: "llama3.1:8b".into(),
            api_key: None,
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 12,
            candidate_floor: 20,
            rrf_k: 60,
            half_life_days: 30.0,
            recency_weight: 0.15,
            chunk_size: 2400,
            chunk_overlap: 200,
            search_preview_chars: 500,
            source_preview_chars: 200,
        }
    }
}

impl RetrievalConfig {
    pub fn chunking(&self) -> ChunkingParams {
        ChunkingParams {
            target_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    pub fn recency(&self) -> RecencyParams {
        RecencyParams {
            half_life_days: self.half_life_days,
            weight: self.recency_weight,
        }
    }
}

/// Returns `~/.journal-rag/`, or `./.journal-rag` when there is no home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".journal-rag")
}

/// Returns the default config file path: `~/.journal-rag/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl Config {
    /// Load config from the default TOML file (if it exists), then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `JRAG_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `JRAG_*` overrides read through `lookup`.
    ///
    /// Setting an endpoint URL also enables that provider.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("JRAG_DB") {
            self.storage.db_path = val;
        }
        if let Some(val) = lookup("JRAG_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("JRAG_PORT") {
            self.server.port = val.parse().context("JRAG_PORT must be a port number")?;
        }
        if let Some(val) = lookup("JRAG_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(val) = lookup("JRAG_EMBED_URL") {
            self.embedding.base_url = val;
            self.embedding.provider = "openai".into();
        }
        if let Some(val) = lookup("JRAG_EMBED_MODEL") {
            self.embedding.model = val;
        }
        if let Some(val) = lookup("JRAG_CHAT_URL") {
            self.chat.base_url = val;
            self.chat.provider = "openai".into();
        }
        if let Some(val) = lookup("JRAG_CHAT_MODEL") {
            self.chat.model = val;
        }
        if let Some(val) = lookup("JRAG_MAX_TOKENS") {
            self.chat.max_tokens = val
                .parse()
                .context("JRAG_MAX_TOKENS must be a positive integer")?;
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
