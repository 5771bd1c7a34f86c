use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory of shared reference documents the global index is built from.
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./corpus")
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
    800
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved for owner-scoped queries. Global fallback queries
    /// are unrestricted.
    #[serde(default = "default_session_k")]
    pub session_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            session_k: default_session_k(),
        }
    }
}

fn default_session_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    /// Byte ceiling for one owner's index directory.
    #[serde(default = "default_max_index_bytes")]
    pub max_index_bytes: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_index_bytes: default_max_index_bytes(),
        }
    }
}

fn default_max_index_bytes() -> u64 {
    100 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash` (deterministic, offline) or `openai` (HTTP).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_url")]
    pub url: String,
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
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            url: default_embedding_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `extractive` (offline, answers verbatim from retrieved chunks) or
    /// `openai` (chat completions HTTP).
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_chat_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: None,
            url: default_chat_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "extractive".to_string()
}
fn default_chat_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// `disabled` (images yield no text) or `vision` (image transcription
    /// through a chat-completions endpoint).
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_chat_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            model: None,
            url: default_chat_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_ocr_provider() -> String {
    "disabled".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    45
}

impl Config {
    pub fn uploads_root(&self) -> PathBuf {
        self.storage.data_dir.join("uploads")
    }

    pub fn upload_dir(&self, owner: &str) -> PathBuf {
        self.uploads_root().join(owner)
    }

    pub fn meta_path(&self, owner: &str) -> PathBuf {
        self.upload_dir(owner).join("meta.json")
    }

    pub fn history_path(&self, owner: &str) -> PathBuf {
        self.upload_dir(owner).join("history.json")
    }

    pub fn owner_index_dir(&self, owner: &str) -> PathBuf {
        self.storage.data_dir.join("indexes").join("users").join(owner)
    }

    pub fn global_index_dir(&self) -> PathBuf {
        self.storage.data_dir.join("indexes").join("global")
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
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.session_k == 0 {
        anyhow::bail!("retrieval.session_k must be >= 1");
    }

    if config.quota.max_index_bytes == 0 {
        anyhow::bail!("quota.max_index_bytes must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "extractive" => {}
        "openai" => {
            if config.completion.model.is_none() {
                anyhow::bail!("completion.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be extractive or openai.",
            other
        ),
    }

    match config.ocr.provider.as_str() {
        "disabled" => {}
        "vision" => {
            if config.ocr.model.is_none() {
                anyhow::bail!("ocr.model must be specified when provider is 'vision'");
            }
        }
        other => anyhow::bail!("Unknown ocr provider: '{}'. Must be disabled or vision.", other),
    }

    Ok(())
}
