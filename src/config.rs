use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::{DEFAULT_EMBED_CONCURRENCY, PipelineSettings};
use crate::qa::QaSettings;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Docsift server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Documents with more pages than this are rejected.
    pub max_pages: usize,
    /// Number of leading chunks shown to the classifier.
    pub classifier_context_chunks: usize,
    /// Number of leading chunks shown to the summarizer.
    pub summarizer_context_chunks: usize,
    /// Chunks retrieved per question before the relevance gate.
    pub qa_top_k: usize,
    /// Minimum cosine similarity a chunk needs to be used as context.
    pub qa_relevance_threshold: f32,
    /// Longest question accepted, in characters.
    pub qa_max_question_chars: usize,
    /// Upper bound on a single document's processing time.
    pub processing_timeout_secs: u64,
    /// Turn swallowed storage failures into pipeline errors.
    pub store_failures_fatal: bool,
    /// Embedding requests in flight at once while ingesting a document.
    pub embed_concurrency: usize,
    /// Backend used to produce embeddings.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Backend used for text generation.
    pub generation_provider: GenerationProvider,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Where chunk records are persisted.
    pub chunk_store: ChunkStoreKind,
    /// Base URL of the Qdrant instance, required when `chunk_store` is `qdrant`.
    pub qdrant_url: Option<String>,
    /// Qdrant collection that holds chunk vectors.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic offline hashing embedder.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported text generation backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Offline stub that echoes the tail of the prompt.
    Echo,
}

/// Supported chunk persistence backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStoreKind {
    /// Process-local store; contents vanish on restart.
    Memory,
    /// Qdrant collection over its REST API.
    Qdrant,
}

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunk_store = parse_or("CHUNK_STORE", ChunkStoreKind::Memory)?;
        let qdrant_url = load_env_optional("QDRANT_URL");
        if chunk_store == ChunkStoreKind::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let config = Self {
            chunk_size: parse_or("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 200)?,
            max_pages: parse_or("MAX_PAGES", 100)?,
            classifier_context_chunks: parse_or("CLASSIFIER_CONTEXT_CHUNKS", 8)?,
            summarizer_context_chunks: parse_or("SUMMARIZER_CONTEXT_CHUNKS", 20)?,
            qa_top_k: parse_or("QA_TOP_K", 8)?,
            qa_relevance_threshold: parse_or("QA_RELEVANCE_THRESHOLD", 0.65)?,
            qa_max_question_chars: parse_or("QA_MAX_QUESTION_CHARS", 1000)?,
            processing_timeout_secs: parse_or("PROCESSING_TIMEOUT_SECS", 300)?,
            store_failures_fatal: parse_flag("STORE_FAILURES_FATAL")?,
            embed_concurrency: parse_or("EMBED_CONCURRENCY", DEFAULT_EMBED_CONCURRENCY)?,
            embedding_provider: parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::Hash)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".into()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 768)?,
            generation_provider: parse_or("GENERATION_PROVIDER", GenerationProvider::Ollama)?,
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| "llama3.1".into()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            chunk_store,
            qdrant_url,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "docsift-chunks".into()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };

        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if config.embed_concurrency == 0 {
            return Err(ConfigError::InvalidValue("EMBED_CONCURRENCY".into()));
        }
        if config.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if !(0.0..=1.0).contains(&config.qa_relevance_threshold) {
            return Err(ConfigError::InvalidValue("QA_RELEVANCE_THRESHOLD".into()));
        }

        Ok(config)
    }

    /// Knobs consumed by the ingestion pipeline stages.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            max_pages: self.max_pages,
            classifier_context_chunks: self.classifier_context_chunks,
            summarizer_context_chunks: self.summarizer_context_chunks,
            store_failures_fatal: self.store_failures_fatal,
            embed_concurrency: self.embed_concurrency,
        }
    }

    /// Knobs consumed by the question-answering service.
    pub fn qa_settings(&self) -> QaSettings {
        QaSettings {
            top_k: self.qa_top_k,
            relevance_threshold: self.qa_relevance_threshold,
            max_question_chars: self.qa_max_question_chars,
        }
    }

    /// Processing timeout as a [`Duration`].
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs.max(1))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag(key: &str) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(false),
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "echo" => Ok(Self::Echo),
            _ => Err(()),
        }
    }
}

impl FromStr for ChunkStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Install tracing first so the load summary is recorded.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    log_loaded(&config);
    Ok(CONFIG.get_or_init(|| config))
}

fn log_loaded(config: &Config) {
    tracing::debug!(
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        max_pages = config.max_pages,
        embed_concurrency = config.embed_concurrency,
        embedding_provider = ?config.embedding_provider,
        generation_provider = ?config.generation_provider,
        chunk_store = ?config.chunk_store,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
}
