//! Runtime configuration.
//!
//! Settings are plain data constructed explicitly and passed into services;
//! nothing reads process-wide state after construction. [`Settings::from_env`]
//! loads a `.env` file when present and falls back to defaults for anything
//! unset, so a bare test environment works without configuration.

use std::env;

use serde::{Deserialize, Serialize};

use crate::types::RagError;

/// Tunables for chunking, embedding, retrieval, and chat completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// API key for the AI provider. Empty is allowed for mock/test providers.
    pub api_key: String,
    /// Base URL of an OpenAI-compatible API.
    pub api_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Character overlap carried between consecutive chunks.
    pub chunk_overlap: usize,
    /// Minimum cosine similarity for a vector match.
    pub similarity_threshold: f32,
    /// Maximum number of chunks retrieved per query.
    pub retrieval_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            chat_model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            chunk_size: 1000,
            chunk_overlap: 200,
            similarity_threshold: 0.5,
            retrieval_limit: 5,
        }
    }
}

impl Settings {
    /// Loads settings from the environment, reading `.env` first if present.
    ///
    /// Unset variables keep their defaults; set-but-unparsable numeric
    /// variables are a configuration error rather than a silent fallback.
    pub fn from_env() -> Result<Self, RagError> {
        // Missing .env is fine; only load errors on an existing file matter.
        let _ = dotenvy::dotenv();

        let mut settings = Self::default();
        if let Ok(value) = env::var("DOCUCHAT_API_KEY") {
            settings.api_key = value;
        }
        if let Ok(value) = env::var("DOCUCHAT_API_BASE_URL") {
            settings.api_base_url = value;
        }
        if let Ok(value) = env::var("DOCUCHAT_EMBEDDING_MODEL") {
            settings.embedding_model = value;
        }
        if let Ok(value) = env::var("DOCUCHAT_CHAT_MODEL") {
            settings.chat_model = value;
        }
        settings.embedding_dimensions =
            parse_var("DOCUCHAT_EMBEDDING_DIMENSIONS", settings.embedding_dimensions)?;
        settings.max_tokens = parse_var("DOCUCHAT_MAX_TOKENS", settings.max_tokens)?;
        settings.temperature = parse_var("DOCUCHAT_TEMPERATURE", settings.temperature)?;
        settings.chunk_size = parse_var("DOCUCHAT_CHUNK_SIZE", settings.chunk_size)?;
        settings.chunk_overlap = parse_var("DOCUCHAT_CHUNK_OVERLAP", settings.chunk_overlap)?;
        settings.similarity_threshold =
            parse_var("DOCUCHAT_SIMILARITY_THRESHOLD", settings.similarity_threshold)?;
        settings.retrieval_limit = parse_var("DOCUCHAT_RETRIEVAL_LIMIT", settings.retrieval_limit)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints the chunker and retriever rely on.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_limit == 0 {
            return Err(RagError::Config("retrieval_limit must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, RagError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RagError::Config(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
