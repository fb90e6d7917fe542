use crate::chunking::ChunkingConfig;
use crate::error::RagError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Backend used to turn chunk text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Offline hashed character trigrams.
    Ngram,
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "ngram" => Ok(Self::Ngram),
            other => Err(format!(
                "unknown embedding provider '{other}' (expected 'ollama' or 'ngram')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub ollama_url: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;

        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be at least 1".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidConfig(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(RagError::InvalidConfig(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.ollama_url.trim().is_empty() {
            return Err(RagError::InvalidConfig("ollama url is empty".to_string()));
        }
        if self.embedding_model.trim().is_empty() || self.chat_model.trim().is_empty() {
            return Err(RagError::InvalidConfig("model names must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let config = RagConfig {
            temperature: 3.5,
            ..RagConfig::default()
        };
        assert!(matches!(config.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_top_k() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert_eq!(" ngram ".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ngram));
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }
}
