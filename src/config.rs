//! YAML configuration.
//!
//! Every field has a default, so a missing `config.yaml` simply means "use the
//! defaults". API keys never live here; they come from the CLI or the
//! environment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// File looked for in the working directory when `--config` isn't given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub fetch: FetchConfig,
    pub pipeline: PipelineConfig,
    pub knowledge: KnowledgeConfig,
    /// Where approved scrapers are persisted.
    pub registry_path: String,
    /// Natural language the answers are written in.
    pub answer_language: String,
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// OpenAI-compatible embedding settings.
///
/// The prefixes express the document/query purpose for models trained with
/// asymmetric instructions (e.g. `search_document: `).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Defaults to the LLM `api_base` when unset.
    pub api_base: Option<String>,
    pub model: String,
    pub dimensions: Option<usize>,
    pub document_prefix: String,
    pub query_prefix: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub simple_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub settle_secs: u64,
    /// Explicit browser binary; otherwise the usual Chromium names are searched on `PATH`.
    pub browser_binary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Characters of pretty-printed `<body>` sent to stage 1.
    pub sample_chars: usize,
    /// Containers sent to stage 2.
    pub max_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub top_k: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            fetch: FetchConfig::default(),
            pipeline: PipelineConfig::default(),
            knowledge: KnowledgeConfig::default(),
            registry_path: "scrapers.json".to_string(),
            answer_language: "English".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            document_prefix: String::new(),
            query_prefix: String::new(),
            timeout_secs: 60,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            simple_timeout_secs: 15,
            navigation_timeout_secs: 30,
            settle_secs: 7,
            browser_binary: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_chars: 100_000,
            max_samples: 5,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_pause_ms: 1000,
            top_k: 7,
        }
    }
}

impl FetchConfig {
    pub fn simple_timeout(&self) -> Duration {
        Duration::from_secs(self.simple_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

impl KnowledgeConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist and parse. Without one, `config.yaml` in
    /// the working directory is used if present, and the defaults otherwise.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_string(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
            None => {
                info!("No config file found; using defaults");
                return Ok(Self::default());
            }
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        info!(config_path = %path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: AppConfig = serde_yaml::from_str(raw)?;
        if config.registry_path.is_empty() {
            config.registry_path = "scrapers.json".to_string();
        }
        if config.answer_language.is_empty() {
            config.answer_language = "English".to_string();
        }
        Ok(config)
    }

    /// Base URL for the embeddings endpoint.
    pub fn embedding_api_base(&self) -> &str {
        self.embedding
            .api_base
            .as_deref()
            .unwrap_or(&self.llm.api_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.fetch.simple_timeout_secs, 15);
        assert_eq!(config.fetch.navigation_timeout_secs, 30);
        assert_eq!(config.fetch.settle_secs, 7);
        assert_eq!(config.pipeline.sample_chars, 100_000);
        assert_eq!(config.pipeline.max_samples, 5);
        assert_eq!(config.knowledge.batch_size, 100);
        assert_eq!(config.knowledge.top_k, 7);
        assert_eq!(config.registry_path, "scrapers.json");
        assert_eq!(config.answer_language, "English");
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
llm:
  api_base: http://localhost:11434/v1
  model: qwen2.5:14b
embedding:
  model: nomic-embed-text
  document_prefix: "search_document: "
  query_prefix: "search_query: "
knowledge:
  top_k: 3
answer_language: Persian
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.model, "qwen2.5:14b");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.embedding.query_prefix, "search_query: ");
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.knowledge.batch_size, 100);
        assert_eq!(config.answer_language, "Persian");
        assert_eq!(config.embedding_api_base(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_load_explicit_missing_file_errors() {
        let err = AppConfig::load(Some("/nonexistent/scout.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.yaml");
        std::fs::write(&path, "registry_path: /tmp/s.json\n").unwrap();
        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.registry_path, "/tmp/s.json");
    }
}
