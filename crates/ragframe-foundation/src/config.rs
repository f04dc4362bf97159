//! Application configuration
//!
//! Every section is optional in the file and falls back to local-development
//! defaults, so an empty file (or no file) describes a stack running on
//! localhost.
//!
//! ```toml
//! [qdrant]
//! url = "http://qdrant:6334"
//! collection = "papers"
//!
//! [openai]
//! api_key = "${OPENAI_API_KEY}"
//!
//! [query]
//! top_k = 3
//! hybrid = true
//! ```

use crate::embedder::EmbedderConfig;
use crate::llm::{OllamaConfig, OpenAIConfig};
use crate::rag::{QdrantConfig, WeaviateConfig};
use ragframe_kernel::config::{self, ConfigResult, Format};
use ragframe_kernel::rag::{GenerateOptions, QueryOptions, RetrieveOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `RAGFRAME_QUERY__TOP_K=3`.
pub const ENV_PREFIX: &str = "RAGFRAME";

/// Query defaults applied before command-line overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub hybrid: bool,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub timeout_secs: Option<u64>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            top_k: ragframe_kernel::rag::DEFAULT_TOP_K,
            score_threshold: None,
            hybrid: false,
            temperature: None,
            max_tokens: 0,
            timeout_secs: None,
        }
    }
}

impl QueryDefaults {
    pub fn to_query_options(&self) -> QueryOptions {
        QueryOptions {
            retrieve: RetrieveOptions {
                top_k: self.top_k,
                score_threshold: self.score_threshold,
                ..Default::default()
            },
            generate: GenerateOptions {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                ..Default::default()
            },
            hybrid: self.hybrid,
            timeout: self.timeout_secs.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedder: EmbedderConfig,
    pub qdrant: QdrantConfig,
    pub weaviate: WeaviateConfig,
    pub ollama: OllamaConfig,
    pub openai: OpenAIConfig,
    pub query: QueryDefaults,
}

impl RagConfig {
    /// Load from a file; format follows the extension.
    pub fn load(path: &str) -> ConfigResult<Self> {
        config::load_config(path)
    }

    /// Load an optional file, then apply `RAGFRAME_*` environment overrides.
    pub fn load_with_env(path: Option<&str>) -> ConfigResult<Self> {
        config::load_with_env(path, ENV_PREFIX)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        config::from_str(content, Format::Toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragframe_kernel::config::ConfigError;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = RagConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RagConfig::default());
        assert_eq!(cfg.embedder.url, "http://localhost:8082/embed");
        assert_eq!(cfg.qdrant.url, "http://localhost:6334");
        assert_eq!(cfg.qdrant.collection, "documents");
        assert_eq!(cfg.weaviate.class_name, "Document");
        assert_eq!(cfg.ollama.model, "mistral");
        assert_eq!(cfg.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.query.top_k, 5);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let cfg = RagConfig::from_toml_str(
            r#"
[qdrant]
collection = "papers"

[query]
top_k = 3
hybrid = true
temperature = 0.2
timeout_secs = 30
"#,
        )
        .unwrap();

        assert_eq!(cfg.qdrant.collection, "papers");
        assert_eq!(cfg.qdrant.url, "http://localhost:6334");

        let opts = cfg.query.to_query_options();
        assert_eq!(opts.retrieve.top_k, 3);
        assert!(opts.hybrid);
        assert_eq!(opts.generate.temperature, Some(0.2));
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
        assert!(opts.fallback.on_empty);
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ragframe.yaml");
        std::fs::write(&path, "ollama:\n  base_url: http://gpu-box:11434\n  model: llama3\n").unwrap();

        let cfg = RagConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(cfg.ollama.model, "llama3");
    }

    #[test]
    fn test_bad_type_is_reported() {
        let err = RagConfig::from_toml_str("[query]\ntop_k = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Serialization(_)));
    }
}
