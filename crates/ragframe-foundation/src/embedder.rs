//! HTTP embedding client
//!
//! Speaks the text-embeddings-inference wire format: `POST {url}` with
//! `{"inputs": [text]}`, answered by a list of vectors.

use crate::http;
use async_trait::async_trait;
use ragframe_kernel::rag::Embedder;
use ragframe_kernel::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const BACKEND: &str = "embedder";

/// Embedding endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Full endpoint URL (default: http://localhost:8082/embed)
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8082/embed".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EmbedderConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: [&'a str; 1],
}

/// [`Embedder`] backed by an HTTP embedding service.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbedderConfig) -> Self {
        Self {
            client: http::client(config.timeout_secs),
            config,
        }
    }

    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_text(&self, text: &str) -> RagResult<Vec<f32>> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&EmbedRequest { inputs: [text] })
            .send()
            .await
            .map_err(|e| http::map_error(BACKEND, e))?;

        let vectors: Vec<Vec<f32>> = http::read_json(BACKEND, response).await?;
        let vector = vectors
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RagError::decode("embedder returned no vector"))?;

        debug!(dims = vector.len(), "embedded text");
        Ok(vector)
    }
}
