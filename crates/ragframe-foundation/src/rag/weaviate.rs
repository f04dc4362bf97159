//! Weaviate-backed retriever over GraphQL
//!
//! Searches with a `Get` query against `/v1/graphql`. With an [`Embedder`]
//! attached the query is embedded locally and searched with `nearVector`;
//! otherwise `nearText` leaves vectorization to the Weaviate module. Scores
//! are Weaviate's normalized `certainty`.

use crate::http;
use async_trait::async_trait;
use ragframe_kernel::rag::{
    ChunkMetadata, ContextChunk, Embedder, RelevanceScore, RetrieveOptions, Retriever, truncate_to_top_k,
};
use ragframe_kernel::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "weaviate";

/// Configuration for connecting to a Weaviate instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaviateConfig {
    /// REST endpoint (default: http://localhost:8080)
    pub url: String,
    /// Class holding the documents; must have a `text` property
    pub class_name: String,
    pub timeout_secs: u64,
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            class_name: "Document".to_string(),
            timeout_secs: 30,
        }
    }
}

impl WeaviateConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn check_class_name(name: &str) -> RagResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RagError::validation(format!("invalid Weaviate class name '{name}'")))
    }
}

/// Render a JSON string as a GraphQL string literal.
fn quote(s: &str) -> String {
    // JSON string escapes are a subset of GraphQL's.
    Value::String(s.to_string()).to_string()
}

fn where_operand(key: &str, value: &Value) -> RagResult<String> {
    let typed = match value {
        Value::String(s) => format!("valueText: {}", quote(s)),
        Value::Bool(b) => format!("valueBoolean: {b}"),
        Value::Number(n) if n.is_i64() || n.is_u64() => format!("valueInt: {n}"),
        Value::Number(n) => format!("valueNumber: {n}"),
        other => {
            return Err(RagError::validation(format!(
                "unsupported Weaviate filter value for '{key}': {other}"
            )));
        }
    };
    Ok(format!("{{path: [{}], operator: Equal, {typed}}}", quote(key)))
}

fn build_where(filters: &HashMap<String, Value>) -> RagResult<Option<String>> {
    if filters.is_empty() {
        return Ok(None);
    }
    let mut keys: Vec<_> = filters.keys().collect();
    keys.sort();
    let operands = keys
        .into_iter()
        .map(|key| where_operand(key, &filters[key]))
        .collect::<RagResult<Vec<_>>>()?;
    Ok(Some(format!("{{operator: And, operands: [{}]}}", operands.join(", "))))
}

/// Weaviate GraphQL retriever.
pub struct WeaviateRetriever {
    client: reqwest::Client,
    config: WeaviateConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl WeaviateRetriever {
    /// Search with `nearText`, relying on the class's own vectorizer.
    pub fn new(config: WeaviateConfig) -> Self {
        Self {
            client: http::client(config.timeout_secs),
            config,
            embedder: None,
        }
    }

    /// Embed queries (and uploads) locally and search with `nearVector`.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &WeaviateConfig {
        &self.config
    }

    async fn build_query(&self, query: &str, opts: &RetrieveOptions) -> RagResult<(String, usize)> {
        check_class_name(&self.config.class_name)?;
        let resolved = opts.resolve()?;

        let certainty = resolved
            .score_threshold
            .map(|t| format!(", certainty: {t}"))
            .unwrap_or_default();

        let near = match &self.embedder {
            Some(embedder) => {
                let vector = embedder.embed_text(query).await?;
                format!("nearVector: {{vector: {}{certainty}}}", json!(vector))
            }
            None => format!("nearText: {{concepts: [{}]{certainty}}}", quote(query)),
        };

        let filter = build_where(&resolved.filters)?
            .map(|w| format!(", where: {w}"))
            .unwrap_or_default();

        let gql = format!(
            "{{ Get {{ {class}(limit: {limit}, {near}{filter}) {{ text _additional {{ id certainty }} }} }} }}",
            class = self.config.class_name,
            limit = resolved.top_k,
        );
        Ok((gql, resolved.top_k))
    }

    fn parse_hits(&self, data: Option<Value>) -> RagResult<Vec<ContextChunk>> {
        let hits = data
            .as_ref()
            .and_then(|d| d.get("Get"))
            .and_then(|g| g.get(&self.config.class_name))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RagError::decode(format!(
                    "weaviate response has no data.Get.{}",
                    self.config.class_name
                ))
            })?;

        Ok(hits.iter().filter_map(hit_to_chunk).collect())
    }

    /// Create the class with a `text` property if it does not exist yet.
    pub async fn ensure_schema(&self) -> RagResult<()> {
        check_class_name(&self.config.class_name)?;
        let vectorizer = if self.embedder.is_some() { "none" } else { "text2vec-transformers" };

        let response = self
            .client
            .post(http::join(&self.config.url, "v1/schema"))
            .json(&json!({
                "class": self.config.class_name,
                "vectorizer": vectorizer,
                "properties": [ { "name": "text", "dataType": ["text"] } ]
            }))
            .send()
            .await
            .map_err(|e| http::map_error(BACKEND, e))?;

        match http::check_status(BACKEND, response).await {
            Ok(_) => Ok(()),
            Err(RagError::Backend { status: Some(422), message, .. }) if message.contains("already exists") => {
                debug!(class = %self.config.class_name, "class already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Store `text` as a new object. Returns the object id.
    pub async fn upload_text(&self, text: &str) -> RagResult<String> {
        check_class_name(&self.config.class_name)?;
        if text.trim().is_empty() {
            return Err(RagError::validation("cannot upload empty text"));
        }

        let mut body = json!({
            "class": self.config.class_name,
            "properties": { "text": text },
        });
        if let Some(embedder) = &self.embedder {
            body["vector"] = json!(embedder.embed_text(text).await?);
        }

        let response = self
            .client
            .post(http::join(&self.config.url, "v1/objects"))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_error(BACKEND, e))?;
        let created: Value = http::read_json(BACKEND, response).await?;

        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RagError::decode("weaviate object response has no id"))?
            .to_string();
        debug!(class = %self.config.class_name, object_id = %id, "uploaded text");
        Ok(id)
    }
}

fn hit_to_chunk(hit: &Value) -> Option<ContextChunk> {
    let text = hit.get("text").and_then(Value::as_str)?;
    let additional = hit.get("_additional");

    let mut metadata = ChunkMetadata {
        score: additional
            .and_then(|a| a.get("certainty"))
            .and_then(Value::as_f64)
            .map(|c| RelevanceScore::Certainty(c as f32)),
        ..Default::default()
    };
    if let Some(id) = additional.and_then(|a| a.get("id")).filter(|id| !id.is_null()) {
        metadata.extra.insert("object_id".to_string(), id.clone());
    }

    ContextChunk::new(text).map(|chunk| chunk.with_metadata(metadata))
}

#[async_trait]
impl Retriever for WeaviateRetriever {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> RagResult<Vec<ContextChunk>> {
        let (gql, top_k) = self.build_query(query, opts).await?;

        let response = self
            .client
            .post(http::join(&self.config.url, "v1/graphql"))
            .json(&json!({ "query": gql }))
            .send()
            .await
            .map_err(|e| http::map_error(BACKEND, e))?;
        let parsed: GraphQlResponse = http::read_json(BACKEND, response).await?;

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RagError::backend(BACKEND, None, message));
        }

        let chunks = self.parse_hits(parsed.data)?;
        debug!(class = %self.config.class_name, kept = chunks.len(), "weaviate search complete");
        Ok(truncate_to_top_k(chunks, top_k))
    }
}
