//! Qdrant-backed retriever using the `qdrant-client` SDK
//!
//! Queries are embedded with the attached [`Embedder`] and searched over gRPC.
//! Each point's payload must carry the chunk text under `text`; `source` and
//! `page` are lifted into typed metadata and every other payload field is kept
//! in `extra`.

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, QueryPointsBuilder, ScoredPoint,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use ragframe_kernel::rag::{
    ChunkMetadata, ContextChunk, Embedder, RelevanceScore, RetrieveOptions, Retriever, truncate_to_top_k,
};
use ragframe_kernel::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "qdrant";

/// Payload key holding the chunk text.
pub const PAYLOAD_KEY_TEXT: &str = "text";
const PAYLOAD_KEY_SOURCE: &str = "source";
const PAYLOAD_KEY_PAGE: &str = "page";

/// Configuration for connecting to a Qdrant instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// gRPC endpoint (default: http://localhost:6334)
    pub url: String,
    /// API key for Qdrant Cloud or authenticated instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub collection: String,
    /// Vector dimensionality used when creating the collection
    pub vector_size: u64,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "documents".to_string(),
            vector_size: 384,
            timeout_secs: 30,
        }
    }
}

impl QdrantConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_vector_size(mut self, size: u64) -> Self {
        self.vector_size = size;
        self
    }
}

fn map_error(action: &str, err: QdrantError) -> RagError {
    RagError::backend(BACKEND, None, format!("{action} failed: {err}"))
}

/// Equality filters become a `must` list of match conditions, in key order.
///
/// Only string, integer and boolean values can be matched exactly.
fn build_filter(filters: &HashMap<String, Value>) -> RagResult<Option<Filter>> {
    if filters.is_empty() {
        return Ok(None);
    }
    let mut keys: Vec<_> = filters.keys().collect();
    keys.sort();

    let mut conditions = Vec::with_capacity(keys.len());
    for key in keys {
        let value = match &filters[key] {
            Value::String(s) => MatchValue::Keyword(s.clone()),
            Value::Bool(b) => MatchValue::Boolean(*b),
            Value::Number(n) if n.is_i64() => match n.as_i64() {
                Some(i) => MatchValue::Integer(i),
                None => return Err(RagError::validation(format!("filter '{key}': integer out of range"))),
            },
            other => {
                return Err(RagError::validation(format!(
                    "filter '{key}': cannot match on {other}"
                )));
            }
        };
        conditions.push(Condition::matches(key.clone(), value));
    }
    Ok(Some(Filter::must(conditions)))
}

fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

fn point_id_to_json(id: &PointId) -> Option<Value> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(Value::from(*n)),
        PointIdOptions::Uuid(u) => Some(Value::String(u.clone())),
    }
}

/// Convert a scored point into a chunk, or `None` when it has no usable text.
fn point_to_chunk(point: ScoredPoint) -> Option<ContextChunk> {
    let mut payload = point.payload;
    let text = match payload.remove(PAYLOAD_KEY_TEXT).and_then(|v| v.kind) {
        Some(Kind::StringValue(text)) => text,
        _ => return None,
    };

    let source = match payload.get(PAYLOAD_KEY_SOURCE).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    };
    if source.is_some() {
        payload.remove(PAYLOAD_KEY_SOURCE);
    }

    let page = match payload.get(PAYLOAD_KEY_PAGE).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(p)) => u32::try_from(*p).ok(),
        _ => None,
    };
    if page.is_some() {
        payload.remove(PAYLOAD_KEY_PAGE);
    }

    let mut extra: HashMap<String, Value> = payload.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
    if let Some(id) = point.id.as_ref().and_then(point_id_to_json) {
        extra.insert("point_id".to_string(), id);
    }

    let metadata = ChunkMetadata {
        score: Some(RelevanceScore::Similarity(point.score)),
        source,
        page,
        extra,
    };
    ContextChunk::new(text).map(|chunk| chunk.with_metadata(metadata))
}

/// Build the point stored for an uploaded text.
fn text_point(id: &str, text: &str, vector: Vec<f32>) -> PointStruct {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert(PAYLOAD_KEY_TEXT.to_string(), text.to_string().into());
    PointStruct::new(id.to_string(), vector, payload)
}

/// Qdrant vector-search retriever.
pub struct QdrantRetriever {
    client: Qdrant,
    config: QdrantConfig,
    embedder: Arc<dyn Embedder>,
}

impl QdrantRetriever {
    /// Create a retriever. The connection is established lazily on first use.
    pub fn new(config: QdrantConfig, embedder: Arc<dyn Embedder>) -> RagResult<Self> {
        let mut builder = Qdrant::from_url(&config.url).timeout(Duration::from_secs(config.timeout_secs));
        if let Some(api_key) = config.api_key.clone() {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| RagError::validation(format!("invalid qdrant configuration: {e}")))?;

        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    /// Create the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self) -> RagResult<()> {
        let collection = &self.config.collection;
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| map_error("collection check", e))?;

        if exists {
            debug!(collection = %collection, "collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(self.config.vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| map_error("create collection", e))?;
        debug!(collection = %collection, size = self.config.vector_size, "created collection");
        Ok(())
    }

    /// Embed `text` and store it as a new point. Returns the point id.
    pub async fn upload_text(&self, text: &str) -> RagResult<String> {
        if text.trim().is_empty() {
            return Err(RagError::validation("cannot upload empty text"));
        }
        let vector = self.embedder.embed_text(text).await?;
        let id = uuid::Uuid::new_v4().to_string();

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.config.collection, vec![text_point(&id, text, vector)]).wait(true),
            )
            .await
            .map_err(|e| map_error("upsert", e))?;

        debug!(collection = %self.config.collection, point_id = %id, "uploaded text");
        Ok(id)
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> RagResult<Vec<ContextChunk>> {
        let resolved = opts.resolve()?;
        let filter = build_filter(&resolved.filters)?;
        let vector = self.embedder.embed_text(query).await?;

        let mut request = QueryPointsBuilder::new(&self.config.collection)
            .query(vector)
            .limit(resolved.top_k as u64)
            .with_payload(true);
        if let Some(threshold) = resolved.score_threshold {
            request = request.score_threshold(threshold);
        }
        if let Some(filter) = filter {
            request = request.filter(filter);
        }

        let response = self.client.query(request).await.map_err(|e| map_error("search", e))?;

        let hits = response.result.len();
        let chunks: Vec<ContextChunk> = response.result.into_iter().filter_map(point_to_chunk).collect();
        debug!(
            collection = %self.config.collection,
            hits,
            kept = chunks.len(),
            "qdrant search complete"
        );

        Ok(truncate_to_top_k(chunks, resolved.top_k))
    }
}
