//! RAG core data types
//!
//! The vocabulary passed between retrieval, prompt assembly and generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relevance of a chunk as reported by the backend that produced it.
///
/// Scales differ per backend: a raw similarity score from a vector search is
/// not comparable to a normalized certainty. The orchestrator only ever
/// compares a score against a threshold supplied for the same backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RelevanceScore {
    /// Raw similarity as returned by a vector search (e.g. cosine).
    Similarity(f32),
    /// Normalized certainty in `[0, 1]`.
    Certainty(f32),
}

impl RelevanceScore {
    pub fn value(&self) -> f32 {
        match self {
            Self::Similarity(v) | Self::Certainty(v) => *v,
        }
    }
}

/// Metadata attached to a retrieved chunk.
///
/// Well-known fields are typed; anything backend-specific lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<RelevanceScore>,
    /// Source document identifier (file name, URL, object id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A unit of retrieved text.
///
/// Text is guaranteed non-empty: construction of a blank chunk yields `None`,
/// so retrievers drop such hits rather than return them. Chunks are immutable
/// once built; the builder methods consume and return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContextChunk")]
pub struct ContextChunk {
    text: String,
    #[serde(default)]
    metadata: ChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct RawContextChunk {
    text: String,
    #[serde(default)]
    metadata: ChunkMetadata,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

impl TryFrom<RawContextChunk> for ContextChunk {
    type Error = String;

    fn try_from(raw: RawContextChunk) -> Result<Self, Self::Error> {
        let chunk = ContextChunk::new(raw.text).ok_or("context chunk text must not be empty")?;
        Ok(ContextChunk {
            metadata: raw.metadata,
            embedding: raw.embedding,
            ..chunk
        })
    }
}

impl ContextChunk {
    /// Create a chunk, or `None` when `text` is empty or whitespace only.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text,
            metadata: ChunkMetadata::default(),
            embedding: None,
        })
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_score(mut self, score: RelevanceScore) -> Self {
        self.metadata.score = Some(score);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Numeric score regardless of the backend's scale.
    pub fn score(&self) -> Option<f32> {
        self.metadata.score.map(|s| s.value())
    }
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Why the backend stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

/// Output of a one-shot generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl GenerationResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// A unit of streamed generation output.
///
/// A stream carries exactly one chunk with `is_last` set, and it is the final
/// item delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    /// Text fragment, possibly empty.
    pub delta: String,
    pub is_last: bool,
    /// Backend payload this chunk was decoded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl GenerationChunk {
    /// A non-terminal text fragment.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Default::default()
        }
    }

    /// An empty terminal chunk.
    pub fn last() -> Self {
        Self {
            is_last: true,
            ..Default::default()
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Why the orchestrator generated without retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Retrieval failed; the message is the collaborator error.
    RetrievalFailed { error: String },
    /// Retrieval succeeded with zero chunks.
    NoMatches,
    /// The best chunk scored below the requested threshold.
    BelowThreshold { best: f32, threshold: f32 },
}

/// Final answer to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    /// Chunks actually injected into the prompt, in prompt order.
    pub contexts: Vec<ContextChunk>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Set when hybrid mode generated without context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}
