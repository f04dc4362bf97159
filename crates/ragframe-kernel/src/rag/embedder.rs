//! Text embedding contract

use crate::error::RagResult;
use async_trait::async_trait;

/// Turns text into a dense vector.
///
/// Vector-store retrievers call this before a similarity search. An
/// implementation fails with `RagError::Decode` when the backend returns no
/// vector at all.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> RagResult<Vec<f32>>;
}
