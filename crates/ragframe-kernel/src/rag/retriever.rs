//! Retrieval contract

use crate::error::RagResult;
use crate::rag::options::RetrieveOptions;
use crate::rag::streaming::{CancelSignal, ChunkStream, deliver};
use crate::rag::types::ContextChunk;
use async_trait::async_trait;

/// A source of context chunks for a query.
///
/// Implementations must:
/// - return at most the resolved `top_k` chunks,
/// - order chunks by descending relevance as the backend defines it,
/// - drop hits whose text is empty rather than return them,
/// - apply `score_threshold` themselves.
///
/// An empty result is a valid outcome meaning "no matches".
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name used in logs and error attribution.
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> RagResult<Vec<ContextChunk>>;

    /// Stream the same chunks `retrieve` would return, in the same order.
    ///
    /// The default implementation runs `retrieve` under `signal` and then
    /// delivers the batch item by item. No chunk is yielded after the signal
    /// is observed.
    async fn retrieve_stream(
        &self,
        query: &str,
        opts: &RetrieveOptions,
        signal: CancelSignal,
    ) -> RagResult<ChunkStream<ContextChunk>> {
        let chunks = signal.run(self.retrieve(query, opts)).await?;
        Ok(deliver(chunks, signal))
    }
}

/// Enforce the retriever output contract on a raw backend result.
///
/// Keeps backend order, drops nothing but overflow past `top_k`.
pub fn truncate_to_top_k(mut chunks: Vec<ContextChunk>, top_k: usize) -> Vec<ContextChunk> {
    chunks.truncate(top_k);
    chunks
}
