use async_trait::async_trait;
use ragframe_kernel::rag::{ContextChunk, RetrieveOptions, Retriever, truncate_to_top_k};
use ragframe_kernel::{RagError, RagResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// A mock retriever returning a fixed set of chunks or a fixed error.
///
/// Honors `top_k` and `score_threshold` the way a real backend would, and
/// records every call's options for later assertions.
#[derive(Clone, Default)]
pub struct MockRetriever {
    chunks: Vec<ContextChunk>,
    error: Option<RagError>,
    calls: Arc<AtomicUsize>,
    history: Arc<RwLock<Vec<(String, RetrieveOptions)>>>,
}

impl MockRetriever {
    pub fn new(chunks: Vec<ContextChunk>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    /// A retriever that finds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A retriever whose every call fails with `error`.
    pub fn failing(error: RagError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries and options seen so far, oldest first.
    pub fn history(&self) -> Vec<(String, RetrieveOptions)> {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    fn name(&self) -> &str {
        "mock-retriever"
    }

    async fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> RagResult<Vec<ContextChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.history.write() {
            history.push((query.to_string(), opts.clone()));
        }

        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let resolved = opts.resolve()?;
        let kept = self
            .chunks
            .iter()
            .filter(|chunk| match (resolved.score_threshold, chunk.score()) {
                (Some(threshold), Some(score)) => score >= threshold,
                _ => true,
            })
            .cloned()
            .collect();
        Ok(truncate_to_top_k(kept, resolved.top_k))
    }
}
