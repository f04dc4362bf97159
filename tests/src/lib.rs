//! Ragframe Testing Framework
//!
//! Deterministic stand-ins for retrievers and generators so pipelines can be
//! exercised without a vector database or a model server.

pub mod generator;
pub mod retriever;

pub use generator::{MockGenerator, ScriptedStreamGenerator};
pub use retriever::MockRetriever;

use ragframe_kernel::rag::{ContextChunk, RelevanceScore};

/// A chunk with a similarity score, for building fixtures.
///
/// Panics on blank text; fixtures are expected to be well formed.
pub fn scored_chunk(text: &str, score: f32) -> ContextChunk {
    ContextChunk::new(text)
        .unwrap_or_else(|| panic!("fixture chunk text must not be blank"))
        .with_score(RelevanceScore::Similarity(score))
}

#[macro_export]
macro_rules! assert_called {
    ($mock:expr, $expected_count:expr) => {
        let count = $mock.call_count();
        assert_eq!(
            count,
            $expected_count,
            "Expected '{}' to be called {} times, but was called {} times",
            $mock.name(),
            $expected_count,
            count
        );
    };
}
