//! RAG (Retrieval-Augmented Generation) contracts and orchestration
//!
//! Defines the retrieval, generation and embedding abstractions, the data
//! model flowing between them, and the [`QueryOrchestrator`] that drives a
//! query end to end. Concrete backends live in `ragframe-foundation`.

pub mod embedder;
pub mod generator;
pub mod options;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod streaming;
pub mod tokens;
pub mod types;

pub use embedder::Embedder;
pub use generator::{Generator, collect_stream};
pub use options::{
    DEFAULT_TOP_K, FallbackTriggers, GenerateOptions, MAX_TOP_K, QueryOptions, ResolvedRetrieveOptions,
    ResponseFormat, ResponseFormatKind, RetrieveOptions,
};
pub use pipeline::{QueryOrchestrator, QueryStage, QueryStream};
pub use prompt::{CONTEXT_SEPARATOR, build_prompt};
pub use retriever::{Retriever, truncate_to_top_k};
pub use streaming::{CancelSignal, ChunkStream, cancellable, deliver, terminated};
pub use tokens::{CharBasedEstimator, TokenEstimator};
pub use types::{
    ChunkMetadata, ContextChunk, FallbackReason, FinishReason, GenerationChunk, GenerationResult, QueryResult,
    RelevanceScore, TokenUsage,
};
