//! Ragframe kernel
//!
//! Capability contracts for retrieval-augmented generation and the query
//! control core that drives them. Concrete vector-store and LLM backends live
//! in `ragframe-foundation`; this crate owns no network code.

// error module
pub mod error;

// config module
pub mod config;

// RAG contracts, data model and orchestration
pub mod rag;

pub use error::{QueryError, RagError, RagResult};
