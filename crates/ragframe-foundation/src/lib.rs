//! Ragframe foundation
//!
//! Concrete collaborators for the kernel contracts: an HTTP embedding client,
//! Qdrant and Weaviate retrievers, Ollama and OpenAI generators, and the
//! typed application configuration that wires them.

mod http;

// embedding client
pub mod embedder;

// config module
pub mod config;

// LLM generators
pub mod llm;

// RAG module - vector-store retrievers and text ingestion
pub mod rag;

pub use config::{QueryDefaults, RagConfig};
pub use embedder::{EmbedderConfig, HttpEmbedder};
pub use llm::{OllamaConfig, OllamaGenerator, OpenAIConfig, OpenAIGenerator};
pub use rag::{load_pdf, load_text, QdrantConfig, QdrantRetriever, WeaviateConfig, WeaviateRetriever};
