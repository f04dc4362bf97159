//! Vector-store retriever backends and document loaders

pub mod loader;
pub mod qdrant;
pub mod weaviate;

pub use loader::{load_pdf, load_text};
pub use qdrant::{QdrantConfig, QdrantRetriever};
pub use weaviate::{WeaviateConfig, WeaviateRetriever};
