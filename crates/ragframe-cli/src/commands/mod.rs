//! Command implementations and backend wiring

pub mod query;
pub mod upload;

use crate::cli::{Database, Llm};
use ragframe_foundation::{
    HttpEmbedder, OllamaGenerator, OpenAIGenerator, QdrantRetriever, RagConfig, WeaviateRetriever,
};
use ragframe_kernel::RagResult;
use ragframe_kernel::rag::{Embedder, Generator, Retriever};
use std::sync::Arc;

pub fn embedder(config: &RagConfig) -> Arc<dyn Embedder> {
    Arc::new(HttpEmbedder::new(config.embedder.clone()))
}

pub fn qdrant(config: &RagConfig) -> RagResult<QdrantRetriever> {
    QdrantRetriever::new(config.qdrant.clone(), embedder(config))
}

pub fn weaviate(config: &RagConfig) -> WeaviateRetriever {
    WeaviateRetriever::new(config.weaviate.clone()).with_embedder(embedder(config))
}

pub fn retriever(db: Database, config: &RagConfig) -> anyhow::Result<Arc<dyn Retriever>> {
    Ok(match db {
        Database::Qdrant => Arc::new(qdrant(config)?),
        Database::Weaviate => Arc::new(weaviate(config)),
    })
}

pub fn generator(llm: Llm, config: &RagConfig) -> anyhow::Result<Arc<dyn Generator>> {
    Ok(match llm {
        Llm::Ollama => Arc::new(OllamaGenerator::with_config(config.ollama.clone())),
        Llm::OpenAI => {
            if config.openai.api_key.is_empty() {
                anyhow::bail!("OpenAI API key missing: set openai.api_key or RAGFRAME_OPENAI__API_KEY");
            }
            Arc::new(OpenAIGenerator::with_config(config.openai.clone()))
        }
    })
}
