//! LLM generator backends

pub mod ollama;
pub mod openai;

pub use ollama::{OllamaConfig, OllamaGenerator};
pub use openai::{OpenAIConfig, OpenAIGenerator};
