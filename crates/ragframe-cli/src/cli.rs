//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ragframe - retrieval-augmented question answering
#[derive(Parser)]
#[command(name = "ragframe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (yaml, toml, json, ini, ron, json5)
    #[arg(short = 'c', long, global = true, env = "RAGFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Embed text and store it in a vector database
    Upload {
        /// Vector database to write to
        #[arg(long, value_enum, default_value_t = Database::Qdrant)]
        db: Database,

        /// Text to upload
        #[arg(
            short,
            long,
            conflicts_with_all = ["file", "pdf"],
            required_unless_present_any = ["file", "pdf"]
        )]
        text: Option<String>,

        /// Plain-text file to upload
        #[arg(short, long, conflicts_with = "pdf")]
        file: Option<PathBuf>,

        /// PDF document whose text layer is uploaded
        #[arg(long)]
        pdf: Option<PathBuf>,
    },

    /// Answer a question using retrieved context
    Query(QueryArgs),
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// The question
    pub question: String,

    /// Vector database to search
    #[arg(long, value_enum, default_value_t = Database::Qdrant)]
    pub db: Database,

    /// Generation backend
    #[arg(long, value_enum, default_value_t = Llm::Ollama)]
    pub llm: Llm,

    /// Maximum chunks to retrieve (0 uses the default)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum relevance score in [0, 1]
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Fall back to direct generation when retrieval fails or finds nothing
    #[arg(long)]
    pub hybrid: bool,

    /// Print the answer as it is generated
    #[arg(short, long)]
    pub stream: bool,

    /// Sampling temperature in [0, 2]
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum output tokens (0 uses the backend default)
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Model override for the chosen backend
    #[arg(short, long)]
    pub model: Option<String>,

    /// Response format
    #[arg(long, value_enum)]
    pub format: Option<Format>,

    /// Stop sequence (repeatable)
    #[arg(long = "stop")]
    pub stop: Vec<String>,

    /// Metadata equality filter as key=value (repeatable)
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Abort the query after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

/// Vector database
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Database {
    Qdrant,
    Weaviate,
}

impl std::fmt::Display for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Database::Qdrant => write!(f, "qdrant"),
            Database::Weaviate => write!(f, "weaviate"),
        }
    }
}

/// Generation backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Llm {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
}

/// Response format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Markdown,
}
