//! `ragframe upload` command implementation

use crate::cli::Database;
use colored::Colorize;
use ragframe_foundation::{RagConfig, load_pdf, load_text};
use std::path::PathBuf;

/// Where the uploaded document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Text(String),
    File(PathBuf),
    Pdf(PathBuf),
}

impl Source {
    pub fn from_args(text: Option<String>, file: Option<PathBuf>, pdf: Option<PathBuf>) -> anyhow::Result<Self> {
        match (text, file, pdf) {
            (Some(text), None, None) => Ok(Source::Text(text)),
            (None, Some(path), None) => Ok(Source::File(path)),
            (None, None, Some(path)) => Ok(Source::Pdf(path)),
            (None, None, None) => anyhow::bail!("nothing to upload: pass --text, --file or --pdf"),
            _ => anyhow::bail!("pass only one of --text, --file or --pdf"),
        }
    }

    /// Resolve the source to the text that gets embedded.
    pub async fn read(self) -> anyhow::Result<String> {
        let text = match self {
            Source::Text(text) => text,
            Source::File(path) => load_text(&path).await?,
            Source::Pdf(path) => load_pdf(&path).await?,
        };
        if text.trim().is_empty() {
            anyhow::bail!("refusing to upload empty text");
        }
        Ok(text)
    }
}

/// Store one document in the chosen vector database.
pub async fn run(config: &RagConfig, db: Database, source: Source) -> anyhow::Result<()> {
    let text = source.read().await?;

    println!("{} Uploading {} chars to {}", "→".green(), text.chars().count(), db.to_string().cyan());

    let id = match db {
        Database::Qdrant => {
            let store = super::qdrant(config)?;
            store.ensure_collection().await?;
            store.upload_text(&text).await?
        }
        Database::Weaviate => {
            let store = super::weaviate(config);
            store.ensure_schema().await?;
            store.upload_text(&text).await?
        }
    };

    println!("{} Stored document {}", "✓".green(), id.yellow());
    Ok(())
}
