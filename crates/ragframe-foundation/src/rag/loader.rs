//! Document loaders for ingestion
//!
//! Turn files on disk into the plain text handed to a store's `upload_text`.

use ragframe_kernel::{RagError, RagResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read a UTF-8 text file.
pub async fn load_text(path: &Path) -> RagResult<String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RagError::validation(format!("failed to read '{}': {e}", path.display())))?;
    non_empty(path, content)
}

/// Extract the text layer of a PDF file.
///
/// Extraction runs on the blocking pool. A document without extractable
/// text (for example a scanned image) is rejected.
pub async fn load_pdf(path: &Path) -> RagResult<String> {
    let owned: PathBuf = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| RagError::decode(format!("PDF extraction aborted for '{}': {e}", path.display())))?;

    let text = extracted.map_err(|e| RagError::decode(format!("failed to extract '{}': {e}", path.display())))?;
    debug!(path = %path.display(), chars = text.chars().count(), "extracted PDF text");
    non_empty(path, text)
}

fn non_empty(path: &Path, text: String) -> RagResult<String> {
    if text.trim().is_empty() {
        return Err(RagError::validation(format!("document is empty: {}", path.display())));
    }
    Ok(text)
}
