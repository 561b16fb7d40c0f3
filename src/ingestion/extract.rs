//! Text extraction boundary: `file -> text`.
//!
//! PDF extraction runs under `spawn_blocking` because `pdf-extract` is a
//! blocking operation; plain-text formats go through `tokio::fs`.

use std::path::Path;

use tracing::debug;

use crate::types::RagError;

/// Extensions the extraction collaborator understands, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

/// Returns `true` when the path carries a supported extension.
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Extracts the text content of a document.
///
/// Fails with [`RagError::NotFound`] for missing paths,
/// [`RagError::UnsupportedFormat`] for extensions outside the supported set,
/// and [`RagError::ExtractionFailed`] when extraction errors or yields no
/// text.
pub async fn extract_text(path: &Path) -> Result<String, RagError> {
    if !path.exists() {
        return Err(RagError::NotFound(path.display().to_string()));
    }

    let extension = extension_of(path).unwrap_or_default();
    let text = match extension.as_str() {
        "pdf" => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
                .await
                .map_err(|err| RagError::ExtractionFailed(err.to_string()))?
                .map_err(|err| RagError::ExtractionFailed(err.to_string()))?
        }
        "txt" | "md" | "markdown" => tokio::fs::read_to_string(path)
            .await
            .map_err(|err| RagError::ExtractionFailed(err.to_string()))?,
        _ => {
            return Err(RagError::UnsupportedFormat {
                extension: format!(".{extension}"),
            });
        }
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RagError::ExtractionFailed(format!(
            "no text content extracted from {}",
            path.display()
        )));
    }
    debug!(path = %path.display(), chars = trimmed.len(), "extracted document text");
    Ok(trimmed.to_string())
}
