//! File to [`Document`] converters.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use ragpipe_shared::{Document, Meta, RagPipeError, Result};

use crate::html::html_to_markdown;
use crate::markdown::markdown_to_text;

/// Page separator in extracted text.
pub const PAGE_BREAK: char = '\u{c}';

/// Source formats with a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// UTF-8 text, decoded lossily.
    Text,
    /// CommonMark rendered to plain text.
    Markdown,
    /// Text layer of a PDF, pages joined by form feeds.
    Pdf,
    /// Main page content as cleaned Markdown.
    Html,
}

impl SourceFormat {
    /// MIME type routed to this converter.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Pdf => "application/pdf",
            Self::Html => "text/html",
        }
    }

    /// Extract text from raw file bytes.
    pub fn extract(self, path: &Path, bytes: &[u8]) -> Result<String> {
        match self {
            Self::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
            Self::Markdown => Ok(markdown_to_text(&String::from_utf8_lossy(bytes))),
            Self::Pdf => pdf_text(bytes),
            Self::Html => {
                let base = std::path::absolute(path)
                    .ok()
                    .and_then(|p| Url::from_file_path(p).ok());
                html_to_markdown(&String::from_utf8_lossy(bytes), base.as_ref())
            }
        }
    }

    /// Read and convert one file into a document carrying `file_path`
    /// plus the extra metadata (which wins on key collisions).
    pub fn convert_file(self, path: &Path, extra: &Meta) -> Result<Document> {
        let bytes = std::fs::read(path).map_err(|e| RagPipeError::io(path, e))?;
        let content = self.extract(path, &bytes)?;

        let mut meta = Meta::new();
        meta.insert(
            "file_path".into(),
            Value::String(path.display().to_string()),
        );
        meta.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Document::with_meta(content, meta))
    }

    /// Convert every source. Files that cannot be read or parsed are
    /// logged and skipped.
    pub fn convert_all(self, sources: &[PathBuf], extra: &Meta) -> Vec<Document> {
        let documents: Vec<Document> = sources
            .iter()
            .filter_map(|path| match self.convert_file(path, extra) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(path = %path.display(), format = ?self, error = %e, "skipping source");
                    None
                }
            })
            .collect();
        debug!(format = ?self, sources = sources.len(), documents = documents.len(), "converted sources");
        documents
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagPipeError::Conversion(format!("PDF text extraction failed: {e}")))?;
    Ok(pages.join(&PAGE_BREAK.to_string()))
}
