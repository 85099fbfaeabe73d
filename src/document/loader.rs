//! Document loaders: PDF via lopdf, plain text split on form feeds

use super::{is_text_whitespace, Document, Page};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unsupported document type: {path}")]
    Unsupported { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt document {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("No text could be extracted from {path}")]
    Empty { path: PathBuf },
}

/// Turns raw upload bytes into ordered pages
pub trait DocumentLoader: Send + Sync {
    /// Extract pages from the file content
    fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Page>, ParseError>;

    /// Whether this loader handles the given extension (lowercase, no dot)
    fn supports(&self, extension: &str) -> bool;
}

/// Pure-Rust PDF text extraction, one page per PDF page
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Page>, ParseError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| ParseError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut pages = Vec::new();
        for (page_num, _page_id) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(text) => pages.push(Page {
                    number: page_num,
                    text,
                }),
                Err(e) => {
                    // Keep numbering intact; an unreadable page contributes no chunks
                    tracing::debug!("lopdf: failed to extract text from page {}: {}", page_num, e);
                    pages.push(Page {
                        number: page_num,
                        text: String::new(),
                    });
                }
            }
        }

        Ok(pages)
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "pdf"
    }
}

/// Plain text and markdown; form feeds (`\x0C`) separate pages
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Page>, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Corrupt {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8: {}", e),
        })?;

        Ok(text
            .split('\x0C')
            .enumerate()
            .map(|(i, page)| Page {
                number: i as u32 + 1,
                text: page.to_string(),
            })
            .collect())
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "md" | "text")
    }
}

/// Read `path` and parse it with the first loader that supports its extension
pub fn load_document(path: &Path) -> Result<Document, ParseError> {
    let loaders: [&dyn DocumentLoader; 2] = [&PdfLoader, &TextLoader];

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let loader = loaders
        .into_iter()
        .find(|l| l.supports(&extension))
        .ok_or_else(|| ParseError::Unsupported {
            path: path.to_path_buf(),
        })?;

    let bytes = std::fs::read(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let pages = loader.extract_pages(path, &bytes)?;
    if pages
        .iter()
        .all(|p| p.text.trim_matches(is_text_whitespace).is_empty())
    {
        return Err(ParseError::Empty {
            path: path.to_path_buf(),
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    Ok(Document::new(name, &bytes, pages))
}
