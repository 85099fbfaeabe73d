//! Uploaded documents and the chunks derived from them

mod loader;
mod segmenter;

pub use loader::{load_document, DocumentLoader, ParseError, PdfLoader, TextLoader};
pub use segmenter::Segmenter;

use serde::{Deserialize, Serialize};

/// Whitespace as Python's `str.split()` and `str.strip()` see it: Unicode
/// whitespace plus the ASCII separators `\x1c`..=`\x1f`
pub(crate) fn is_text_whitespace(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}

/// One page of extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

/// A parsed upload. Consumed once by the segmenter and then dropped.
#[derive(Debug, Clone)]
pub struct Document {
    /// BLAKE3 hex digest of the uploaded bytes
    pub id: String,
    /// File name as uploaded
    pub name: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document whose id is derived from `bytes`
    pub fn new(name: impl Into<String>, bytes: &[u8], pages: Vec<Page>) -> Self {
        Self {
            id: blake3::hash(bytes).to_hex().to_string(),
            name: name.into(),
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Identity of a chunk across retrievers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub document_id: String,
    pub chunk_index: usize,
}

/// A contiguous span of document text with its page of origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_page: u32,
    /// Position within the document, in segmentation order
    pub chunk_index: usize,
    pub document_id: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            document_id: self.document_id.clone(),
            chunk_index: self.chunk_index,
        }
    }

    /// Short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &self.text[..idx]),
            None => self.text.clone(),
        }
    }
}
