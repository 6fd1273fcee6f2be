use std::path::PathBuf;

use super::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    PlainText,
    Markdown,
}

impl ContentType {
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
        }
    }
}

/// One source file, read once per build.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    pub content_type: ContentType,
    pub fingerprint: Fingerprint,
    pub pages: Vec<Page>,
}

impl Document {
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub text: String,
    pub source: String,
}

/// A contiguous token window drawn from a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequence number, stable only within one build.
    pub id: usize,
    pub page: usize,
    pub text: String,
    pub token_count: usize,
    /// Half-open token range within the page.
    pub token_start: usize,
    pub token_end: usize,
    /// Previous chunk on the same page, sharing `chunk_overlap` tokens with this one.
    pub prev_id: Option<usize>,
}
