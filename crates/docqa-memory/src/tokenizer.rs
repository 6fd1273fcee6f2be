//! Subword tokenization with byte offsets back into the source text.

use std::path::Path;

use crate::document::ChunkError;

/// Default tokenizer repo on the Hugging Face Hub.
pub const DEFAULT_TOKENIZER: &str = "gpt2";

/// One token and the byte range of the source text it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

pub trait Tokenize: Send + Sync {
    /// Tokenize without special tokens. Spans are ordered and lie on char boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying tokenizer fails.
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, ChunkError>;

    fn name(&self) -> &str;
}

/// Hugging Face `tokenizers` model loaded from `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    name: String,
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl HfTokenizer {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ChunkError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| ChunkError::Tokenizer(format!("{}: {e}", path.display())))?;
        Ok(Self {
            inner,
            name: path.display().to_string(),
        })
    }

    /// Parse a serialized `tokenizer.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a valid tokenizer definition.
    pub fn from_json(name: &str, json: &[u8]) -> Result<Self, ChunkError> {
        let inner = tokenizers::Tokenizer::from_bytes(json)
            .map_err(|e| ChunkError::Tokenizer(format!("{name}: {e}")))?;
        Ok(Self {
            inner,
            name: name.to_owned(),
        })
    }

    /// Fetch `tokenizer.json` from the Hub (cached after the first download).
    ///
    /// Blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or parsing fails.
    pub fn from_pretrained(repo_id: &str) -> Result<Self, ChunkError> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| ChunkError::Tokenizer(format!("HuggingFace API client: {e}")))?;
        let path = api.model(repo_id.to_owned()).get("tokenizer.json").map_err(|e| {
            ChunkError::Tokenizer(format!("failed to download tokenizer.json from {repo_id}: {e}"))
        })?;
        let mut tokenizer = Self::from_file(&path)?;
        repo_id.clone_into(&mut tokenizer.name);
        Ok(tokenizer)
    }

    /// A local `tokenizer.json` path when it exists, otherwise a Hub repo id.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source yields a tokenizer.
    pub fn resolve(spec: &str) -> Result<Self, ChunkError> {
        let path = Path::new(spec);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Self::from_pretrained(spec)
        }
    }
}

impl Tokenize for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, ChunkError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ChunkError::Tokenizer(e.to_string()))?;

        Ok(encoding
            .get_ids()
            .iter()
            .zip(encoding.get_offsets())
            .map(|(&id, &(start, end))| TokenSpan {
                id,
                start: floor_char_boundary(text, start),
                end: ceil_char_boundary(text, end),
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Splits on whitespace runs. Used for offline runs and tests.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

#[cfg(any(test, feature = "mock"))]
impl Tokenize for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, ChunkError> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    spans.push(TokenSpan { id: 0, start: s, end: i });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(TokenSpan {
                id: 0,
                start: s,
                end: text.len(),
            });
        }
        Ok(spans)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "whitespace"
    }
}

fn floor_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
