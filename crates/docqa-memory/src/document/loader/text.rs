use std::path::Path;
use std::pin::Pin;

use super::super::{ContentType, Document, DocumentError, DocumentLoader, Fingerprint, Page};
use super::read_source;
use crate::document::DEFAULT_MAX_FILE_SIZE;

/// Form feed, the page separator written by `pdftotext` and similar tools.
const PAGE_BREAK: char = '\u{c}';

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Document, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let (path, bytes) = read_source(&path, max_size).await?;
            let fingerprint = Fingerprint::of_bytes(&bytes);

            let content_type = match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown") => {
                    ContentType::Markdown
                }
                _ => ContentType::PlainText,
            };

            let content = String::from_utf8(bytes)
                .map_err(|e| DocumentError::Corrupt(format!("invalid UTF-8: {e}")))?;
            if content.trim().is_empty() {
                return Err(DocumentError::Empty(path));
            }

            let source = path.display().to_string();
            let pages = content
                .split(PAGE_BREAK)
                .enumerate()
                .map(|(i, text)| Page {
                    number: i + 1,
                    text: text.to_owned(),
                    source: source.clone(),
                })
                .collect();

            Ok(Document {
                source: path,
                content_type,
                fingerprint,
                pages,
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}
