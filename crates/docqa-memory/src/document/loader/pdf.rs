use std::path::Path;
use std::pin::Pin;

use super::super::{ContentType, Document, DocumentError, DocumentLoader, Fingerprint, Page};
use super::read_source;
use crate::document::DEFAULT_MAX_FILE_SIZE;

/// Extracts text page by page with `pdf-extract`.
pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
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

            // the parser may panic on malformed input; a panicked task is reported as corrupt
            let texts = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
                    .map_err(|e| DocumentError::Corrupt(e.to_string()))
            })
            .await
            .map_err(|e| DocumentError::Corrupt(format!("PDF parser aborted: {e}")))??;

            let source = path.display().to_string();
            let pages: Vec<Page> = texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| Page {
                    number: i + 1,
                    text,
                    source: source.clone(),
                })
                .collect();

            if pages.iter().all(|p| p.text.trim().is_empty()) {
                return Err(DocumentError::Empty(path));
            }

            tracing::debug!(%source, pages = pages.len(), "extracted PDF text");
            Ok(Document {
                source: path,
                content_type: ContentType::Pdf,
                fingerprint,
                pages,
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"definitely not a pdf").unwrap();

        let err = PdfLoader::default().load(&file).await.unwrap_err();
        assert!(matches!(err, DocumentError::Corrupt(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = PdfLoader::default()
            .load(Path::new("/nonexistent/file.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));
    }

    #[tokio::test]
    async fn file_too_large_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.pdf");
        std::fs::write(&file, "%PDF-1.5").unwrap();

        let loader = PdfLoader { max_file_size: 0 };
        let result = loader.load(&file).await;
        assert!(matches!(result, Err(DocumentError::FileTooLarge(_))));
    }

    #[test]
    fn supported_extensions_list() {
        assert_eq!(PdfLoader::default().supported_extensions(), &["pdf"]);
    }
}
