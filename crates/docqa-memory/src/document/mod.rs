pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod splitter;
pub mod types;

use std::path::Path;

pub use error::{ChunkError, DocumentError};
pub use fingerprint::{Fingerprint, fingerprint, needs_rebuild};
pub use loader::{PdfLoader, TextLoader};
pub use splitter::{SplitterConfig, TokenSplitter, split};
pub use types::{Chunk, ContentType, Document, Page};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Document, DocumentError>> + Send + '_>,
    >;

    fn supported_extensions(&self) -> &[&str];
}

/// Load `path` with the loader registered for its extension.
///
/// # Errors
///
/// Returns [`DocumentError::NotFound`] when the file is missing (checked before the
/// extension), [`DocumentError::UnsupportedFormat`] for unknown extensions, and any
/// error of the selected loader.
pub async fn load_document(path: &Path, max_file_size: u64) -> Result<Document, DocumentError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let pdf = PdfLoader { max_file_size };
    let text = TextLoader { max_file_size };
    let loaders: [&dyn DocumentLoader; 2] = [&pdf, &text];

    let loader = loaders
        .into_iter()
        .find(|l| l.supported_extensions().contains(&ext.as_str()))
        .ok_or(DocumentError::UnsupportedFormat(ext.clone()))?;

    let document = loader.load(path).await?;
    tracing::info!(
        source = %document.source.display(),
        pages = document.page_count(),
        fingerprint = %document.fingerprint.short(),
        "document loaded"
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_document(Path::new("/nonexistent/manual.pdf"), DEFAULT_MAX_FILE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sheet.xlsx");
        std::fs::write(&file, "data").unwrap();

        let err = load_document(&file, DEFAULT_MAX_FILE_SIZE).await.unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(ext) if ext == "xlsx"));
    }

    #[tokio::test]
    async fn dispatches_text_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.TXT");
        std::fs::write(&file, "hello").unwrap();

        let doc = load_document(&file, DEFAULT_MAX_FILE_SIZE).await.unwrap();
        assert_eq!(doc.content_type, ContentType::PlainText);
        assert_eq!(doc.pages[0].text, "hello");
    }
}
