mod pdf;
mod text;

use std::path::{Path, PathBuf};

pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::DocumentError;

/// Canonicalize, enforce the size limit, and read the whole file.
async fn read_source(path: &Path, max_size: u64) -> Result<(PathBuf, Vec<u8>), DocumentError> {
    let path = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| DocumentError::from_io(path, e))?;

    let meta = tokio::fs::metadata(&path).await?;
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge(meta.len()));
    }

    let bytes = tokio::fs::read(&path).await?;
    Ok((path, bytes))
}
