use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("document could not be parsed: {0}")]
    Corrupt(String),

    #[error("document contains no extractable text: {}", .0.display())]
    Empty(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    /// Map an IO error on `path`, promoting a missing file to [`DocumentError::NotFound`].
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io(err)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunking config: overlap {chunk_overlap} must be smaller than size {chunk_size}")]
    InvalidConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}
