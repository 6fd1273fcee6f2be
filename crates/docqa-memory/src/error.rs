use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("cannot write checkpoint {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] docqa_llm::LlmError),

    #[error("index is empty")]
    Empty,

    #[error("query vector has {actual} dimensions, index was built with {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("malformed embedding: {0}")]
    MalformedEmbedding(String),

    #[error("index storage is corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}
