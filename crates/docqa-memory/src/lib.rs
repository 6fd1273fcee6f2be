//! Document ingestion and vector retrieval for a single source document.

pub mod checkpoint;
pub mod document;
pub mod error;
pub mod index;
pub mod retriever;
pub mod tokenizer;

pub use checkpoint::{BuildSettings, Checkpoint};
pub use document::{Chunk, Document, DocumentError, Fingerprint, Page};
pub use error::{CheckpointError, IndexError};
pub use index::{EmbeddedChunks, IndexMetadata, IndexStats, ScoredChunk, VectorIndex};
pub use retriever::Retriever;
pub use tokenizer::{HfTokenizer, TokenSpan, Tokenize};
