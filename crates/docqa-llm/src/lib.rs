//! Embedding and text generation backends.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle_embed;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use error::LlmError;
pub use provider::{
    DEFAULT_CANDLE_EMBEDDING_REPO, DEFAULT_OLLAMA_EMBEDDING_MODEL, Embedder, Generator,
};
