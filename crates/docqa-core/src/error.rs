use std::path::PathBuf;

use docqa_llm::LlmError;
use docqa_memory::document::ChunkError;
use docqa_memory::{CheckpointError, DocumentError, IndexError};

use crate::pipeline::QueryStage;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while preparing the index. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("index built but not recorded: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("backend `{0}` is not compiled in; rebuild with the matching cargo feature")]
    BackendUnavailable(&'static str),
}

/// Why one question could not be answered. Never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum QueryCause {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("no index has been built yet")]
    NoIndex,
}

#[derive(Debug, thiserror::Error)]
#[error("query failed while {stage}: {cause}")]
pub struct QueryError {
    pub stage: QueryStage,
    #[source]
    pub cause: QueryCause,
}

impl QueryError {
    pub(crate) fn new(stage: QueryStage, cause: impl Into<QueryCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    /// The index is gone or empty; further questions cannot succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            &self.cause,
            QueryCause::NoIndex | QueryCause::Index(IndexError::Empty)
        )
    }

    /// Whether asking again may succeed without changing anything.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(&self.cause, QueryCause::Llm(e) if e.is_retryable())
    }

    /// Short message suitable for the interactive prompt.
    #[must_use]
    pub fn user_message(&self) -> String {
        match &self.cause {
            QueryCause::NoIndex | QueryCause::Index(IndexError::Empty) => {
                "The document index is empty. Run `docqa index` first.".into()
            }
            QueryCause::Llm(LlmError::Timeout { .. }) => {
                "The model took too long to respond. Please try again.".into()
            }
            QueryCause::Llm(LlmError::Unreachable(_)) => {
                "The local model runtime is not reachable. Is Ollama running?".into()
            }
            QueryCause::Llm(LlmError::ModelNotFound(model)) => {
                format!("Model `{model}` is not available. Pull it with `ollama pull {model}`.")
            }
            _ => format!("Sorry, something went wrong while {}.", self.stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_missing_index_is_fatal() {
        assert!(QueryError::new(QueryStage::Retrieving, QueryCause::NoIndex).is_fatal());
        assert!(QueryError::new(QueryStage::Retrieving, IndexError::Empty).is_fatal());

        let dimension = IndexError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(!QueryError::new(QueryStage::Retrieving, dimension).is_fatal());
        let generation = LlmError::Other("boom".into());
        assert!(!QueryError::new(QueryStage::Generating, generation).is_fatal());
    }
}
