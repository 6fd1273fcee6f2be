#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("model `{0}` is not available on the runtime")]
    ModelNotFound(String),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("malformed embedding: {0}")]
    MalformedEmbedding(String),

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
