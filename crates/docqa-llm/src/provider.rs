pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_CANDLE_EMBEDDING_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for identical input and model version,
/// and must always return vectors of the same length.
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or returns a malformed vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, crate::LlmError>> + Send;

    /// Embed several texts in order. The default calls [`Embedder::embed`] sequentially.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error encountered.
    fn embed_batch(
        &self,
        texts: &[&str],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, crate::LlmError>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    /// Identifier of the embedding model, persisted with the index.
    fn model_id(&self) -> &str;
}

/// Produces an answer for a fully rendered prompt.
pub trait Generator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the runtime is unreachable, the model is missing, or the
    /// response is empty.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, crate::LlmError>> + Send;

    fn name(&self) -> &str;
}
