use docqa_llm::Embedder;

use crate::error::IndexError;
use crate::index::{ScoredChunk, VectorIndex};

pub const DEFAULT_TOP_K: usize = 4;

/// Fixed top-k view over a [`VectorIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retriever {
    k: usize,
}

impl Default for Retriever {
    fn default() -> Self {
        Self { k: DEFAULT_TOP_K }
    }
}

impl Retriever {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// # Errors
    ///
    /// Propagates embedding and index errors.
    pub async fn retrieve<E: Embedder>(
        &self,
        index: &VectorIndex,
        embedder: &E,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        index.query(embedder, question, self.k).await
    }

    /// Retrieve with an already embedded question.
    ///
    /// # Errors
    ///
    /// Propagates index errors.
    pub async fn retrieve_by_vector(
        &self,
        index: &VectorIndex,
        vector: &[f32],
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        index.search_vector(vector, self.k).await
    }
}
