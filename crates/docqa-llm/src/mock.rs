//! Deterministic in-process backends for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{Embedder, Generator};

pub const MOCK_DIMENSION: usize = 384;

/// Hashed bag-of-words embedder. Texts sharing words get similar vectors.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
    model: String,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(MOCK_DIMENSION)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: format!("mock-bow-{dimension}"),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of `embed` calls made so far, across clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&bytes[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimension as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Unreachable("mock embedder failure".into()));
        }
        Ok(self.vectorize(text))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Scripted generator that records every prompt it receives.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock answer".into(),
            fail: false,
            delay_ms: 0,
        }
    }
}

impl MockGenerator {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Prompts received so far, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(LlmError::Other("mock generation error".into()));
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) });
        Ok(next.unwrap_or_else(|| self.default_response.clone()))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let e = MockEmbedder::default();
        let a = e.embed("The quick brown fox").await.unwrap();
        let b = e.embed("The quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), MOCK_DIMENSION);
        assert_eq!(e.calls(), 2);
    }

    #[tokio::test]
    async fn shared_words_score_higher() {
        let e = MockEmbedder::default();
        let q = e.embed("capital of France").await.unwrap();
        let near = e.embed("Paris is the capital of France.").await.unwrap();
        let far = e.embed("Bananas grow in tropical climates.").await.unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let v = MockEmbedder::new(8).embed("   ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn failing_embedder_errors_and_counts() {
        let e = MockEmbedder::failing();
        assert!(e.embed("x").await.is_err());
        assert_eq!(e.calls(), 1);
    }

    #[tokio::test]
    async fn generator_returns_scripted_then_default() {
        let g = MockGenerator::with_responses(vec!["first".into()]);
        assert_eq!(g.generate("p1").await.unwrap(), "first");
        assert_eq!(g.generate("p2").await.unwrap(), "mock answer");
        assert_eq!(g.prompts(), vec!["p1".to_owned(), "p2".to_owned()]);
    }

    #[tokio::test]
    async fn failing_generator_errors() {
        assert!(MockGenerator::failing().generate("p").await.is_err());
    }

    mod proptest_mock {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn vectors_are_unit_or_zero(text in "[a-zA-Z0-9 .,!?]{0,200}") {
                let e = MockEmbedder::new(32);
                let v = e.vectorize(&text);
                prop_assert_eq!(v.len(), 32);
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                prop_assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-4);
                prop_assert_eq!(v, e.vectorize(&text));
            }
        }
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let e = MockEmbedder::default();
        let batch = e.embed_batch(&["alpha", "beta"]).await.unwrap();
        assert_eq!(batch[0], e.embed("alpha").await.unwrap());
        assert_eq!(batch[1], e.embed("beta").await.unwrap());
    }
}
