//! Backend selection by configuration without trait objects.

#[cfg(feature = "candle")]
use crate::candle_embed::CandleEmbedder;
#[cfg(feature = "mock")]
use crate::mock::{MockEmbedder, MockGenerator};
use crate::ollama::OllamaProvider;
use crate::provider::{Embedder, Generator};

macro_rules! delegate_embedder {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Ollama($p) => $expr,
            #[cfg(feature = "candle")]
            AnyEmbedder::Candle($p) => $expr,
            #[cfg(feature = "mock")]
            AnyEmbedder::Mock($p) => $expr,
        }
    };
}

macro_rules! delegate_generator {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyGenerator::Ollama($p) => $expr,
            #[cfg(feature = "mock")]
            AnyGenerator::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Ollama(OllamaProvider),
    #[cfg(feature = "candle")]
    Candle(CandleEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockEmbedder),
}

impl Embedder for AnyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_embedder!(self, |p| p.embed(text).await)
    }

    fn model_id(&self) -> &str {
        delegate_embedder!(self, |p| p.model_id())
    }
}

#[derive(Debug, Clone)]
pub enum AnyGenerator {
    Ollama(OllamaProvider),
    #[cfg(feature = "mock")]
    Mock(MockGenerator),
}

impl AnyGenerator {
    /// Startup reachability check. Only remote runtimes can be unreachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is down or a configured model is not pulled.
    pub async fn preflight(&self) -> Result<(), crate::LlmError> {
        match self {
            Self::Ollama(p) => {
                p.health_check().await?;
                p.ensure_models().await
            }
            #[cfg(feature = "mock")]
            Self::Mock(_) => Ok(()),
        }
    }
}

impl Generator for AnyGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, crate::LlmError> {
        delegate_generator!(self, |p| p.generate(prompt).await)
    }

    fn name(&self) -> &str {
        delegate_generator!(self, |p| p.name())
    }
}
