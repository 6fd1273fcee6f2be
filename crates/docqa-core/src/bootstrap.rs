//! Backend construction from [`Config`].

use std::sync::Arc;

use docqa_llm::any::{AnyEmbedder, AnyGenerator};
use docqa_llm::ollama::OllamaProvider;
use docqa_memory::document::ChunkError;
use docqa_memory::{HfTokenizer, Tokenize};

use crate::config::{Config, EmbeddingProviderKind, GeneratorKind};
use crate::error::PipelineError;

fn ollama(config: &Config) -> OllamaProvider {
    OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.embedding.model().to_owned(),
    )
    .with_temperature(config.llm.temperature)
}

/// # Errors
///
/// Returns an error if the selected backend is not compiled in or its model fails to load.
pub async fn build_embedder(config: &Config) -> Result<AnyEmbedder, PipelineError> {
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => Ok(AnyEmbedder::Ollama(ollama(config))),
        #[cfg(feature = "candle")]
        EmbeddingProviderKind::Candle => {
            let repo = config.embedding.model().to_owned();
            tracing::info!(repo = %repo, "loading candle embedding model");
            let embedder = tokio::task::spawn_blocking(move || {
                docqa_llm::candle_embed::CandleEmbedder::load(&repo)
            })
            .await
            .map_err(|e| docqa_llm::LlmError::ModelLoad(e.to_string()))??;
            Ok(AnyEmbedder::Candle(embedder))
        }
        #[cfg(not(feature = "candle"))]
        EmbeddingProviderKind::Candle => Err(PipelineError::BackendUnavailable("candle")),
        #[cfg(feature = "mock")]
        EmbeddingProviderKind::Mock => Ok(AnyEmbedder::Mock(
            docqa_llm::mock::MockEmbedder::default().with_model(config.embedding.model()),
        )),
        #[cfg(not(feature = "mock"))]
        EmbeddingProviderKind::Mock => Err(PipelineError::BackendUnavailable("mock")),
    }
}

/// # Errors
///
/// Returns an error if the selected backend is not compiled in.
pub fn build_generator(config: &Config) -> Result<AnyGenerator, PipelineError> {
    match config.llm.provider {
        GeneratorKind::Ollama => {
            let provider = ollama(config);
            Ok(AnyGenerator::Ollama(
                if config.embedding.provider == EmbeddingProviderKind::Ollama {
                    provider
                } else {
                    provider.generation_only()
                },
            ))
        }
        #[cfg(feature = "mock")]
        GeneratorKind::Mock => Ok(AnyGenerator::Mock(docqa_llm::mock::MockGenerator::default())),
        #[cfg(not(feature = "mock"))]
        GeneratorKind::Mock => Err(PipelineError::BackendUnavailable("mock")),
    }
}

/// Resolve `chunking.tokenizer`. Blocking: may download from the Hub.
pub(crate) fn load_tokenizer(spec: &str) -> Result<Arc<dyn Tokenize>, ChunkError> {
    #[cfg(feature = "mock")]
    if spec == "whitespace" {
        return Ok(Arc::new(docqa_memory::tokenizer::WhitespaceTokenizer));
    }
    Ok(Arc::new(HfTokenizer::resolve(spec)?))
}
