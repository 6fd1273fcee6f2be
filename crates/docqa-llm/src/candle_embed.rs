//! In-process BERT sentence embeddings (e.g. `all-MiniLM-L6-v2`).

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use crate::error::LlmError;
use crate::provider::Embedder;

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<Inner>,
    repo_id: String,
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("repo_id", &self.repo_id)
            .field("device", &self.inner.device)
            .finish_non_exhaustive()
    }
}

impl CandleEmbedder {
    /// Load a BERT embedding model from `HuggingFace` Hub.
    ///
    /// Blocking: downloads weights on first use. Call from `spawn_blocking` or before
    /// the runtime starts serving queries.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(repo_id: &str) -> Result<Self, LlmError> {
        let device = select_device()?;
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
        })?;
        let repo = api.model(repo_id.to_owned());

        let fetch = |file: &str| {
            repo.get(file).map_err(|e| {
                LlmError::ModelLoad(format!("failed to download {file} from {repo_id}: {e}"))
            })
        };
        let config_path = fetch("config.json")?;
        let tokenizer_path = fetch("tokenizer.json")?;
        let weights_path = fetch("model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
        let model = BertModel::load(vb, &config)?;

        tracing::info!(repo_id, ?device, "loaded candle embedding model");
        Ok(Self {
            inner: Arc::new(Inner {
                model,
                tokenizer,
                device,
            }),
            repo_id: repo_id.to_owned(),
        })
    }

    fn embed_sync(inner: &Inner, text: &str) -> Result<Vec<f32>, LlmError> {
        let encoding = inner
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &inner.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &inner.device)?.unsqueeze(0)?;

        let embeddings = inner.model.forward(&input_ids, &token_type_ids, None)?;

        // mean pooling over tokens, then L2 normalization
        let seq_len = embeddings.dim(1)?;
        let sum = embeddings.sum(1)?;
        let mean_pooled = (sum
            / f64::from(
                u32::try_from(seq_len)
                    .map_err(|e| LlmError::Inference(format!("sequence length overflow: {e}")))?,
            ))?;

        let norm = mean_pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean_pooled.broadcast_div(&norm)?.squeeze(0)?;

        normalized.to_vec1::<f32>().map_err(LlmError::Candle)
    }
}

impl Embedder for CandleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || Self::embed_sync(&inner, &text))
            .await
            .map_err(|e| LlmError::Inference(format!("embedding task panicked: {e}")))?
    }

    fn model_id(&self) -> &str {
        &self.repo_id
    }
}

fn select_device() -> Result<Device, LlmError> {
    #[cfg(feature = "cuda")]
    {
        return Device::new_cuda(0).map_err(LlmError::Candle);
    }
    #[cfg(all(feature = "metal", not(feature = "cuda")))]
    {
        return Device::new_metal(0).map_err(LlmError::Candle);
    }
    #[allow(unreachable_code)]
    Ok(Device::Cpu)
}
