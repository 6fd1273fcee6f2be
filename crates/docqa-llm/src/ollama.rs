use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{Embedder, Generator};

pub const DEFAULT_PORT: u16 = 11434;

/// Client for a local Ollama runtime. Serves both embeddings and chat generation.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
    temperature: Option<f32>,
    serves_embeddings: bool,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
            temperature: None,
            serves_embeddings: true,
        }
    }

    /// Used for generation only; [`Self::ensure_models`] skips the embedding model.
    #[must_use]
    pub fn generation_only(mut self) -> Self {
        self.serves_embeddings = false;
        self
    }

    /// Models that must be pulled for this provider to serve its roles.
    #[must_use]
    pub fn required_models(&self) -> Vec<&str> {
        let mut models = vec![self.model.as_str()];
        if self.serves_embeddings {
            models.push(&self.embedding_model);
        }
        models
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unreachable`] if the runtime does not answer.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Unreachable(format!("is Ollama running? {e}")))?;
        Ok(())
    }

    /// Verify that every [required model](Self::required_models) is pulled.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelNotFound`] naming the first missing model.
    pub async fn ensure_models(&self) -> Result<(), LlmError> {
        let local = self
            .client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Unreachable(format!("is Ollama running? {e}")))?;
        let names: Vec<&str> = local.iter().map(|m| m.name.as_str()).collect();

        for wanted in self.required_models() {
            if !names.iter().any(|n| model_matches(n, wanted)) {
                return Err(LlmError::ModelNotFound(wanted.to_owned()));
            }
        }
        Ok(())
    }

    fn chat_request(&self, prompt: &str) -> ChatMessageRequest {
        let request = ChatMessageRequest::new(
            self.model.clone(),
            vec![ChatMessage::user(prompt.to_owned())],
        );
        match self.temperature {
            Some(t) => request.options(ModelOptions::default().temperature(t)),
            None => request,
        }
    }
}

impl Generator for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .send_chat_messages(self.chat_request(prompt))
            .await
            .map_err(|e| classify_error(&self.model, &e))?;

        let content = response.message.content.trim();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "ollama" });
        }
        Ok(content.to_owned())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

impl Embedder for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| classify_error(&self.embedding_model, &e))?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })?;
        if vector.is_empty() {
            return Err(LlmError::MalformedEmbedding(
                "ollama returned a zero-length vector".into(),
            ));
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

/// Map an Ollama client error onto the backend error kinds the pipeline reacts to.
fn classify_error(model: &str, err: &impl std::fmt::Display) -> LlmError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("not found") && lower.contains("model") {
        LlmError::ModelNotFound(model.to_owned())
    } else if lower.contains("error sending request")
        || lower.contains("connection refused")
        || lower.contains("connect")
    {
        LlmError::Unreachable(msg)
    } else {
        LlmError::Other(format!("Ollama request failed: {msg}"))
    }
}

/// `gemma3` matches a local `gemma3:latest`; a tagged name must match exactly.
fn model_matches(local: &str, wanted: &str) -> bool {
    if local == wanted {
        return true;
    }
    !wanted.contains(':') && local.split(':').next() == Some(wanted)
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), DEFAULT_PORT)
}
