use std::path::PathBuf;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_paths();
        self.apply_env_overrides_pipeline();
        self.apply_env_overrides_backends();
        self.apply_env_overrides_logging();
    }

    fn apply_env_overrides_paths(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_DOCUMENT_PATH") {
            self.document.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCQA_CHECKPOINT_PATH") {
            self.document.checkpoint_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCQA_VECTOR_STORE_PATH") {
            self.vector_store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCQA_ALLOW_STALE_INDEX") {
            if let Ok(allow) = v.parse::<bool>() {
                self.document.allow_stale_index = allow;
            } else {
                self.warnings
                    .push(format!("ignoring invalid DOCQA_ALLOW_STALE_INDEX value: {v}"));
            }
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.chunking.chunk_size = n;
            } else {
                self.warnings.push(format!("ignoring invalid DOCQA_CHUNK_SIZE value: {v}"));
            }
        }
        if let Ok(v) = std::env::var("DOCQA_CHUNK_OVERLAP") {
            if let Ok(n) = v.parse::<usize>() {
                self.chunking.chunk_overlap = n;
            } else {
                self.warnings
                    .push(format!("ignoring invalid DOCQA_CHUNK_OVERLAP value: {v}"));
            }
        }
        if let Ok(v) = std::env::var("DOCQA_TOKENIZER") {
            self.chunking.tokenizer = v;
        }
        if let Ok(v) = std::env::var("DOCQA_RETRIEVAL_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.retrieval.k = k;
            } else {
                self.warnings.push(format!("ignoring invalid DOCQA_RETRIEVAL_K value: {v}"));
            }
        }
        if let Ok(v) = std::env::var("DOCQA_TIMEOUT_LLM") {
            if let Ok(secs) = v.parse::<u64>() {
                self.timeouts.llm_seconds = secs;
            } else {
                self.warnings
                    .push(format!("ignoring invalid DOCQA_TIMEOUT_LLM value: {v}"));
            }
        }
        if let Ok(v) = std::env::var("DOCQA_TIMEOUT_EMBEDDING") {
            if let Ok(secs) = v.parse::<u64>() {
                self.timeouts.embedding_seconds = secs;
            } else {
                self.warnings
                    .push(format!("ignoring invalid DOCQA_TIMEOUT_EMBEDDING value: {v}"));
            }
        }
    }

    fn apply_env_overrides_backends(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_EMBEDDING_PROVIDER") {
            match v.parse() {
                Ok(kind) => self.embedding.provider = kind,
                Err(e) => self.warnings.push(format!("ignoring DOCQA_EMBEDDING_PROVIDER: {e}")),
            }
        }
        if let Ok(v) = std::env::var("DOCQA_EMBEDDING_MODEL") {
            self.embedding.model = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_PROVIDER") {
            match v.parse() {
                Ok(kind) => self.llm.provider = kind,
                Err(e) => self.warnings.push(format!("ignoring DOCQA_LLM_PROVIDER: {e}")),
            }
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_MODEL") {
            self.llm.model = v;
        }
        // OLLAMA_HOST is the runtime's own variable; the docqa one wins when both are set
        if let Ok(v) = std::env::var("OLLAMA_HOST")
            && !v.trim().is_empty()
        {
            self.llm.base_url = normalize_host(&v);
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_TEMPERATURE") {
            if let Ok(t) = v.parse::<f32>() {
                self.llm.temperature = t;
            } else {
                self.warnings
                    .push(format!("ignoring invalid DOCQA_LLM_TEMPERATURE value: {v}"));
            }
        }
    }

    fn apply_env_overrides_logging(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_LOG_LEVEL") {
            match v.parse() {
                Ok(level) => self.logging.level = level,
                Err(e) => self.warnings.push(format!("ignoring DOCQA_LOG_LEVEL: {e}")),
            }
        }
        if let Ok(v) = std::env::var("DOCQA_LOG_FILE") {
            self.logging.file = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Ok(v) = std::env::var("DOCQA_OTLP_ENDPOINT")
            && !v.is_empty()
        {
            "otlp".clone_into(&mut self.observability.exporter);
            self.observability.endpoint = v;
        }
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
pub(crate) fn normalize_host(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_owned()
    } else {
        format!("http://{value}")
    }
}
