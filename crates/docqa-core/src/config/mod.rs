mod env;
mod types;


pub use types::*;

use std::path::Path;

use crate::error::ConfigError;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.chunk_size must be positive".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.tokenizer.trim().is_empty() {
            return Err(ConfigError::Invalid("chunking.tokenizer must not be empty".into()));
        }
        if self.retrieval.k == 0 {
            return Err(ConfigError::Invalid("retrieval.k must be positive".into()));
        }
        if self.document.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("document.path must not be empty".into()));
        }
        if self.vector_store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("vector_store.path must not be empty".into()));
        }
        if self.embedding.model().trim().is_empty() || self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model and llm.model must be set".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature ({}) must be within 0.0..=2.0",
                self.llm.temperature
            )));
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }
}
