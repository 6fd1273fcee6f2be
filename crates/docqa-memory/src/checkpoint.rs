//! Record of the last successful index build.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Fingerprint;
use crate::error::CheckpointError;

/// Settings that shape the index. A change in any of them invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub fingerprint: Fingerprint,
    pub source: String,
    pub page_count: usize,
    pub chunk_count: usize,
    #[serde(flatten)]
    pub settings: BuildSettings,
    pub indexed_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Read a checkpoint. Missing or unreadable files count as "never indexed".
    pub async fn load(path: &Path) -> Option<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read checkpoint: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(cp) => Some(cp),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring malformed checkpoint: {e}");
                None
            }
        }
    }

    /// Write atomically via a sibling temp file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        tracing::debug!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// True when this checkpoint describes an index built from `fingerprint` with `settings`.
    #[must_use]
    pub fn matches(&self, fingerprint: &Fingerprint, settings: &BuildSettings) -> bool {
        &self.fingerprint == fingerprint && &self.settings == settings
    }
}
