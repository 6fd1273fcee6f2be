use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DocumentError;

/// blake3 hex digest of a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Hash the current content of `path`.
///
/// # Errors
///
/// Returns [`DocumentError::NotFound`] if the file does not exist.
pub async fn fingerprint(path: &Path) -> Result<Fingerprint, DocumentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DocumentError::from_io(path, e))?;
    Ok(Fingerprint::of_bytes(&bytes))
}

/// True when nothing was indexed yet or the file content changed since.
///
/// # Errors
///
/// Returns [`DocumentError::NotFound`] if the file does not exist.
pub async fn needs_rebuild(
    path: &Path,
    stored: Option<&Fingerprint>,
) -> Result<bool, DocumentError> {
    let Some(stored) = stored else {
        return Ok(true);
    };
    let current = fingerprint(path).await?;
    Ok(&current != stored)
}
