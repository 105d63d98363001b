use crate::domain::ports::StatusCheck;
use crate::domain::session::ResourceKey;
use crate::error::CheckError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reads the status of a resource from `<root>/<resource_key>.json`.
///
/// The document is re-read on every check, so whatever writes it (a webhook
/// receiver, a sync job, a test) drives the session.
#[derive(Debug, Clone)]
pub struct JsonFileStatusSource {
    root: PathBuf,
}

impl JsonFileStatusSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the document backing `key`, or `None` if the key would
    /// escape the root directory.
    pub fn document_path(&self, key: &ResourceKey) -> Option<PathBuf> {
        let key = key.as_str();
        if key.contains(['/', '\\']) || key.contains("..") {
            return None;
        }
        Some(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl StatusCheck<Value> for JsonFileStatusSource {
    async fn check(&self, key: &ResourceKey) -> Result<Value, CheckError> {
        let path = self
            .document_path(key)
            .ok_or_else(|| CheckError::NotFound(format!("invalid resource key '{key}'")))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CheckError::Transport(format!("{}: {}", path.display(), e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| CheckError::Malformed(format!("{}: {}", path.display(), e)))
    }
}
