//! JSON-file-backed key-value store.
//!
//! The file holds one JSON object, the same shape `storage.sync` exposes. A
//! missing file reads as empty and is created on the first write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ipb_core::{KeyValueStore, StoreError};
use serde_json::{Map, Value};

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(StoreError::Unavailable(format!("{}: {err}", self.path.display()))),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&text).map_err(|err| StoreError::Malformed {
            key: self.path.display().to_string(),
            reason: err.to_string(),
        })
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);

        let text = serde_json::to_string_pretty(&entries).map_err(|err| StoreError::Malformed {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|err| StoreError::Rejected(format!("{}: {err}", self.path.display())))
    }
}
