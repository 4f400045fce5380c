use crate::error::{AgentError, AgentResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable keyed storage for settings and buffered records
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AgentResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> AgentResult<()>;
    fn remove(&self, key: &str) -> AgentResult<()>;
}

/// Read a JSON value. Missing keys and undecodable values both read as `None`;
/// decode failures are logged.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            log::debug!("No {} found in store", key);
            return None;
        }
        Err(e) => {
            log::warn!("Failed to read {}: {}", key, e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Failed to decode {}: {}", key, e);
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> AgentResult<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes)
}

/// One JSON document per key inside a data directory.
///
/// # File Format
/// `{dir}/{key}.json`, replaced atomically through `{key}.json.tmp`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> AgentResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| AgentError::StorageError(format!("Failed to create {:?}: {}", dir, e)))?;
        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> AgentResult<PathBuf> {
        if key.is_empty() || key.contains(|c| matches!(c, '/' | '\\' | '.')) {
            return Err(AgentError::InvalidParameters(format!("Bad store key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AgentResult<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::StorageError(format!("Failed to read {:?}: {}", path, e))),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> AgentResult<()> {
        let path = self.key_path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .map_err(|e| AgentError::StorageError(format!("Failed to write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| AgentError::StorageError(format!("Failed to replace {:?}: {}", path, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AgentResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::StorageError(format!("Failed to remove {:?}: {}", path, e))),
        }
    }
}

/// Volatile store, used by tests and hosts without a writable data dir
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AgentResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|_| {
            AgentError::Internal("Failed to acquire store lock".to_string())
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> AgentResult<()> {
        let mut entries = self.entries.lock().map_err(|_| {
            AgentError::Internal("Failed to acquire store lock".to_string())
        })?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> AgentResult<()> {
        let mut entries = self.entries.lock().map_err(|_| {
            AgentError::Internal("Failed to acquire store lock".to_string())
        })?;
        entries.remove(key);
        Ok(())
    }
}
