use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded: writing {needed} bytes with {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String key/value persistence with the shape of a browser's local storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Keeps one JSON file per key under a base directory.
pub struct DirectoryStorage {
    base_dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(base_dir: &str) -> Result<Self, StorageError> {
        let expanded = shellexpand::tilde(base_dir).to_string();
        let base = PathBuf::from(expanded);
        fs::create_dir_all(&base).map_err(|source| StorageError::Io {
            path: base.clone(),
            source,
        })?;
        Ok(Self { base_dir: base })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for DirectoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Writes to a sibling temp file and renames it over the target, so a
    /// reader never sees a half-written blob.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let io_err = |source| StorageError::Io { path: tmp.clone(), source };

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            StorageError::Io { path: path.clone(), source }
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

/// Volatile storage, optionally capped at a total byte size.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directory_storage_round_trips_and_removes() {
        let tmp = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(tmp.path().to_str().unwrap()).unwrap();

        assert_eq!(storage.get_item("multi-bank-files").unwrap(), None);
        storage.set_item("multi-bank-files", "[]").unwrap();
        assert_eq!(storage.get_item("multi-bank-files").unwrap().as_deref(), Some("[]"));

        storage.set_item("multi-bank-files", "[1]").unwrap();
        assert_eq!(storage.get_item("multi-bank-files").unwrap().as_deref(), Some("[1]"));

        storage.remove_item("multi-bank-files").unwrap();
        assert_eq!(storage.get_item("multi-bank-files").unwrap(), None);
        // Removing twice is fine.
        storage.remove_item("multi-bank-files").unwrap();
    }

    #[test]
    fn directory_storage_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(tmp.path().to_str().unwrap()).unwrap();
        storage.set_item("bank-comparison-cache", "{}").unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["bank-comparison-cache.json".to_string()]);
    }

    #[test]
    fn directory_storage_rejects_path_like_keys() {
        let tmp = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(tmp.path().to_str().unwrap()).unwrap();
        assert!(matches!(
            storage.set_item("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn memory_storage_enforces_quota() {
        let storage = MemoryStorage::with_quota(16);
        storage.set_item("k", "0123456789").unwrap();
        // Replacing a key only counts the new value.
        storage.set_item("k", "abcdefghij").unwrap();
        let err = storage.set_item("other", "0123456789").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(storage.get_item("other").unwrap(), None);
    }
}
