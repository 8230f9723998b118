use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key holding the name of the connection that was active when the process stopped.
pub const ACTIVE_CONNECTION_KEY: &str = "active_connection_name";
/// Key holding the profile id bound to that connection.
pub const ACTIVE_PROFILE_KEY: &str = "active_profile_id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Small string key-value store used to remember the active connection
/// across restarts.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt session store {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("Failed to read session store {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Default location: `<config dir>/pairlink/session.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pairlink")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write atomically (temp file + rename).
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_set_clear() {
        let store = MemoryStore::new();
        assert_eq!(store.get(ACTIVE_CONNECTION_KEY), None);
        store.set(ACTIVE_CONNECTION_KEY, "MainOffice").unwrap();
        assert_eq!(store.get(ACTIVE_CONNECTION_KEY).as_deref(), Some("MainOffice"));
        store.clear(ACTIVE_CONNECTION_KEY).unwrap();
        assert_eq!(store.get(ACTIVE_CONNECTION_KEY), None);
        // Clearing a missing key is fine
        store.clear(ACTIVE_CONNECTION_KEY).unwrap();
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = JsonFileStore::open(&path);
        store.set(ACTIVE_CONNECTION_KEY, "MainOffice").unwrap();
        store.set(ACTIVE_PROFILE_KEY, "support").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get(ACTIVE_CONNECTION_KEY).as_deref(), Some("MainOffice"));
        assert_eq!(reopened.get(ACTIVE_PROFILE_KEY).as_deref(), Some("support"));

        reopened.clear(ACTIVE_CONNECTION_KEY).unwrap();
        let again = JsonFileStore::open(&path);
        assert_eq!(again.get(ACTIVE_CONNECTION_KEY), None);
        assert_eq!(again.get(ACTIVE_PROFILE_KEY).as_deref(), Some("support"));
    }

    #[test]
    fn file_store_starts_empty_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(ACTIVE_CONNECTION_KEY), None);
        store.set(ACTIVE_CONNECTION_KEY, "x").unwrap();
        assert_eq!(JsonFileStore::open(&path).get(ACTIVE_CONNECTION_KEY).as_deref(), Some("x"));
    }

    #[test]
    fn file_store_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = JsonFileStore::open(&path);
        store.set(ACTIVE_CONNECTION_KEY, "a").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
