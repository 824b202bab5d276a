//! Persistence port for the four stores.
//!
//! Each store is saved as one JSON document under a fixed key. The port only
//! moves text; encoding, decoding and corruption recovery live here so every
//! backend behaves the same.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{FeedError, Result};

/// Which store a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Followed feeds.
    Feeds,
    /// Known-article ledger.
    Ledger,
    /// Summary cache.
    Cache,
    /// Read-state set.
    ReadState,
}

impl StoreKey {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            StoreKey::Feeds => "feeds",
            StoreKey::Ledger => "known_articles",
            StoreKey::Cache => "summaries",
            StoreKey::ReadState => "read_articles",
        }
    }

    /// File name used by [`JsonFileStore`].
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name())
    }
}

/// Key-value persistence port.
pub trait StateStore: Send + Sync {
    /// Load the raw document for a store; `None` if nothing was saved yet.
    fn load(&self, key: StoreKey) -> Result<Option<String>>;

    /// Replace the raw document for a store.
    fn save(&self, key: StoreKey, contents: &str) -> Result<()>;
}

/// Decode a persisted document.
pub fn decode<T: DeserializeOwned>(key: StoreKey, contents: &str) -> Result<T> {
    serde_json::from_str(contents).map_err(|e| FeedError::StorageCorruption {
        store: key.name(),
        reason: e.to_string(),
    })
}

/// Load a store, resetting it to empty if it is missing or corrupt.
///
/// Persisted state is a derived cache, so corruption is logged and dropped
/// rather than treated as fatal.
pub fn load_or_default<T: DeserializeOwned + Default>(store: &dyn StateStore, key: StoreKey) -> T {
    let contents = match store.load(key) {
        Ok(Some(contents)) => contents,
        Ok(None) => {
            debug!("No persisted {} state, starting empty", key.name());
            return T::default();
        }
        Err(e) => {
            warn!("Failed to read {} state, starting empty: {}", key.name(), e);
            return T::default();
        }
    };

    match decode(key, &contents) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}; resetting store", e);
            T::default()
        }
    }
}

/// Encode and save a store.
pub fn save<T: Serialize>(store: &dyn StateStore, key: StoreKey, value: &T) -> Result<()> {
    let contents = serde_json::to_string(value)?;
    store.save(key, &contents)
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<StoreKey, String>>,
    saves: Mutex<HashMap<StoreKey, usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a raw document, e.g. to simulate corruption.
    pub fn put_raw(&self, key: StoreKey, contents: impl Into<String>) {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, contents.into());
    }

    /// Current raw document for a store.
    pub fn raw(&self, key: StoreKey) -> Option<String> {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// How many times a store has been saved.
    pub fn save_count(&self, key: StoreKey) -> usize {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn save(&self, key: StoreKey, contents: &str) -> Result<()> {
        self.put_raw(key, contents);
        *self
            .saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(0) += 1;
        Ok(())
    }
}

/// One JSON file per store inside a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the state directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the file backing a store.
    pub fn path(&self, key: StoreKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: StoreKey) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: StoreKey, contents: &str) -> Result<()> {
        let target = self.path(key);
        let tmp = self.dir.join(format!(".{}.tmp", key.file_name()));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}
