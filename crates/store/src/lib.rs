//! # Ilmari Store
//!
//! A name-to-string dictionary whose entries carry ages. Entries can be
//! loaded from a directory (one file per key, age = mtime) or inserted in
//! memory (age = now). The [`TimestampStore::time`] lookup is the oracle
//! the work queue consumes; everything else is bookkeeping around it.
//!
//! Keys may arrive qualified with a `tsd::<id>/` namespace prefix. A
//! prefix naming this store is stripped transparently; a prefix naming a
//! different store is rejected.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs::{self, FileTimes, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

use ilmari_core::{MISSING, Timestamp};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the timestamp store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("empty key")]
    EmptyKey,

    #[error("key '{0}' does not exist")]
    KeyNotFound(String),

    /// The key is qualified for a store with a different id.
    #[error("key '{0}' belongs to another store")]
    ForeignKey(String),

    #[error("failed to read directory '{path}'")]
    DirRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file '{path}'")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to touch '{path}'")]
    Touch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn dir_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirRead {
            path: path.into(),
            source,
        }
    }

    fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    fn touch(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Touch {
            path: path.into(),
            source,
        }
    }
}

/// Namespace marker for qualified keys.
const NAMESPACE: &str = "tsd::";

/// A string dictionary with per-entry ages.
///
/// # Examples
///
/// ```
/// use ilmari_store::TimestampStore;
///
/// let mut store = TimestampStore::new();
/// store.insert("abba", "1234").unwrap();
///
/// assert!(store.contains("abba"));
/// assert!(store.contains("tsd::/abba"));
/// assert_eq!(store.get("abba").unwrap(), "1234");
/// assert!(store.time("abba").unwrap() > 0);
/// ```
#[derive(Debug, Clone)]
pub struct TimestampStore {
    prefix: String,
    values: HashMap<String, String>,
    timestamps: HashMap<String, Timestamp>,
}

impl Default for TimestampStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampStore {
    /// An anonymous store; its qualified prefix is `tsd::/`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id("")
    }

    /// A store whose qualified prefix is `tsd::<id>/`.
    #[must_use]
    pub fn with_id(id: impl AsRef<str>) -> Self {
        Self {
            prefix: format!("{NAMESPACE}{}/", id.as_ref()),
            values: HashMap::new(),
            timestamps: HashMap::new(),
        }
    }

    /// Render a bare key as this store's qualified name.
    #[must_use]
    pub fn qualified_name(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Insert or replace an entry, stamping it with the current time.
    ///
    /// # Errors
    ///
    /// [`StoreError::EmptyKey`] for an empty key, [`StoreError::ForeignKey`]
    /// for a key qualified for another store.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let key = self.process_key(key)?;
        self.timestamps.insert(key.clone(), now());
        self.values.insert(key, value.into());
        Ok(())
    }

    /// Look up an entry's value.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] for an absent key,
    /// [`StoreError::ForeignKey`] for a key qualified for another store.
    pub fn get(&self, key: &str) -> Result<&str> {
        let key = self.process_key(key)?;
        self.values
            .get(&key)
            .map(String::as_str)
            .ok_or(StoreError::KeyNotFound(key))
    }

    /// Whether an entry exists. Foreign-qualified keys are simply absent.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.process_key(key)
            .map(|key| self.values.contains_key(&key))
            .unwrap_or(false)
    }

    /// Remove an entry, returning its value.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] for an absent key,
    /// [`StoreError::ForeignKey`] for a key qualified for another store.
    pub fn remove(&mut self, key: &str) -> Result<String> {
        let key = self.process_key(key)?;
        match self.values.remove(&key) {
            Some(value) => {
                self.timestamps.remove(&key);
                Ok(value)
            }
            None => Err(StoreError::KeyNotFound(key)),
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.values.clear();
        self.timestamps.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(key, value)` pairs in arbitrary order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }

    /// The age of an entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] for an absent key,
    /// [`StoreError::ForeignKey`] for a key qualified for another store.
    pub fn time(&self, key: &str) -> Result<Timestamp> {
        let key = self.process_key(key)?;
        self.timestamps
            .get(&key)
            .copied()
            .ok_or(StoreError::KeyNotFound(key))
    }

    /// Oracle form of [`Self::time`]: absent or foreign keys age as
    /// [`MISSING`].
    #[must_use]
    pub fn time_or_missing(&self, key: &str) -> Timestamp {
        self.time(key).unwrap_or(MISSING)
    }

    /// Load every regular file in `dir` as an entry: key = file name,
    /// value = trimmed contents, age = mtime. Existing entries are kept
    /// unless `overwrite` is set. Returns the number of entries loaded.
    ///
    /// # Errors
    ///
    /// [`StoreError::DirRead`] / [`StoreError::FileRead`] on I/O failure.
    pub fn load_dir(&mut self, dir: &Path, overwrite: bool) -> Result<usize> {
        let mut loaded = 0_usize;

        let entries = fs::read_dir(dir).map_err(|err| StoreError::dir_read(dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::dir_read(dir, err))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !overwrite && self.values.contains_key(&name) {
                continue;
            }

            let text = fs::read_to_string(&path).map_err(|err| StoreError::file_read(&path, err))?;
            let mtime = file_mtime(&path)?;

            self.values.insert(name.clone(), text.trim_end().to_owned());
            self.timestamps.insert(name, mtime);
            loaded = loaded.saturating_add(1);
        }

        debug!(dir = %dir.display(), loaded, "loaded store entries");
        Ok(loaded)
    }

    /// Load a single key from its file under `dir`.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] when the file does not exist, plus the
    /// usual key and I/O errors.
    pub fn load_key(&mut self, dir: &Path, key: &str) -> Result<()> {
        let key = self.process_key(key)?;
        let path = dir.join(&key);
        if !path.is_file() {
            return Err(StoreError::KeyNotFound(key));
        }

        let text = fs::read_to_string(&path).map_err(|err| StoreError::file_read(&path, err))?;
        let mtime = file_mtime(&path)?;

        self.values.insert(key.clone(), text.trim_end().to_owned());
        self.timestamps.insert(key, mtime);
        Ok(())
    }

    /// Bump the mtime of the key's backing file under `dir`, creating an
    /// empty file if it does not exist. The in-memory entry is untouched;
    /// reload to observe the new age.
    ///
    /// # Errors
    ///
    /// [`StoreError::Touch`] on I/O failure, plus the usual key errors.
    pub fn touch(&self, dir: &Path, key: &str) -> Result<()> {
        let key = self.process_key(key)?;
        let path = dir.join(&key);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| StoreError::touch(&path, err))?;
        let now = SystemTime::now();
        file.set_times(FileTimes::new().set_accessed(now).set_modified(now))
            .map_err(|err| StoreError::touch(&path, err))?;

        Ok(())
    }

    /// Strip this store's namespace prefix from a qualified key.
    fn process_key(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let bare = if key.starts_with(NAMESPACE) {
            key.strip_prefix(&self.prefix)
                .ok_or_else(|| StoreError::ForeignKey(key.to_owned()))?
        } else {
            key
        };

        if bare.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        Ok(bare.to_owned())
    }
}

fn now() -> Timestamp {
    to_millis(SystemTime::now())
}

fn file_mtime(path: &Path) -> Result<Timestamp> {
    let metadata = fs::metadata(path).map_err(|err| StoreError::file_read(path, err))?;
    let modified = metadata
        .modified()
        .map_err(|err| StoreError::file_read(path, err))?;
    Ok(to_millis(modified))
}

/// Milliseconds since the Unix epoch; times before it age as [`MISSING`].
fn to_millis(time: SystemTime) -> Timestamp {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| Timestamp::try_from(elapsed.as_millis()).ok())
        .unwrap_or(MISSING)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_basic() {
        let mut store = TimestampStore::new();
        store.insert("abba", "1234").unwrap();

        assert!(store.contains("abba"));
        assert!(store.contains("tsd::/abba"));
        assert_eq!(store.get("abba").unwrap(), "1234");
        assert_eq!(store.get("tsd::/abba").unwrap(), "1234");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut store = TimestampStore::new();
        store.insert("abba", "1234").unwrap();
        assert!(store.contains("abba"));

        assert_eq!(store.remove("abba").unwrap(), "1234");
        assert!(!store.contains("abba"));
        assert!(matches!(store.time("abba"), Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn test_key_errors() {
        let mut store = TimestampStore::new();

        assert!(matches!(store.insert("", "x"), Err(StoreError::EmptyKey)));
        assert!(matches!(store.get("absent"), Err(StoreError::KeyNotFound(_))));
        assert!(matches!(
            store.get("tsd::other/abba"),
            Err(StoreError::ForeignKey(_))
        ));
        assert!(!store.contains("tsd::other/abba"));
    }

    #[test]
    fn test_store_id() {
        let mut store = TimestampStore::with_id("cache");
        store.insert("abba", "1").unwrap();

        assert_eq!(store.qualified_name("abba"), "tsd::cache/abba");
        assert!(store.contains("tsd::cache/abba"));
        assert!(!store.contains("tsd::/abba"));
    }

    #[test]
    fn test_timestamping() {
        let mut store = TimestampStore::new();

        store.insert("a", "123").unwrap();
        sleep(Duration::from_millis(20));
        store.insert("b", "123").unwrap();
        assert!(store.time("b").unwrap() > store.time("a").unwrap());

        sleep(Duration::from_millis(20));
        store.insert("a", "456").unwrap();
        assert!(store.time("a").unwrap() > store.time("b").unwrap());
    }

    #[test]
    fn test_iterators() {
        let mut store = TimestampStore::new();
        for key in ["a", "b", "c"] {
            store.insert(key, "").unwrap();
        }

        let mut seen: Vec<_> = store.keys().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(store.items().count(), 3);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha"), "one\n").unwrap();
        fs::write(dir.path().join("beta"), "two\n").unwrap();

        let mut store = TimestampStore::new();
        let loaded = store.load_dir(dir.path(), false).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(store.get("alpha").unwrap(), "one");
        assert_eq!(store.get("beta").unwrap(), "two");
        assert!(store.time("alpha").unwrap() > 0);
    }

    #[test]
    fn test_load_dir_keeps_existing_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha"), "disk").unwrap();

        let mut store = TimestampStore::new();
        store.insert("alpha", "memory").unwrap();

        store.load_dir(dir.path(), false).unwrap();
        assert_eq!(store.get("alpha").unwrap(), "memory");

        store.load_dir(dir.path(), true).unwrap();
        assert_eq!(store.get("alpha").unwrap(), "disk");
    }

    #[test]
    fn test_load_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha"), "one\n").unwrap();

        let mut store = TimestampStore::new();
        store.load_key(dir.path(), "alpha").unwrap();
        assert_eq!(store.get("alpha").unwrap(), "one");

        let result = store.load_key(dir.path(), "missing");
        assert!(matches!(result, Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn test_touch_creates_and_bumps() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimestampStore::new();

        // Creates an empty file when absent.
        store.touch(dir.path(), "fresh").unwrap();
        assert!(dir.path().join("fresh").is_file());

        let before = file_mtime(&dir.path().join("fresh")).unwrap();
        sleep(Duration::from_millis(20));
        store.touch(dir.path(), "fresh").unwrap();
        let after = file_mtime(&dir.path().join("fresh")).unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_time_or_missing() {
        let mut store = TimestampStore::new();
        store.insert("present", "x").unwrap();

        assert!(store.time_or_missing("present") > 0);
        assert_eq!(store.time_or_missing("absent"), MISSING);
        assert_eq!(store.time_or_missing("tsd::other/present"), MISSING);
    }
}
