// Snapshot store.
// Keeps the last known good snapshot per key in memory and mirrors it to disk as JSON.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::snapshot::Snapshot;

use super::clock::{Clock, SystemClock};
use super::paths::{is_record, record_path};

/// Stored snapshot with its generation time. Also the on-disk record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Unix seconds. Never decreases across writes for the same key.
    pub generated_at: i64,
    pub data: Snapshot,
}

impl CacheEntry {
    pub fn age(&self, now: i64) -> i64 {
        now - self.generated_at
    }

    /// Fresh while younger than the TTL.
    pub fn is_valid(&self, now: i64, ttl_seconds: u64) -> bool {
        self.age(now) < ttl_seconds as i64
    }
}

/// In-memory snapshot map with a one-file-per-key mirror on disk.
///
/// Entries are replaced wholesale and never removed.
pub struct SnapshotStore {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Full entry for a key, fresh or not.
    pub fn entry(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.lock().get(key).cloned()
    }

    /// Snapshot for a key regardless of age.
    pub fn get(&self, key: &str) -> Option<Snapshot> {
        self.entry(key).map(|entry| entry.data.clone())
    }

    /// Entry for a key only while it is younger than `ttl_seconds`.
    pub fn valid_entry(&self, key: &str, ttl_seconds: u64) -> Option<Arc<CacheEntry>> {
        let now = self.now();
        self.entry(key).filter(|entry| entry.is_valid(now, ttl_seconds))
    }

    /// Snapshot for a key only while it is younger than `ttl_seconds`.
    pub fn get_valid(&self, key: &str, ttl_seconds: u64) -> Option<Snapshot> {
        self.valid_entry(key, ttl_seconds)
            .map(|entry| entry.data.clone())
    }

    /// Replace the entry for `key`, stamped with the current time.
    ///
    /// If the clock reads earlier than the previous stamp, the previous stamp is kept.
    pub fn set(&self, key: &str, data: Snapshot) -> Arc<CacheEntry> {
        let now = self.now();
        let entry = {
            let mut entries = self.entries.lock();
            let generated_at = entries
                .get(key)
                .map_or(now, |prev| now.max(prev.generated_at));
            let entry = Arc::new(CacheEntry {
                key: key.to_string(),
                generated_at,
                data,
            });
            entries.insert(key.to_string(), entry.clone());
            entry
        };

        tracing::info!(key, generated_at = entry.generated_at, "snapshot stored");
        entry
    }

    /// Seconds until the entry goes stale; 0 if stale or absent.
    pub fn remaining_ttl(&self, key: &str, ttl_seconds: u64) -> u64 {
        let now = self.now();
        self.entry(key)
            .map(|entry| (ttl_seconds as i64 - entry.age(now)).max(0) as u64)
            .unwrap_or(0)
    }

    /// All keys currently held, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current entry for `key` to disk. Failures are logged only.
    pub fn persist(&self, key: &str) {
        match self.try_persist(key) {
            Ok(path) => tracing::debug!(key, path = %path.display(), "snapshot persisted"),
            Err(err) => tracing::error!(key, error = %err, "failed to persist snapshot"),
        }
    }

    pub(crate) fn try_persist(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| PersistenceError::MissingEntry(key.to_string()))?;
        let path = record_path(&self.dir, key);
        write_record(&path, &entry)?;
        Ok(path)
    }

    /// Load every persisted record into memory. Corrupt records are skipped.
    ///
    /// Returns the number of records loaded.
    pub fn load_all(&self) -> usize {
        if let Err(source) = fs::create_dir_all(&self.dir) {
            tracing::error!(
                dir = %self.dir.display(),
                error = %source,
                "failed to create snapshot directory"
            );
            return 0;
        }

        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(source) => {
                tracing::error!(
                    dir = %self.dir.display(),
                    error = %source,
                    "failed to list snapshot directory"
                );
                return 0;
            }
        };

        let mut loaded = 0;
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if !is_record(&path) {
                continue;
            }

            match read_record(&path) {
                Ok(record) => {
                    self.insert_loaded(record);
                    loaded += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping corrupt snapshot record")
                }
            }
        }

        tracing::info!(loaded, dir = %self.dir.display(), "loaded persisted snapshots");
        loaded
    }

    /// Insert a record read from disk unless memory already holds something newer.
    fn insert_loaded(&self, record: CacheEntry) {
        let mut entries = self.entries.lock();
        let newer_in_memory = entries
            .get(&record.key)
            .is_some_and(|existing| existing.generated_at > record.generated_at);
        if !newer_in_memory {
            entries.insert(record.key.clone(), Arc::new(record));
        }
    }
}

/// Read one record file.
fn read_record(path: &Path) -> Result<CacheEntry, PersistenceError> {
    let contents = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&contents).map_err(|source| PersistenceError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write one record file atomically via a temp file.
fn write_record(path: &Path, entry: &CacheEntry) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }

    let json = serde_json::to_string_pretty(entry).map_err(|source| PersistenceError::Json {
        path: path.display().to_string(),
        source,
    })?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(|source| io_error(&temp_path, source))?;
    file.write_all(json.as_bytes())
        .map_err(|source| io_error(&temp_path, source))?;
    file.sync_all().map_err(|source| io_error(&temp_path, source))?;
    fs::rename(&temp_path, path).map_err(|source| io_error(path, source))?;

    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}
