//! Durable stores backing the thread engine.
//!
//! `Db` bundles the event queue, the thread store, and the append-only
//! message store. State lives in memory behind `parking_lot` locks; when a
//! state path is configured, events and messages are additionally appended
//! to JSONL files and threads snapshotted to JSON, so a process restart
//! reloads where it left off.
//!
//! `Db::open_cached` maintains the one piece of process-wide state the
//! engine allows itself: a handle cache keyed by canonical state path, so
//! concurrent runs against the same path share one handle.

pub mod messages;
pub mod queue;
pub mod threads;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use cz_domain::error::{Error, Result};

pub use messages::MessageStore;
pub use queue::EventQueue;
pub use threads::ThreadStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the database keeps its state. `None` means memory-only (tests,
/// throwaway runs); handles without a path are never cached.
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    pub state_path: Option<PathBuf>,
}

impl DbConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: Some(path.into()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Db
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Db {
    queue: EventQueue,
    threads: ThreadStore,
    messages: MessageStore,
    state_path: Option<PathBuf>,
}

impl Db {
    /// Open (or create) a database at the configured state path, loading
    /// any persisted state.
    pub fn open(config: &DbConfig) -> Result<Self> {
        match &config.state_path {
            None => Ok(Self::in_memory()),
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(Error::Io)?;
                let db = Self {
                    queue: EventQueue::load(dir.join("events.jsonl"))?,
                    threads: ThreadStore::load(dir.join("threads.json"))?,
                    messages: MessageStore::load(dir.join("messages.jsonl"))?,
                    state_path: Some(dir.clone()),
                };
                tracing::info!(path = %dir.display(), "database opened");
                Ok(db)
            }
        }
    }

    /// A memory-only database with no persistence.
    pub fn in_memory() -> Self {
        Self {
            queue: EventQueue::new(None),
            threads: ThreadStore::new(None),
            messages: MessageStore::new(None),
            state_path: None,
        }
    }

    /// Open through the process-scoped handle cache. Two calls with the
    /// same canonical path get the same handle.
    pub fn open_cached(config: &DbConfig) -> Result<Arc<Db>> {
        let Some(dir) = &config.state_path else {
            return Ok(Arc::new(Self::in_memory()));
        };

        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let key = dir
            .canonicalize()
            .map_err(Error::Io)?
            .to_string_lossy()
            .into_owned();

        let mut cache = handle_cache().lock();
        if let Some(db) = cache.get(&key) {
            return Ok(db.clone());
        }
        let db = Arc::new(Self::open(config)?);
        cache.insert(key, db.clone());
        Ok(db)
    }

    /// Flush snapshots and drop this handle from the cache.
    pub fn shutdown(&self) -> Result<()> {
        self.threads.flush()?;
        if let Some(dir) = &self.state_path {
            if let Ok(canon) = dir.canonicalize() {
                handle_cache()
                    .lock()
                    .remove(&canon.to_string_lossy().into_owned());
            }
        }
        Ok(())
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }
}

fn handle_cache() -> &'static Mutex<HashMap<String, Arc<Db>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<Db>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL helpers shared by the stores
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    use std::io::Write;

    let json = serde_json::to_string(value)
        .map_err(|e| Error::Storage(format!("serializing row for {}: {e}", path.display())))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::Io)?;
    file.write_all(json.as_bytes()).map_err(Error::Io)?;
    file.write_all(b"\n").map_err(Error::Io)?;
    Ok(())
}

pub(crate) fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut rows = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed row");
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_cached_shares_handles_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::at(dir.path());
        let a = Db::open_cached(&config).unwrap();
        let b = Db::open_cached(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.shutdown().unwrap();
        let c = Db::open_cached(&config).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        c.shutdown().unwrap();
    }

    #[test]
    fn memory_databases_are_never_cached() {
        let a = Db::open_cached(&DbConfig::default()).unwrap();
        let b = Db::open_cached(&DbConfig::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
