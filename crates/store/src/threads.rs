//! Thread store.
//!
//! Threads are created on the first run that references them, merged
//! (participants, metadata) on re-runs, and archived when a summary is
//! produced. The store snapshots to `threads.json` on every mutation.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;

use cz_domain::error::{Error, Result};
use cz_domain::thread::{Thread, ThreadSpec, ThreadStatus};

pub struct ThreadStore {
    inner: RwLock<HashMap<String, Thread>>,
    path: Option<PathBuf>,
}

impl ThreadStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            path,
        }
    }

    pub fn load(path: PathBuf) -> Result<Self> {
        let threads = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            inner: RwLock::new(threads),
            path: Some(path),
        })
    }

    pub fn get(&self, thread_id: &str) -> Option<Thread> {
        self.inner.read().get(thread_id).cloned()
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<Thread> {
        self.inner
            .read()
            .values()
            .find(|t| t.external_id.as_deref() == Some(external_id))
            .cloned()
    }

    /// Resolve a thread from a spec, creating it when nothing matches.
    ///
    /// An existing thread (matched by id, then external id) is mutated
    /// only by adding participants and merging metadata; a new thread
    /// takes everything from the spec, falling back to `default_name`.
    /// Returns `(thread, created)`.
    pub fn upsert(&self, spec: &ThreadSpec, default_name: &str) -> Result<(Thread, bool)> {
        let existing = spec
            .id
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| {
                spec.external_id
                    .as_deref()
                    .and_then(|eid| self.find_by_external_id(eid))
            });

        if let Some(thread) = existing {
            let updated = self.update(&thread.id, |t| {
                if let Some(participants) = &spec.participants {
                    for name in participants {
                        t.add_participant(name);
                    }
                }
                if let Some(metadata) = &spec.metadata {
                    for (k, v) in metadata {
                        t.metadata.insert(k.clone(), v.clone());
                    }
                }
            })?;
            return Ok((updated, false));
        }

        let now = Utc::now();
        let thread = Thread {
            id: spec
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            external_id: spec.external_id.clone(),
            name: spec
                .name
                .clone()
                .unwrap_or_else(|| default_name.to_owned()),
            description: spec.description.clone(),
            participants: spec.participants.clone().unwrap_or_default(),
            mode: spec.mode.unwrap_or_default(),
            status: ThreadStatus::Active,
            summary: None,
            parent_id: spec.parent_id.clone(),
            metadata: spec.metadata.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        self.inner.write().insert(thread.id.clone(), thread.clone());
        self.flush()?;
        tracing::debug!(thread_id = %thread.id, name = %thread.name, "thread created");
        Ok((thread, true))
    }

    /// Apply a mutation to a thread and persist the result.
    pub fn update(&self, thread_id: &str, f: impl FnOnce(&mut Thread)) -> Result<Thread> {
        let updated = {
            let mut inner = self.inner.write();
            let thread = inner
                .get_mut(thread_id)
                .ok_or_else(|| Error::Storage(format!("unknown thread id {thread_id}")))?;
            f(thread);
            thread.updated_at = Utc::now();
            thread.clone()
        };
        self.flush()?;
        Ok(updated)
    }

    /// Ensure a participant name is present on the thread.
    pub fn add_participant(&self, thread_id: &str, name: &str) -> Result<Thread> {
        self.update(thread_id, |t| {
            t.add_participant(name);
        })
    }

    /// Archive a thread, recording the summary that ended it.
    pub fn archive(&self, thread_id: &str, summary: Option<String>) -> Result<Thread> {
        let thread = self.update(thread_id, |t| {
            t.status = ThreadStatus::Archived;
            if summary.is_some() {
                t.summary = summary.clone();
            }
        })?;
        tracing::info!(thread_id, "thread archived");
        Ok(thread)
    }

    /// Walk the ancestry chain starting from (and including) a thread,
    /// parents last, bounded by `max_depth`.
    pub fn ancestry(&self, thread_id: &str, max_depth: usize) -> Vec<Thread> {
        let mut chain = Vec::new();
        let mut current = self.get(thread_id);
        while let Some(thread) = current {
            if chain.len() >= max_depth {
                break;
            }
            let parent_id = thread.parent_id.clone();
            chain.push(thread);
            current = parent_id.and_then(|id| self.get(&id));
        }
        chain
    }

    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let inner = self.inner.read();
        let json = serde_json::to_string_pretty(&*inner)
            .map_err(|e| Error::Storage(format!("serializing threads: {e}")))?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ThreadStore {
        ThreadStore::new(None)
    }

    #[test]
    fn upsert_creates_then_merges() {
        let store = store();
        let spec = ThreadSpec {
            external_id: Some("ext-1".into()),
            participants: Some(vec!["user-1".into(), "Ada".into()]),
            ..Default::default()
        };
        let (created, is_new) = store.upsert(&spec, "conversation").unwrap();
        assert!(is_new);
        assert_eq!(created.name, "conversation");

        let again = ThreadSpec {
            external_id: Some("ext-1".into()),
            participants: Some(vec!["Bob".into()]),
            ..Default::default()
        };
        let (merged, is_new) = store.upsert(&again, "other").unwrap();
        assert!(!is_new);
        assert_eq!(merged.id, created.id);
        assert_eq!(merged.participants, vec!["user-1", "Ada", "Bob"]);
    }

    #[test]
    fn archive_sets_status_and_summary() {
        let store = store();
        let (thread, _) = store.upsert(&ThreadSpec::default(), "t").unwrap();
        let archived = store
            .archive(&thread.id, Some("all done".into()))
            .unwrap();
        assert_eq!(archived.status, ThreadStatus::Archived);
        assert_eq!(archived.summary.as_deref(), Some("all done"));
    }

    #[test]
    fn ancestry_is_depth_bounded_and_cycle_safe() {
        let store = store();
        let (parent, _) = store.upsert(&ThreadSpec::default(), "parent").unwrap();
        let (child, _) = store
            .upsert(
                &ThreadSpec {
                    parent_id: Some(parent.id.clone()),
                    ..Default::default()
                },
                "child",
            )
            .unwrap();
        // Manufacture a cycle: parent points back at child.
        store
            .update(&parent.id, |t| t.parent_id = Some(child.id.clone()))
            .unwrap();

        let chain = store.ancestry(&child.id, 5);
        assert_eq!(chain.len(), 5);
        assert_eq!(chain[0].id, child.id);
        assert_eq!(chain[1].id, parent.id);
    }
}
