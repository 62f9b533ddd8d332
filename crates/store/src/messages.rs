//! Append-only message store.
//!
//! Messages are never mutated after insert; corrections arrive as new
//! messages. Each insert is one appended JSONL row.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use cz_domain::error::Result;
use cz_domain::message::Message;

pub struct MessageStore {
    /// Messages per thread, in insertion order.
    inner: RwLock<HashMap<String, Vec<Message>>>,
    log_path: Option<PathBuf>,
}

impl MessageStore {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            log_path,
        }
    }

    pub fn load(path: PathBuf) -> Result<Self> {
        let rows: Vec<Message> = super::read_jsonl(&path)?;
        let store = Self::new(Some(path));
        {
            let mut inner = store.inner.write();
            for message in rows {
                inner
                    .entry(message.thread_id.clone())
                    .or_default()
                    .push(message);
            }
        }
        Ok(store)
    }

    /// Insert one message. Append-only: existing rows are never touched.
    pub fn insert(&self, message: Message) -> Result<Message> {
        {
            let mut inner = self.inner.write();
            inner
                .entry(message.thread_id.clone())
                .or_default()
                .push(message.clone());
        }
        if let Some(path) = &self.log_path {
            super::append_jsonl(path, &message)?;
        }
        tracing::debug!(
            message_id = %message.id,
            thread_id = %message.thread_id,
            sender = %message.sender_id,
            "message persisted"
        );
        Ok(message)
    }

    /// All messages of a thread, oldest first.
    pub fn list_for_thread(&self, thread_id: &str) -> Vec<Message> {
        let mut messages = self
            .inner
            .read()
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages
    }

    pub fn count_for_thread(&self, thread_id: &str) -> usize {
        self.inner.read().get(thread_id).map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cz_domain::message::SenderType;
    use cz_domain::JsonMap;

    fn message(thread_id: &str, text: &str) -> Message {
        Message {
            id: uuid::Uuid::now_v7().to_string(),
            thread_id: thread_id.into(),
            sender_id: "user-1".into(),
            sender_type: SenderType::User,
            sender_user_id: None,
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
            metadata: JsonMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_preserves_order() {
        let store = MessageStore::new(None);
        store.insert(message("t1", "first")).unwrap();
        store.insert(message("t1", "second")).unwrap();
        let list = store.list_for_thread("t1");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content.as_deref(), Some("first"));
    }

    #[test]
    fn reload_from_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");

        let store = MessageStore::load(path.clone()).unwrap();
        store.insert(message("t1", "hello")).unwrap();

        let reloaded = MessageStore::load(path).unwrap();
        assert_eq!(reloaded.count_for_thread("t1"), 1);
    }
}
