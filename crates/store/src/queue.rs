//! The durable event queue.
//!
//! Persists events and serves a per-thread pending-sorted view with expiry
//! handling. Ordering among pending events on a thread: `priority`
//! descending, then `created_at` ascending, then `id` ascending — ids are
//! UUIDv7, so the final tiebreak follows arrival order.
//!
//! Status transitions are recorded as appended JSONL rows (last write per
//! id wins on reload); the queue itself does not police transition
//! legality — the worker does.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use cz_domain::error::{Error, Result};
use cz_domain::event::{Event, EventSpec, EventStatus};
use cz_domain::JsonMap;

/// Upper bound on how many long-expired rows one `add_to_queue` call will
/// sweep, so enqueueing never stalls behind a large backlog.
const SWEEP_BATCH: usize = 64;

pub struct EventQueue {
    inner: RwLock<QueueInner>,
    log_path: Option<PathBuf>,
}

struct QueueInner {
    events: HashMap<String, Event>,
    /// Insertion-ordered event ids per thread.
    by_thread: HashMap<String, Vec<String>>,
}

impl EventQueue {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(QueueInner {
                events: HashMap::new(),
                by_thread: HashMap::new(),
            }),
            log_path,
        }
    }

    /// Load a queue from its JSONL log. Rows are full event snapshots;
    /// the latest row per id wins.
    pub fn load(path: PathBuf) -> Result<Self> {
        let rows: Vec<Event> = super::read_jsonl(&path)?;
        let queue = Self::new(Some(path));
        {
            let mut inner = queue.inner.write();
            for event in rows {
                if !inner.events.contains_key(&event.id) {
                    inner
                        .by_thread
                        .entry(event.thread_id.clone())
                        .or_default()
                        .push(event.id.clone());
                }
                inner.events.insert(event.id.clone(), event);
            }
        }
        Ok(queue)
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Insert an event with `status = pending` unless the spec carries one.
    /// `ttl_ms > 0` without an explicit `expires_at` derives the expiry;
    /// an explicit `expires_at` wins when both are present.
    pub fn add_to_queue(&self, thread_id: &str, spec: EventSpec) -> Result<Event> {
        if !spec.event_type.is_enqueueable() {
            return Err(Error::InvalidInput(format!(
                "{} events are stream-only and cannot be enqueued",
                spec.event_type
            )));
        }

        let now = Utc::now();
        let expires_at = spec.expires_at.or_else(|| {
            spec.ttl_ms
                .filter(|ttl| *ttl > 0)
                .map(|ttl| now + Duration::milliseconds(ttl as i64))
        });

        let event = Event {
            id: uuid::Uuid::now_v7().to_string(),
            thread_id: thread_id.to_owned(),
            event_type: spec.event_type,
            payload: spec.payload,
            parent_event_id: spec.parent_event_id,
            trace_id: spec.trace_id,
            priority: spec.priority,
            ttl_ms: spec.ttl_ms,
            expires_at,
            status: spec.status.unwrap_or(EventStatus::Pending),
            metadata: spec.metadata,
            created_at: now,
            updated_at: now,
        };

        {
            let mut inner = self.inner.write();
            inner
                .by_thread
                .entry(thread_id.to_owned())
                .or_default()
                .push(event.id.clone());
            inner.events.insert(event.id.clone(), event.clone());
        }
        self.persist(&event)?;

        tracing::debug!(
            event_id = %event.id,
            thread_id,
            event_type = %event.event_type,
            "event enqueued"
        );

        // Opportunistic, bounded cleanup of rows that expired while nobody
        // was dequeuing this thread.
        self.sweep_expired(now, SWEEP_BATCH)?;

        Ok(event)
    }

    /// The single event in `processing` for this thread, if any.
    pub fn get_processing_item(&self, thread_id: &str) -> Option<Event> {
        let inner = self.inner.read();
        let result = inner.thread_events(thread_id).find_map(|e| {
            (e.status == EventStatus::Processing).then(|| e.clone())
        });
        result
    }

    /// The highest-ranked live pending event for this thread. Candidates
    /// whose expiry has passed are marked `expired` and skipped.
    pub fn get_next_pending(&self, thread_id: &str) -> Result<Option<Event>> {
        let now = Utc::now();
        let mut expired = Vec::new();
        let picked = {
            let mut inner = self.inner.write();

            let mut pending: Vec<&Event> = inner
                .thread_events(thread_id)
                .filter(|e| e.status == EventStatus::Pending)
                .collect();
            pending.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });

            let mut live = None;
            let mut to_expire = Vec::new();
            for event in pending {
                if event.is_expired_at(now) {
                    to_expire.push(event.id.clone());
                } else {
                    live = Some(event.id.clone());
                    break;
                }
            }

            for id in to_expire {
                if let Some(event) = inner.events.get_mut(&id) {
                    event.status = EventStatus::Expired;
                    event.updated_at = now;
                    expired.push(event.clone());
                }
            }

            live.and_then(|id| inner.events.get(&id).cloned())
        };

        for event in &expired {
            tracing::debug!(event_id = %event.id, thread_id, "event expired at dequeue");
            self.persist(event)?;
        }

        Ok(picked)
    }

    /// Transition an event's status. Legality is the worker's concern.
    pub fn update_status(&self, event_id: &str, status: EventStatus) -> Result<Event> {
        let updated = {
            let mut inner = self.inner.write();
            let event = inner
                .events
                .get_mut(event_id)
                .ok_or_else(|| Error::Storage(format!("unknown event id {event_id}")))?;
            event.status = status;
            event.updated_at = Utc::now();
            event.clone()
        };
        self.persist(&updated)?;
        Ok(updated)
    }

    /// Mark an event preempted by the override hook.
    pub fn mark_overwritten(&self, event_id: &str) -> Result<Event> {
        self.update_status(event_id, EventStatus::Overwritten)
    }

    /// Merge keys into an event's metadata (observability only; payload
    /// and status are untouched).
    pub fn merge_metadata(&self, event_id: &str, patch: JsonMap) -> Result<Event> {
        let updated = {
            let mut inner = self.inner.write();
            let event = inner
                .events
                .get_mut(event_id)
                .ok_or_else(|| Error::Storage(format!("unknown event id {event_id}")))?;
            for (k, v) in patch {
                event.metadata.insert(k, v);
            }
            event.updated_at = Utc::now();
            event.clone()
        };
        self.persist(&updated)?;
        Ok(updated)
    }

    pub fn get(&self, event_id: &str) -> Option<Event> {
        self.inner.read().events.get(event_id).cloned()
    }

    /// All events for a thread, oldest first (audit view).
    pub fn list_for_thread(&self, thread_id: &str) -> Vec<Event> {
        let inner = self.inner.read();
        let mut events: Vec<Event> = inner.thread_events(thread_id).cloned().collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        events
    }

    /// True when the thread has at least one pending event.
    pub fn has_pending(&self, thread_id: &str) -> bool {
        self.inner
            .read()
            .thread_events(thread_id)
            .any(|e| e.status == EventStatus::Pending)
    }

    // ── Expiry sweep ───────────────────────────────────────────────

    /// Mark up to `limit` expired pending rows across all threads.
    /// Returns how many were swept. Expired rows are retained for audit.
    pub fn sweep_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<usize> {
        let swept: Vec<Event> = {
            let mut inner = self.inner.write();
            let ids: Vec<String> = inner
                .events
                .values()
                .filter(|e| e.status == EventStatus::Pending && e.is_expired_at(now))
                .take(limit)
                .map(|e| e.id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let event = inner.events.get_mut(&id)?;
                    event.status = EventStatus::Expired;
                    event.updated_at = now;
                    Some(event.clone())
                })
                .collect()
        };
        for event in &swept {
            self.persist(event)?;
        }
        Ok(swept.len())
    }

    fn persist(&self, event: &Event) -> Result<()> {
        match &self.log_path {
            Some(path) => super::append_jsonl(path, event),
            None => Ok(()),
        }
    }
}

impl QueueInner {
    fn thread_events<'a>(&'a self, thread_id: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.by_thread
            .get(thread_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.events.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_domain::event::EventType;
    use serde_json::json;

    fn spec(payload: serde_json::Value) -> EventSpec {
        EventSpec::new(EventType::Custom("TEST".into()), payload)
    }

    #[test]
    fn add_then_next_pending_roundtrips_payload() {
        let queue = EventQueue::new(None);
        let added = queue
            .add_to_queue("t1", spec(json!({"n": 1})))
            .unwrap();
        let next = queue.get_next_pending("t1").unwrap().unwrap();
        assert_eq!(next.id, added.id);
        assert_eq!(next.payload, json!({"n": 1}));
    }

    #[test]
    fn pending_order_priority_then_arrival() {
        let queue = EventQueue::new(None);
        let low = queue.add_to_queue("t1", spec(json!(1))).unwrap();
        let mid = queue.add_to_queue("t1", spec(json!(2))).unwrap();
        let high = queue
            .add_to_queue("t1", spec(json!(3)).with_priority(10))
            .unwrap();

        let mut order = Vec::new();
        while let Some(event) = queue.get_next_pending("t1").unwrap() {
            order.push(event.id.clone());
            queue.update_status(&event.id, EventStatus::Completed).unwrap();
        }
        assert_eq!(order, vec![high.id, low.id, mid.id]);
    }

    #[test]
    fn ttl_derives_expiry_and_explicit_wins() {
        let queue = EventQueue::new(None);
        let derived = queue
            .add_to_queue("t1", spec(json!(1)).with_ttl_ms(60_000))
            .unwrap();
        assert!(derived.expires_at.is_some());

        let explicit_at = Utc::now() + Duration::hours(1);
        let mut s = spec(json!(2)).with_ttl_ms(1);
        s.expires_at = Some(explicit_at);
        let explicit = queue.add_to_queue("t1", s).unwrap();
        assert_eq!(explicit.expires_at, Some(explicit_at));
    }

    #[test]
    fn expired_candidate_is_marked_and_skipped() {
        let queue = EventQueue::new(None);
        let mut dead = spec(json!("dead"));
        dead.expires_at = Some(Utc::now() - Duration::seconds(1));
        let dead = queue.add_to_queue("t1", dead).unwrap();
        let live = queue.add_to_queue("t1", spec(json!("live"))).unwrap();

        let next = queue.get_next_pending("t1").unwrap().unwrap();
        assert_eq!(next.id, live.id);
        assert_eq!(queue.get(&dead.id).unwrap().status, EventStatus::Expired);
    }

    #[test]
    fn token_events_are_rejected() {
        let queue = EventQueue::new(None);
        let err = queue
            .add_to_queue("t1", EventSpec::new(EventType::Token, json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn sweep_is_bounded() {
        let queue = EventQueue::new(None);
        for i in 0..10 {
            let mut s = spec(json!(i));
            s.expires_at = Some(Utc::now() - Duration::seconds(10));
            queue.add_to_queue("t1", s).unwrap();
        }
        let swept = queue.sweep_expired(Utc::now(), 3).unwrap();
        assert_eq!(swept, 3);
    }

    #[test]
    fn processing_item_is_visible() {
        let queue = EventQueue::new(None);
        let event = queue.add_to_queue("t1", spec(json!(1))).unwrap();
        assert!(queue.get_processing_item("t1").is_none());
        queue.update_status(&event.id, EventStatus::Processing).unwrap();
        assert_eq!(queue.get_processing_item("t1").unwrap().id, event.id);
    }

    #[test]
    fn jsonl_reload_keeps_latest_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let queue = EventQueue::load(path.clone()).unwrap();
        let event = queue.add_to_queue("t1", spec(json!(1))).unwrap();
        queue.update_status(&event.id, EventStatus::Completed).unwrap();

        let reloaded = EventQueue::load(path).unwrap();
        assert_eq!(
            reloaded.get(&event.id).unwrap().status,
            EventStatus::Completed
        );
        assert!(reloaded.get_next_pending("t1").unwrap().is_none());
    }
}
