//! The run-handle event channel.
//!
//! The worker pushes every terminal transition, `TOKEN`, and
//! `ASSET_CREATED` through here. The default channel is bounded: when the
//! consumer falls behind, the worker blocks rather than dropping events.
//! `ack_mode = on_complete` runs drain after quiescence, so they use an
//! unbounded channel instead. A closed receiver is not an error — the
//! consumer simply stopped listening.

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use cz_domain::event::{Event, EventStatus, EventType};
use cz_domain::JsonMap;

pub(crate) const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub(crate) enum RunEmitter {
    Bounded(mpsc::Sender<Event>),
    Unbounded(mpsc::UnboundedSender<Event>),
    /// Detached work (background task threads) has no listener.
    Null,
}

#[derive(Debug)]
pub(crate) enum EventReceiver {
    Bounded(mpsc::Receiver<Event>),
    Unbounded(mpsc::UnboundedReceiver<Event>),
}

impl RunEmitter {
    pub fn bounded() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self::Bounded(tx), EventReceiver::Bounded(rx))
    }

    pub fn unbounded() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Unbounded(tx), EventReceiver::Unbounded(rx))
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub async fn emit(&self, event: Event) {
        match self {
            Self::Bounded(tx) => {
                let _ = tx.send(event).await;
            }
            Self::Unbounded(tx) => {
                let _ = tx.send(event);
            }
            Self::Null => {}
        }
    }

    /// Build and emit a transient stream-only event (`TOKEN`,
    /// `ASSET_CREATED`). These never touch the queue.
    pub async fn emit_transient(
        &self,
        thread_id: &str,
        event_type: EventType,
        payload: Value,
        parent_event_id: Option<String>,
        trace_id: Option<String>,
    ) {
        let now = Utc::now();
        self.emit(Event {
            id: uuid::Uuid::now_v7().to_string(),
            thread_id: thread_id.to_owned(),
            event_type,
            payload,
            parent_event_id,
            trace_id,
            priority: 0,
            ttl_ms: None,
            expires_at: None,
            status: EventStatus::Completed,
            metadata: JsonMap::new(),
            created_at: now,
            updated_at: now,
        })
        .await;
    }
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Event> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    pub fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Event>> {
        match self {
            Self::Bounded(rx) => rx.poll_recv(cx),
            Self::Unbounded(rx) => rx.poll_recv(cx),
        }
    }
}
