//! The public run API.
//!
//! `run` validates the request, upserts the thread, enqueues the initial
//! `NEW_MESSAGE`, and spawns the worker. The returned handle is a lazy,
//! finite pull stream of events (terminal transitions, `TOKEN`s,
//! `ASSET_CREATED`s) plus a one-shot completion and cooperative
//! cancellation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

use cz_domain::error::{Error, Result};
use cz_domain::event::{Event, EventSpec, NewMessagePayload};
use cz_domain::message::{
    FunctionCall, MessageContent, Sender, SenderType, ToolCallDescriptor,
};
use cz_domain::thread::ThreadSpec;
use cz_domain::JsonMap;

use crate::cancel::CancelToken;
use crate::context::RunContext;
use crate::emitter::{EventReceiver, RunEmitter};
use crate::hook::EventHook;
use crate::worker::{self, WorkerDeps};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool call submitted directly with a run (args as an object; the
/// engine JSON-encodes them into the descriptor form).
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub content: MessageContent,
    pub sender: Sender,
    #[serde(default)]
    pub thread: Option<ThreadSpec>,
    #[serde(default)]
    pub tool_calls: Vec<IncomingToolCall>,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Return as soon as the initial event is enqueued.
    #[default]
    Immediate,
    /// Return only after the thread drained. Events buffer unbounded in
    /// this mode, since nothing reads the stream while the worker runs.
    OnComplete,
}

pub struct RunOptions {
    /// Emit `TOKEN` events on the handle (on by default). Terminal
    /// transitions and `ASSET_CREATED` events are always delivered.
    pub stream: bool,
    /// TTL applied to the initial event.
    pub queue_ttl_ms: Option<u64>,
    pub ack_mode: AckMode,
    /// Override hook; sees every non-`TOKEN` event before its processor.
    pub on_event: Option<Arc<dyn EventHook>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stream: true,
            queue_ttl_ms: None,
            ack_mode: AckMode::default(),
            on_event: None,
        }
    }
}

pub struct RunRequest {
    pub message: IncomingMessage,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(message: IncomingMessage) -> Self {
        Self {
            message,
            options: RunOptions::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct RunHandle {
    /// Id of the initial queue event.
    pub queue_id: String,
    pub thread_id: String,
    pub status: &'static str,
    events: EventReceiver,
    done: Option<oneshot::Receiver<Result<()>>>,
    cancel: CancelToken,
}

impl RunHandle {
    /// Next event for this run; `None` once the worker drained the
    /// thread and the stream closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Collect every remaining event until the stream closes.
    pub async fn collect_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Await the run's completion. Resolves once per handle; later calls
    /// return `Ok(())`.
    pub async fn done(&mut self) -> Result<()> {
        match self.done.take() {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(Error::Other("worker task dropped".into()))),
            None => Ok(()),
        }
    }

    /// Cooperative cancellation: the worker stops after the in-flight
    /// event; already-persisted events and emitted tokens remain.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl futures_core::Stream for RunHandle {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.events.poll_recv(cx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn run(ctx: Arc<RunContext>, request: RunRequest) -> Result<RunHandle> {
    let RunRequest { message, options } = request;

    // Rejected before anything is enqueued.
    if message.content.is_empty() && message.tool_calls.is_empty() {
        return Err(Error::InvalidInput(
            "run request needs message content or tool calls".into(),
        ));
    }

    // ── Thread upsert ─────────────────────────────────────────────
    let spec = message.thread.clone().unwrap_or_default();
    let (mut thread, _) = ctx.db.threads().upsert(&spec, "conversation")?;

    // An empty participant set with a human sender pulls in the sender
    // plus every agent in the context.
    if thread.participants.is_empty() && message.sender.sender_type == SenderType::User {
        let sender_name = message.sender.participant_name();
        let agent_names = ctx.agent_names();
        thread = ctx.db.threads().update(&thread.id, |t| {
            t.add_participant(&sender_name);
            for name in &agent_names {
                t.add_participant(name);
            }
        })?;
    }

    // ── Initial event ─────────────────────────────────────────────
    let tool_calls: Vec<ToolCallDescriptor> = message
        .tool_calls
        .iter()
        .map(|c| {
            Ok(ToolCallDescriptor {
                id: c.id.clone(),
                function: FunctionCall {
                    name: c.name.clone(),
                    arguments: serde_json::to_string(&c.args)?,
                },
            })
        })
        .collect::<Result<_>>()?;

    let payload = NewMessagePayload {
        content: Some(message.content),
        sender: message.sender,
        thread: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        metadata: message.metadata,
    };

    let mut event_spec =
        EventSpec::new_message(&payload)?.with_trace(uuid::Uuid::new_v4().to_string());
    if let Some(ttl) = options.queue_ttl_ms {
        event_spec = event_spec.with_ttl_ms(ttl);
    }
    let initial = ctx.db.queue().add_to_queue(&thread.id, event_spec)?;

    tracing::info!(
        thread_id = %thread.id,
        queue_id = %initial.id,
        "run accepted"
    );

    // ── Worker ────────────────────────────────────────────────────
    let (emitter, events) = match options.ack_mode {
        AckMode::Immediate => RunEmitter::bounded(),
        AckMode::OnComplete => RunEmitter::unbounded(),
    };
    let cancel = CancelToken::new();
    let deps = WorkerDeps {
        ctx: ctx.clone(),
        emitter,
        cancel: cancel.clone(),
        hook: options.on_event,
        emit_tokens: options.stream,
    };

    let (done_tx, done_rx) = oneshot::channel();
    let thread_id = thread.id.clone();
    let join = tokio::spawn(async move {
        let result = worker::run_thread(&deps, &thread_id).await;
        let _ = done_tx.send(result);
    });

    if options.ack_mode == AckMode::OnComplete {
        let _ = join.await;
    }

    Ok(RunHandle {
        queue_id: initial.id,
        thread_id: thread.id,
        status: "queued",
        events,
        done: Some(done_rx),
        cancel,
    })
}
