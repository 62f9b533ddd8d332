//! The per-thread worker loop.
//!
//! Drives one thread to quiescence: dequeue the next pending event, mark
//! it processing, dispatch, enqueue whatever it produced, and persist the
//! terminal status. Distinct threads advance in parallel; within one
//! thread this loop is strictly serial, so at most one event per thread
//! is ever `processing`.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use cz_domain::error::{Error, Result};
use cz_domain::event::EventStatus;
use cz_domain::JsonMap;

use crate::cancel::CancelToken;
use crate::context::RunContext;
use crate::emitter::RunEmitter;
use crate::hook::EventHook;
use crate::processors::{self, Dispatched};

#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub ctx: Arc<RunContext>,
    pub emitter: RunEmitter,
    pub cancel: CancelToken,
    pub hook: Option<Arc<dyn EventHook>>,
    /// When false, `TOKEN` events are not emitted on the handle.
    pub emit_tokens: bool,
}

/// Run a thread until no pending events remain. Boxed so processors
/// (`ask_question`) can recurse into child threads.
pub(crate) fn run_thread<'a>(
    deps: &'a WorkerDeps,
    thread_id: &'a str,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(run_thread_inner(deps, thread_id))
}

async fn run_thread_inner(deps: &WorkerDeps, thread_id: &str) -> Result<()> {
    let queue = deps.ctx.db.queue();

    // Another worker already holds this thread.
    if queue.get_processing_item(thread_id).is_some() {
        tracing::debug!(thread_id, "thread already has a processing event; yielding");
        return Ok(());
    }

    loop {
        // Cancellation means no further dequeues; in-flight work has
        // already run to whatever point its own checks allowed.
        if deps.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(event) = queue.get_next_pending(thread_id)? else {
            tracing::debug!(thread_id, "thread drained");
            return Ok(());
        };
        queue.update_status(&event.id, EventStatus::Processing)?;
        tracing::debug!(
            thread_id,
            event_id = %event.id,
            event_type = %event.event_type,
            "processing event"
        );

        match processors::dispatch(deps, &event).await {
            Ok(Dispatched::Done(produced)) => {
                for spec in produced {
                    queue.add_to_queue(thread_id, spec)?;
                }
                let completed = queue.update_status(&event.id, EventStatus::Completed)?;
                deps.emitter.emit(completed).await;
            }
            Ok(Dispatched::Overwritten(produced)) => {
                queue.mark_overwritten(&event.id)?;
                for spec in produced {
                    queue.add_to_queue(thread_id, spec)?;
                }
            }
            Err(e) => {
                tracing::warn!(
                    thread_id,
                    event_id = %event.id,
                    error = %e,
                    "processor failed; stopping thread loop"
                );
                let mut failure = JsonMap::new();
                failure.insert(
                    "error".into(),
                    serde_json::json!({
                        "kind": e.kind(),
                        "message": e.to_string(),
                    }),
                );
                // Best effort: the status transition is what matters.
                let _ = queue.merge_metadata(&event.id, failure);
                let failed = queue.update_status(&event.id, EventStatus::Failed)?;
                deps.emitter.emit(failed).await;
                return Err(e);
            }
        }
    }
}
