//! Event processors and the dispatch path.
//!
//! The worker hands every dequeued event here. The override hook (when
//! registered) sees it first and can substitute, replace, or drop it;
//! otherwise the default processor for the event type runs. Custom event
//! types complete as no-ops — they exist so callers can schedule their
//! own work through the same queue.

pub(crate) mod llm_call;
pub(crate) mod new_message;
pub(crate) mod tool_call;

use cz_domain::error::{Error, Result};
use cz_domain::event::{Event, EventSpec, EventType};
use cz_domain::thread::Thread;

use crate::hook::HookAction;
use crate::worker::WorkerDeps;

/// How an event left the dispatch path.
pub(crate) enum Dispatched {
    /// Default (or substituted) processing ran; enqueue what it produced.
    Done(Vec<EventSpec>),
    /// The hook preempted the event; mark it `overwritten` and enqueue
    /// the replacement events instead.
    Overwritten(Vec<EventSpec>),
}

pub(crate) async fn dispatch(deps: &WorkerDeps, event: &Event) -> Result<Dispatched> {
    let mut event = event.clone();
    let mut augment = Vec::new();

    if let Some(hook) = &deps.hook {
        if event.event_type != EventType::Token {
            match hook.on_event(&event).await {
                Ok(HookAction::Continue) => {}
                Ok(HookAction::Substitute(replacement)) => event = *replacement,
                Ok(HookAction::Replace(specs)) => return Ok(Dispatched::Overwritten(specs)),
                Ok(HookAction::Drop) => return Ok(Dispatched::Overwritten(Vec::new())),
                Ok(HookAction::Augment(specs)) => augment = specs,
                Err(e) => {
                    tracing::warn!(error = %e, event_id = %event.id, "event hook failed; running default path");
                }
            }
        }
    }

    // Every pending or processing event references an existing thread.
    let thread = deps
        .ctx
        .db
        .threads()
        .get(&event.thread_id)
        .ok_or_else(|| Error::Storage(format!("event {} references unknown thread {}", event.id, event.thread_id)))?;

    let mut produced = match &event.event_type {
        EventType::NewMessage => new_message::process(deps, &thread, &event).await?,
        EventType::LlmCall if should_process(&thread) => {
            llm_call::process(deps, &thread, &event).await?
        }
        EventType::ToolCall if should_process(&thread) => {
            tool_call::process(deps, &thread, &event).await?
        }
        EventType::LlmCall | EventType::ToolCall => {
            tracing::debug!(event_id = %event.id, "thread archived; event is a no-op");
            Vec::new()
        }
        // Stream-only types cannot be enqueued, but a hook may substitute
        // one in; nothing to do either way.
        EventType::Token | EventType::AssetCreated => Vec::new(),
        EventType::Custom(name) => {
            tracing::debug!(event_type = %name, event_id = %event.id, "no processor registered; completing as no-op");
            Vec::new()
        }
    };

    produced.extend(augment);
    Ok(Dispatched::Done(produced))
}

/// Archived threads accept no further LLM or tool work.
fn should_process(thread: &Thread) -> bool {
    !thread.is_archived()
}
