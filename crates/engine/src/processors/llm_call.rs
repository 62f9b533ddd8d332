//! `LLM_CALL` — stream one provider request and turn the response into
//! exactly one `NEW_MESSAGE`.
//!
//! Visible chunks (with `<tool_calls>` blocks elided) are emitted as
//! `TOKEN` events while the raw response accumulates for parsing. The
//! `TOKEN` stream for one call is strictly ordered and prefix-monotone.

use futures_util::StreamExt;
use serde_json::Value;

use cz_domain::error::{Error, Result};
use cz_domain::event::{Event, EventSpec, EventType, LlmCallPayload, NewMessagePayload, TokenPayload};
use cz_domain::message::{MessageContent, Sender};
use cz_domain::thread::Thread;
use cz_domain::JsonMap;
use cz_providers::ChatRequest;

use crate::token_filter::{parse_response, ToolCallFilter};
use crate::worker::WorkerDeps;

pub(crate) async fn process(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
) -> Result<Vec<EventSpec>> {
    let payload: LlmCallPayload = event.payload_as()?;

    let provider = deps.ctx.providers.resolve(&payload.config)?;
    let request = ChatRequest::from_config(payload.messages.clone(), &payload.config);

    // Record provider/model on the event so a failure carries them.
    let mut provenance = JsonMap::new();
    provenance.insert(
        "provider".into(),
        Value::String(payload.config.provider.as_str().to_owned()),
    );
    provenance.insert("model".into(), Value::String(payload.config.model.clone()));
    deps.ctx.db.queue().merge_metadata(&event.id, provenance)?;

    let mut stream = provider.stream_chat(&request).await?;

    let mut filter = ToolCallFilter::new();
    let mut raw = String::new();

    while let Some(chunk) = stream.next().await {
        if deps.cancel.is_cancelled() {
            // Dropping the stream aborts the underlying request.
            drop(stream);
            return Err(Error::Cancelled);
        }
        let chunk = chunk?;
        raw.push_str(&chunk);
        let visible = filter.feed(&chunk);
        if !visible.is_empty() {
            emit_token(deps, thread, event, &payload.agent_name, visible, false).await;
        }
    }

    let tail = filter.finish();
    if !tail.is_empty() {
        emit_token(deps, thread, event, &payload.agent_name, tail, false).await;
    }
    emit_token(deps, thread, event, &payload.agent_name, String::new(), true).await;

    // ── Parse the accumulated response ────────────────────────────
    let parsed = parse_response(&raw);
    let mut content = parsed.visible.trim().to_owned();
    if content.is_empty() && parsed.parse_error.is_some() {
        // Keep the message materializable so the agent sees the feedback.
        content = "(tool call block was malformed and has been discarded)".to_owned();
    }

    let mut metadata = JsonMap::new();
    if let Some(parse_error) = &parsed.parse_error {
        tracing::warn!(
            agent = %payload.agent_name,
            error = %parse_error,
            "malformed tool call block in LLM response"
        );
        metadata.insert("parseError".into(), Value::String(parse_error.clone()));
    }

    if content.is_empty() && parsed.tool_calls.is_empty() && metadata.is_empty() {
        tracing::debug!(agent = %payload.agent_name, "empty LLM response; nothing to materialize");
        return Ok(Vec::new());
    }

    let message = NewMessagePayload {
        content: Some(MessageContent::Text(content)),
        sender: Sender::agent(&payload.agent_name),
        thread: None,
        tool_calls: (!parsed.tool_calls.is_empty()).then_some(parsed.tool_calls),
        metadata: (!metadata.is_empty()).then_some(metadata),
    };

    let mut spec = EventSpec::new_message(&message)?;
    spec.parent_event_id = Some(event.id.clone());
    spec.trace_id = event.trace_id.clone();
    Ok(vec![spec])
}

async fn emit_token(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
    agent_name: &str,
    token: String,
    is_complete: bool,
) {
    if !deps.emit_tokens {
        return;
    }
    let payload = TokenPayload {
        thread_id: thread.id.clone(),
        agent_name: agent_name.to_owned(),
        token,
        is_complete,
    };
    if let Ok(payload) = serde_json::to_value(&payload) {
        deps.emitter
            .emit_transient(
                &thread.id,
                EventType::Token,
                payload,
                Some(event.id.clone()),
                event.trace_id.clone(),
            )
            .await;
    }
}
