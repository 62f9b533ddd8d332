//! `NEW_MESSAGE` — materialize one message and decide what happens next.
//!
//! Steps: normalize binary content into assets, persist the message,
//! choose the next responder (@mention, then the two-participant
//! fallback, then the agent-plain-text pause), and fan out to
//! `TOOL_CALL`s or one `LLM_CALL`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use cz_assets::resolver::CreatedAsset;
use cz_domain::error::{Error, Result};
use cz_domain::event::{
    AssetCreatedPayload, Event, EventSpec, EventType, NewMessagePayload, ToolCallPayload,
};
use cz_domain::message::{Message, SenderType};
use cz_domain::thread::Thread;
use cz_domain::JsonMap;

use crate::llm_builder;
use crate::worker::WorkerDeps;

pub(crate) async fn process(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
) -> Result<Vec<EventSpec>> {
    let payload: NewMessagePayload = event.payload_as()?;

    let has_content = payload.content.as_ref().is_some_and(|c| !c.is_empty());
    let has_calls = payload.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
    if !has_content && !has_calls {
        return Err(Error::InvalidInput(
            "message carries neither content nor tool calls".into(),
        ));
    }

    let sender_name = payload.sender.participant_name();
    let mut metadata = payload.metadata.clone().unwrap_or_default();

    // ── 1. Asset normalization ────────────────────────────────────
    let store = deps.ctx.asset_store.as_ref();
    let normalized = match &payload.content {
        Some(content) => cz_assets::normalize_content(content, store).await?,
        None => Default::default(),
    };
    emit_created_assets(deps, thread, &normalized.created, &sender_name, None, None).await;
    if !normalized.attachments.is_empty() {
        metadata.insert(
            "attachments".into(),
            serde_json::to_value(&normalized.attachments)?,
        );
    }

    // ── 2. Tool outputs (tool senders) ────────────────────────────
    if payload.sender.sender_type == SenderType::Tool {
        normalize_tool_call_outputs(deps, thread, &mut metadata, &sender_name).await?;
    }

    // ── 3. Persist ────────────────────────────────────────────────
    if matches!(
        payload.sender.sender_type,
        SenderType::User | SenderType::Agent
    ) {
        deps.ctx
            .db
            .threads()
            .add_participant(&thread.id, &sender_name)?;
    }

    let message = Message {
        id: uuid::Uuid::now_v7().to_string(),
        thread_id: thread.id.clone(),
        sender_id: sender_name.clone(),
        sender_type: payload.sender.sender_type,
        sender_user_id: match payload.sender.sender_type {
            SenderType::User => payload.sender.id.clone(),
            _ => None,
        },
        content: normalized.text.clone(),
        tool_calls: payload.tool_calls.clone().filter(|c| !c.is_empty()),
        tool_call_id: metadata
            .get("toolCallId")
            .and_then(Value::as_str)
            .map(str::to_owned),
        metadata: metadata.clone(),
        created_at: chrono::Utc::now(),
    };
    deps.ctx.db.messages().insert(message)?;

    // ── 4/5. Decide and fan out ───────────────────────────────────
    // Re-read the thread: a tool in this turn may have archived it.
    let thread = deps
        .ctx
        .db
        .threads()
        .get(&thread.id)
        .ok_or_else(|| Error::Storage(format!("thread {} vanished", thread.id)))?;
    if thread.is_archived() {
        return Ok(Vec::new());
    }

    if let Some(calls) = payload.tool_calls.as_ref().filter(|c| !c.is_empty()) {
        // One TOOL_CALL per descriptor, in order.
        let mut produced = Vec::with_capacity(calls.len());
        for call in calls {
            let tool_payload = ToolCallPayload {
                agent_name: sender_name.clone(),
                sender_id: sender_name.clone(),
                sender_type: SenderType::Agent,
                call: call.clone(),
            };
            produced.push(derived(event, EventSpec::tool_call(&tool_payload)?));
        }
        return Ok(produced);
    }

    let text = normalized.text.as_deref().unwrap_or("");
    let Some(responder) = decide_responder(deps, &thread, &payload, &sender_name, &metadata, text)
    else {
        return Ok(Vec::new());
    };
    let Some(agent) = deps.ctx.agent(&responder) else {
        return Ok(Vec::new());
    };

    let llm_payload = llm_builder::build_llm_call(&deps.ctx, &thread, agent).await?;
    Ok(vec![derived(event, EventSpec::llm_call(&llm_payload)?)])
}

/// Attach queue lineage to a produced spec.
fn derived(event: &Event, mut spec: EventSpec) -> EventSpec {
    spec.parent_event_id = Some(event.id.clone());
    spec.trace_id = event.trace_id.clone();
    spec
}

async fn emit_created_assets(
    deps: &WorkerDeps,
    thread: &Thread,
    created: &[CreatedAsset],
    by: &str,
    tool: Option<&str>,
    tool_call_id: Option<&str>,
) {
    for asset in created {
        let payload = AssetCreatedPayload {
            asset_id: asset.asset.id.clone(),
            ref_uri: asset.ref_uri.clone(),
            mime: Some(asset.asset.mime_type.clone()),
            by: by.to_owned(),
            tool: tool.map(str::to_owned),
            tool_call_id: tool_call_id.map(str::to_owned),
        };
        if let Ok(payload) = serde_json::to_value(&payload) {
            deps.emitter
                .emit_transient(&thread.id, EventType::AssetCreated, payload, None, None)
                .await;
        }
    }
}

/// Normalize `metadata.toolCalls[*].output` so binaries inside tool
/// results become asset refs.
async fn normalize_tool_call_outputs(
    deps: &WorkerDeps,
    thread: &Thread,
    metadata: &mut JsonMap,
    sender_name: &str,
) -> Result<()> {
    let store = deps.ctx.asset_store.as_ref();
    let Some(Value::Array(entries)) = metadata.get_mut("toolCalls") else {
        return Ok(());
    };

    for entry in entries {
        let tool = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let call_id = entry.get("id").and_then(Value::as_str).map(str::to_owned);
        let Some(output) = entry.get_mut("output") else {
            continue;
        };
        let (normalized, created) =
            cz_assets::normalize_tool_output(output.take(), store).await?;
        *output = normalized;
        emit_created_assets(
            deps,
            thread,
            &created,
            sender_name,
            tool.as_deref(),
            call_id.as_deref(),
        )
        .await;
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Responder decision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Mention {
    /// No participant was mentioned.
    None,
    /// A participant was mentioned but the sender may not address them.
    Blocked,
    Target(String),
}

fn decide_responder(
    deps: &WorkerDeps,
    thread: &Thread,
    payload: &NewMessagePayload,
    sender_name: &str,
    metadata: &JsonMap,
    text: &str,
) -> Option<String> {
    // Tool results hand the turn back to the agent that made the call.
    if payload.sender.sender_type == SenderType::Tool {
        if metadata
            .get("suppressFollowUp")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return None;
        }
        return metadata
            .get("agentName")
            .and_then(Value::as_str)
            .map(str::to_owned);
    }

    match find_mention(deps, thread, payload, sender_name, text) {
        Mention::Target(name) => return Some(name),
        Mention::Blocked => return None,
        Mention::None => {}
    }

    // Two-participant fallback: one human plus one agent.
    if thread.participants.len() == 2 && payload.sender.sender_type != SenderType::Agent {
        let other = thread
            .participants
            .iter()
            .find(|p| p.as_str() != sender_name)?;
        if deps.ctx.agent(other).is_some() {
            return Some(other.clone());
        }
        return None;
    }

    // Agent plain text without tool calls pauses the conversation;
    // anything else produces no follow-up either.
    None
}

fn find_mention(
    deps: &WorkerDeps,
    thread: &Thread,
    payload: &NewMessagePayload,
    sender_name: &str,
    text: &str,
) -> Mention {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    let regex = MENTION.get_or_init(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap());

    let sender_agent = (payload.sender.sender_type == SenderType::Agent)
        .then(|| deps.ctx.agent(sender_name))
        .flatten();

    for capture in regex.captures_iter(text) {
        let name = &capture[1];
        if name == sender_name || !thread.has_participant(name) {
            continue;
        }
        if let Some(agent) = sender_agent {
            if !agent.may_address(name) {
                return Mention::Blocked;
            }
        }
        return Mention::Target(name.to_owned());
    }
    Mention::None
}
