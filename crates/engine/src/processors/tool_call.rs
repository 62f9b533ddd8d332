//! `TOOL_CALL` — execute one tool call and produce the tool-result
//! `NEW_MESSAGE`.
//!
//! Control tools (`ask_question`, `create_thread`, `create_task`,
//! `end_thread`, `verbal_pause`) are dispatched here directly because
//! they act on the queue and thread stores; everything else resolves
//! through the registry. Tool-side failures are soft: they become
//! diagnostic result messages the agent can reason about next turn.

use serde_json::{json, Value};

use cz_assets::resolver::CreatedAsset;
use cz_domain::error::Result;
use cz_domain::event::{
    AssetCreatedPayload, Event, EventSpec, EventType, NewMessagePayload, ToolCallPayload,
};
use cz_domain::message::{MessageContent, Sender, SenderType};
use cz_domain::thread::{Thread, ThreadMode, ThreadSpec};
use cz_domain::JsonMap;
use cz_tools::native::is_control_tool;
use cz_tools::ToolContext;

use crate::emitter::RunEmitter;
use crate::worker::{self, WorkerDeps};

pub(crate) async fn process(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
) -> Result<Vec<EventSpec>> {
    let payload: ToolCallPayload = event.payload_as()?;
    let name = payload.call.function.name.clone();
    let call_id = payload
        .call
        .id
        .clone()
        .unwrap_or_else(|| format!("{name}_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));

    // Malformed argument strings are a soft failure, like schema misses.
    let args = match payload.call.parsed_arguments() {
        Ok(args) => args,
        Err(e) => {
            let output = json!({
                "error": "VALIDATION_ERROR",
                "message": e.to_string(),
                "tool": name,
            });
            return result_message(event, &payload, &name, &call_id, Value::Null, output, false);
        }
    };

    // ── Control tools ─────────────────────────────────────────────
    if is_control_tool(&name) {
        return dispatch_control(deps, thread, event, &payload, &name, &call_id, args).await;
    }

    // ── Registry resolution ───────────────────────────────────────
    let Some(tool) = deps.ctx.tools.resolve(&name) else {
        let output = deps.ctx.tools.not_found_diagnostic(&name);
        return result_message(event, &payload, &name, &call_id, args, output, false);
    };

    if let Some(schema) = &tool.config.input_schema {
        if let Err(issues) = cz_tools::validate::validate_input(schema, &args) {
            let output = json!({
                "error": "VALIDATION_ERROR",
                "message": format!("arguments for '{name}' do not match its input schema"),
                "issues": issues,
                "tool": name,
            });
            return result_message(event, &payload, &name, &call_id, args, output, false);
        }
    }

    let tool_ctx = ToolContext {
        db: deps.ctx.db.clone(),
        asset_store: deps.ctx.asset_store.clone(),
        thread_id: thread.id.clone(),
        agent_name: payload.agent_name.clone(),
        trace_id: event.trace_id.clone(),
        workspace_root: deps.ctx.workspace_root.clone(),
    };

    tracing::debug!(tool = %name, agent = %payload.agent_name, "executing tool");
    match tool.execute(args.clone(), &tool_ctx).await {
        Ok(output) => {
            let (output, created) =
                cz_assets::normalize_tool_output(output, deps.ctx.asset_store.as_ref()).await?;
            emit_created_assets(deps, thread, &created, &payload.agent_name, &name, &call_id).await;
            result_message(event, &payload, &name, &call_id, args, output, true)
        }
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "tool execution failed");
            let output = json!({
                "error": "EXECUTION_ERROR",
                "message": e.to_string(),
                "tool": name,
            });
            result_message(event, &payload, &name, &call_id, args, output, false)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn dispatch_control(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
    payload: &ToolCallPayload,
    name: &str,
    call_id: &str,
    args: Value,
) -> Result<Vec<EventSpec>> {
    match name {
        "verbal_pause" => {
            // Minimal success; the turn pauses to the next incoming
            // message, so the result suppresses the follow-up LLM call.
            let output = json!({"status": "paused"});
            let mut specs =
                result_message(event, payload, name, call_id, args, output, true)?;
            for spec in &mut specs {
                spec.metadata
                    .insert("suppressFollowUp".into(), Value::Bool(true));
                if let Some(meta) = spec.payload.get_mut("metadata") {
                    meta["suppressFollowUp"] = Value::Bool(true);
                }
            }
            Ok(specs)
        }

        "end_thread" => {
            let summary = args
                .get("summary")
                .and_then(Value::as_str)
                .map(str::to_owned);
            deps.ctx.db.threads().archive(&thread.id, summary)?;
            // The conversation is over: no result message, no follow-up.
            Ok(Vec::new())
        }

        "create_thread" => {
            let spec = ThreadSpec {
                name: args.get("name").and_then(Value::as_str).map(str::to_owned),
                description: args
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                participants: Some(child_participants(&args, &payload.agent_name)),
                parent_id: Some(thread.id.clone()),
                ..Default::default()
            };
            let (child, _) = deps.ctx.db.threads().upsert(&spec, "child thread")?;
            let output = json!({"threadId": child.id, "name": child.name});
            result_message(event, payload, name, call_id, args, output, true)
        }

        "create_task" => {
            let task = args.get("task").and_then(Value::as_str).unwrap_or_default();
            if task.is_empty() {
                let output = json!({
                    "error": "VALIDATION_ERROR",
                    "message": "create_task requires a non-empty 'task'",
                    "tool": name,
                });
                return result_message(event, payload, name, call_id, args, output, false);
            }
            let spec = ThreadSpec {
                name: args.get("name").and_then(Value::as_str).map(str::to_owned),
                participants: Some(vec![payload.agent_name.clone()]),
                mode: Some(ThreadMode::Background),
                parent_id: Some(thread.id.clone()),
                ..Default::default()
            };
            let (child, _) = deps.ctx.db.threads().upsert(&spec, "task")?;
            let seed = NewMessagePayload {
                content: Some(MessageContent::Text(task.to_owned())),
                sender: Sender::agent(&payload.agent_name),
                thread: None,
                tool_calls: None,
                metadata: None,
            };
            deps.ctx
                .db
                .queue()
                .add_to_queue(&child.id, EventSpec::new_message(&seed)?)?;

            // Background threads advance detached from this run.
            let detached = WorkerDeps {
                ctx: deps.ctx.clone(),
                emitter: RunEmitter::null(),
                cancel: Default::default(),
                hook: None,
                emit_tokens: false,
            };
            let child_id = child.id.clone();
            tokio::spawn(async move {
                if let Err(e) = worker::run_thread(&detached, &child_id).await {
                    tracing::warn!(thread_id = %child_id, error = %e, "background task thread failed");
                }
            });

            let output = json!({"threadId": child.id, "status": "scheduled"});
            result_message(event, payload, name, call_id, args, output, true)
        }

        "ask_question" => {
            ask_question(deps, thread, event, payload, call_id, args).await
        }

        _ => unreachable!("unknown control tool {name}"),
    }
}

/// Create a child thread with the asking and target agents, drive it to
/// quiescence, and return the target's first reply as the tool output.
async fn ask_question(
    deps: &WorkerDeps,
    thread: &Thread,
    event: &Event,
    payload: &ToolCallPayload,
    call_id: &str,
    args: Value,
) -> Result<Vec<EventSpec>> {
    let target = args
        .get("target")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let question = args
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let asker = deps.ctx.agent(&payload.agent_name);
    let addressable = asker.map_or(true, |a| a.may_address(&target));
    if question.is_empty() || deps.ctx.agent(&target).is_none() || !addressable {
        let output = json!({
            "error": "VALIDATION_ERROR",
            "message": format!(
                "ask_question needs a non-empty question and an addressable target agent (got '{target}')"
            ),
            "tool": "ask_question",
        });
        return result_message(event, payload, "ask_question", call_id, args, output, false);
    }

    let spec = ThreadSpec {
        name: Some(format!("{} asks {}", payload.agent_name, target)),
        participants: Some(vec![payload.agent_name.clone(), target.clone()]),
        parent_id: Some(thread.id.clone()),
        ..Default::default()
    };
    let (child, _) = deps.ctx.db.threads().upsert(&spec, "question")?;

    // The @mention selects the target as responder in the child thread.
    let seed = NewMessagePayload {
        content: Some(MessageContent::Text(format!("@{target} {question}"))),
        sender: Sender::agent(&payload.agent_name),
        thread: None,
        tool_calls: None,
        metadata: None,
    };
    deps.ctx
        .db
        .queue()
        .add_to_queue(&child.id, EventSpec::new_message(&seed)?)?;

    worker::run_thread(deps, &child.id).await?;

    let answer = deps
        .ctx
        .db
        .messages()
        .list_for_thread(&child.id)
        .into_iter()
        .find(|m| m.sender_type == SenderType::Agent && m.sender_id == target)
        .and_then(|m| m.content);

    let output = match answer {
        Some(answer) => json!({"answer": answer, "askedAgent": target, "threadId": child.id}),
        None => json!({
            "error": "EXECUTION_ERROR",
            "message": format!("'{target}' did not answer"),
            "tool": "ask_question",
            "threadId": child.id,
        }),
    };
    let ok = output.get("error").is_none();
    result_message(event, payload, "ask_question", call_id, args, output, ok)
}

fn child_participants(args: &Value, agent_name: &str) -> Vec<String> {
    let mut participants: Vec<String> = args
        .get("participants")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    if !participants.iter().any(|p| p == agent_name) {
        participants.insert(0, agent_name.to_owned());
    }
    participants
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the tool-result `NEW_MESSAGE` spec. The result hands the turn
/// back to the calling agent via `metadata.agentName`.
#[allow(clippy::too_many_arguments)]
fn result_message(
    event: &Event,
    payload: &ToolCallPayload,
    name: &str,
    call_id: &str,
    args: Value,
    output: Value,
    succeeded: bool,
) -> Result<Vec<EventSpec>> {
    let content = serde_json::to_string(&output)?;

    let mut metadata = JsonMap::new();
    metadata.insert("toolCallId".into(), Value::String(call_id.to_owned()));
    metadata.insert(
        "agentName".into(),
        Value::String(payload.agent_name.clone()),
    );
    metadata.insert(
        "toolCalls".into(),
        json!([{
            "id": call_id,
            "name": name,
            "args": args,
            "output": output,
            "status": if succeeded { "completed" } else { "failed" },
        }]),
    );

    let message = NewMessagePayload {
        content: Some(MessageContent::Text(content)),
        sender: Sender::tool(name),
        thread: None,
        tool_calls: None,
        metadata: Some(metadata),
    };

    let mut spec = EventSpec::new_message(&message)?;
    spec.parent_event_id = Some(event.id.clone());
    spec.trace_id = event.trace_id.clone();
    Ok(vec![spec])
}

async fn emit_created_assets(
    deps: &WorkerDeps,
    thread: &Thread,
    created: &[CreatedAsset],
    agent_name: &str,
    tool: &str,
    call_id: &str,
) {
    for asset in created {
        let payload = AssetCreatedPayload {
            asset_id: asset.asset.id.clone(),
            ref_uri: asset.ref_uri.clone(),
            mime: Some(asset.asset.mime_type.clone()),
            by: agent_name.to_owned(),
            tool: Some(tool.to_owned()),
            tool_call_id: Some(call_id.to_owned()),
        };
        if let Ok(payload) = serde_json::to_value(&payload) {
            deps.emitter
                .emit_transient(&thread.id, EventType::AssetCreated, payload, None, None)
                .await;
        }
    }
}
