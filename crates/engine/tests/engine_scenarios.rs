//! End-to-end scenarios: a scripted provider drives real runs through
//! the queue, the worker, and all three processors.

use std::sync::Arc;

use cz_assets::MemoryAssetStore;
use cz_domain::agent::{AgentConfig, LlmConfig, ProviderKind};
use cz_domain::error::Error;
use cz_domain::event::{EventSpec, EventStatus, EventType, NewMessagePayload, TokenPayload};
use cz_domain::message::{ContentPart, MessageContent, Sender, SenderType, ToolCallDescriptor};
use cz_domain::thread::ThreadSpec;
use cz_engine::{run, FnHook, HookAction, IncomingMessage, IncomingToolCall, RunContext, RunOptions, RunRequest};
use cz_providers::testing::ScriptedProvider;
use cz_providers::ProviderRegistry;
use serde_json::json;

const SCRIPTED: &str = "scripted";

fn agent(name: &str) -> AgentConfig {
    AgentConfig::new(
        name,
        LlmConfig::new(ProviderKind::Custom(SCRIPTED.into()), "scripted-model"),
    )
}

async fn context_with(
    agents: Vec<AgentConfig>,
    provider: Arc<ScriptedProvider>,
) -> Arc<RunContext> {
    let providers = ProviderRegistry::new();
    providers.register(SCRIPTED, provider);
    RunContext::builder()
        .agents(agents)
        .providers(providers)
        .asset_store(Arc::new(MemoryAssetStore::new()))
        .build()
        .await
        .unwrap()
}

fn user_message(text: &str) -> IncomingMessage {
    IncomingMessage {
        content: MessageContent::Text(text.into()),
        sender: Sender::user("user-1"),
        thread: None,
        tool_calls: Vec::new(),
        metadata: None,
    }
}

fn on_complete() -> RunOptions {
    RunOptions {
        ack_mode: cz_engine::AckMode::OnComplete,
        ..Default::default()
    }
}

/// Completed event types, stream-only kinds excluded.
fn completed_types(events: &[cz_domain::event::Event]) -> Vec<String> {
    events
        .iter()
        .filter(|e| !matches!(e.event_type, EventType::Token | EventType::AssetCreated))
        .map(|e| e.event_type.to_string())
        .collect()
}

fn token_text(events: &[cz_domain::event::Event]) -> String {
    events
        .iter()
        .filter(|e| e.event_type == EventType::Token)
        .filter_map(|e| e.payload_as::<TokenPayload>().ok())
        .map(|p| p.token)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: tool call, then answer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_then_answer() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    // Split mid-tag to exercise the streaming filter.
    provider.push_chunks(vec![
        "Let me check.<tool_",
        "calls>{\"function\":{\"name\":\"get_current_time\",\"arguments\":\"{}\"}}</tool_calls>",
    ]);
    provider.push_response("It is noon.");

    let mut a = agent("A");
    a.allowed_tools = vec!["get_current_time".into()];
    let ctx = context_with(vec![a], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("what time is it?"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    assert_eq!(
        completed_types(&events),
        vec![
            "NEW_MESSAGE",
            "LLM_CALL",
            "NEW_MESSAGE",
            "TOOL_CALL",
            "NEW_MESSAGE",
            "LLM_CALL",
            "NEW_MESSAGE",
        ]
    );
    assert!(events.iter().all(|e| e.status == EventStatus::Completed));

    // Visible token stream: both responses, blocks elided.
    assert_eq!(token_text(&events), "Let me check.It is noon.");

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].sender_id, "A");
    assert!(messages[1].has_tool_calls());
    assert_eq!(messages[2].sender_type, SenderType::Tool);
    assert!(messages[2].content.as_deref().unwrap().contains("unixMs"));
    assert_eq!(messages[3].content.as_deref(), Some("It is noon."));

    // The second request saw the tool result as a prefixed user turn.
    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);
    let rendered = serde_json::to_string(&requests[1].messages).unwrap();
    assert!(rendered.contains("[Tool Result]:"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: agent-to-agent via ask_question
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ask_question_bridges_two_agents() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response(concat!(
        "<tool_calls>{\"function\":{\"name\":\"ask_question\",",
        "\"arguments\":\"{\\\"target\\\":\\\"Expert\\\",\\\"question\\\":\\\"What is the capital of France?\\\"}\"}}</tool_calls>",
    ));
    provider.push_response("Paris.");
    provider.push_response("The capital of France is Paris.");

    let mut asker = agent("Asker");
    asker.allowed_tools = vec!["ask_question".into()];
    asker.allowed_agents = vec!["Expert".into()];
    let expert = agent("Expert");
    let ctx = context_with(vec![asker, expert], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                thread: Some(ThreadSpec {
                    participants: Some(vec!["user-1".into(), "Asker".into()]),
                    ..Default::default()
                }),
                ..user_message("use ask_question to ask Expert for the capital of France")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    // The child thread exists with exactly the two agents.
    let parent_messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    let tool_result = parent_messages
        .iter()
        .find(|m| m.sender_type == SenderType::Tool)
        .expect("ask_question result message");
    let output = tool_result.content.as_deref().unwrap();
    assert!(output.contains("Paris."), "tool output carries the answer: {output}");

    let child_id = tool_result
        .metadata
        .get("toolCalls")
        .and_then(|v| v.pointer("/0/output/threadId"))
        .and_then(|v| v.as_str())
        .expect("child thread id in tool output");
    let child = ctx.db.threads().get(child_id).unwrap();
    assert_eq!(child.participants, vec!["Asker", "Expert"]);
    assert_eq!(child.parent_id.as_deref(), Some(handle.thread_id.as_str()));

    // Asker's final turn includes the answer.
    let last = parent_messages.last().unwrap();
    assert_eq!(last.sender_id, "Asker");
    assert!(last.content.as_deref().unwrap().contains("Paris"));

    // Asker's second request carried the tool result.
    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 3);
    let rendered = serde_json::to_string(&requests[2].messages).unwrap();
    assert!(rendered.contains("Paris."));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios: responder selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn two_participant_fallback_needs_no_mention() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("Hello there!");
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    assert_eq!(provider.recorded_requests().len(), 1);
    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.last().unwrap().sender_id, "A1");
}

#[tokio::test]
async fn three_participants_without_mention_pause() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1"), agent("A2")], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    assert_eq!(completed_types(&events), vec!["NEW_MESSAGE"]);
    assert!(provider.recorded_requests().is_empty());
}

#[tokio::test]
async fn mention_selects_the_responder() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("A2 reporting in.");
    let ctx = context_with(vec![agent("A1"), agent("A2")], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi @A2, you take this one"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.last().unwrap().sender_id, "A2");
}

#[tokio::test]
async fn mention_outside_allowed_agents_resolves_to_no_responder() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    // A1 may only address A2, but mentions A3.
    provider.push_response("@A3 can you help?");
    let mut a1 = agent("A1");
    a1.allowed_agents = vec!["A2".into()];
    let ctx = context_with(vec![a1, agent("A2"), agent("A3")], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hello @A1"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    // A1 answered, but its blocked mention triggered nothing further.
    assert_eq!(provider.recorded_requests().len(), 1);
    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.last().unwrap().sender_id, "A1");
}

#[tokio::test]
async fn empty_participants_with_user_sender_pull_in_all_agents() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1"), agent("A2")], provider).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let thread = ctx.db.threads().get(&handle.thread_id).unwrap();
    assert_eq!(thread.participants, vec!["user-1", "A1", "A2"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: expired event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn expired_event_runs_no_processor() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![], provider).await;

    // Seed a thread and a doomed event directly.
    let (thread, _) = ctx
        .db
        .threads()
        .upsert(
            &ThreadSpec {
                participants: Some(vec!["user-1".into()]),
                ..Default::default()
            },
            "t",
        )
        .unwrap();
    let doomed = NewMessagePayload {
        content: Some(MessageContent::Text("too late".into())),
        sender: Sender::user("user-1"),
        thread: None,
        tool_calls: None,
        metadata: None,
    };
    let doomed = ctx
        .db
        .queue()
        .add_to_queue(
            &thread.id,
            EventSpec::new_message(&doomed).unwrap().with_ttl_ms(1),
        )
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // A later run on the same thread drives the worker past it.
    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                thread: Some(ThreadSpec {
                    id: Some(thread.id.clone()),
                    ..Default::default()
                }),
                ..user_message("fresh")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    assert_eq!(
        ctx.db.queue().get(&doomed.id).unwrap().status,
        EventStatus::Expired
    );
    let messages = ctx.db.messages().list_for_thread(&thread.id);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content.as_deref(), Some("fresh"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: override hook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn override_replaces_user_messages_with_verbal_pause() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    let hook = FnHook::new(|event: &cz_domain::event::Event| {
        if event.event_type != EventType::NewMessage {
            return Ok(HookAction::Continue);
        }
        let payload: NewMessagePayload = event.payload_as()?;
        if payload.sender.sender_type != SenderType::User {
            return Ok(HookAction::Continue);
        }
        let replacement = cz_domain::event::ToolCallPayload {
            agent_name: "A1".into(),
            sender_id: "A1".into(),
            sender_type: SenderType::Agent,
            call: ToolCallDescriptor::new("verbal_pause", "{}"),
        };
        Ok(HookAction::Replace(vec![EventSpec::tool_call(&replacement)?]))
    });

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: RunOptions {
                ack_mode: cz_engine::AckMode::OnComplete,
                on_event: Some(Arc::new(hook)),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    // The original NEW_MESSAGE ended overwritten.
    assert_eq!(
        ctx.db.queue().get(&handle.queue_id).unwrap().status,
        EventStatus::Overwritten
    );

    // verbal_pause ran and suppressed the follow-up: no LLM call ever.
    assert!(provider.recorded_requests().is_empty());
    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_type, SenderType::Tool);
    assert!(messages[0].content.as_deref().unwrap().contains("paused"));
}

#[tokio::test]
async fn override_drop_produces_nothing() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    let hook = FnHook::new(|_: &cz_domain::event::Event| Ok(HookAction::Drop));
    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: RunOptions {
                ack_mode: cz_engine::AckMode::OnComplete,
                on_event: Some(Arc::new(hook)),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    assert_eq!(
        ctx.db.queue().get(&handle.queue_id).unwrap().status,
        EventStatus::Overwritten
    );
    assert!(ctx.db.messages().list_for_thread(&handle.thread_id).is_empty());
    assert!(provider.recorded_requests().is_empty());
}

#[tokio::test]
async fn hook_errors_are_swallowed_and_default_runs() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("still here");
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    let hook = FnHook::new(|_: &cz_domain::event::Event| {
        Err(Error::Other("hook exploded".into()))
    });
    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: RunOptions {
                ack_mode: cz_engine::AckMode::OnComplete,
                on_event: Some(Arc::new(hook)),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    assert_eq!(provider.recorded_requests().len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fan-out, diagnostics, assets, errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_call_fanout_matches_list_order() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![], provider).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                tool_calls: vec![
                    IncomingToolCall {
                        id: Some("c1".into()),
                        name: "get_current_time".into(),
                        args: json!({}),
                    },
                    IncomingToolCall {
                        id: Some("c2".into()),
                        name: "wait".into(),
                        args: json!({"ms": 1}),
                    },
                ],
                ..user_message("run these")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    let tool_calls: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::ToolCall)
        .collect();
    assert_eq!(tool_calls.len(), 2);
    let first: cz_domain::event::ToolCallPayload = tool_calls[0].payload_as().unwrap();
    let second: cz_domain::event::ToolCallPayload = tool_calls[1].payload_as().unwrap();
    assert_eq!(first.call.function.name, "get_current_time");
    assert_eq!(second.call.function.name, "wait");
}

#[tokio::test]
async fn unknown_tool_yields_not_found_diagnostic() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![], provider).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                tool_calls: vec![IncomingToolCall {
                    id: None,
                    name: "get_curent_time".into(),
                    args: json!({}),
                }],
                ..user_message("typo time")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    let diag = messages.last().unwrap().content.as_deref().unwrap();
    assert!(diag.contains("TOOL_NOT_FOUND"));
    assert!(diag.contains("get_current_time"), "suggests the near match");
}

#[tokio::test]
async fn schema_violation_yields_validation_diagnostic() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![], provider).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                tool_calls: vec![IncomingToolCall {
                    id: None,
                    name: "wait".into(),
                    args: json!({"ms": "not-a-number"}),
                }],
                ..user_message("bad args")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    let diag = messages.last().unwrap().content.as_deref().unwrap();
    assert!(diag.contains("VALIDATION_ERROR"));
}

#[tokio::test]
async fn binary_content_becomes_an_asset_exactly_once() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![], provider).await;

    let image = cz_assets::data_url::to_base64(b"\x89PNG fake image bytes");
    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "see attached".into(),
                    },
                    ContentPart::Image {
                        data_base64: Some(image),
                        data_url: None,
                        asset_ref: None,
                        mime_type: Some("image/png".into()),
                    },
                ]),
                ..user_message("")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    let asset_events: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::AssetCreated)
        .collect();
    assert_eq!(asset_events.len(), 1);

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    let attachments = messages[0].attachments();
    assert_eq!(attachments.len(), 1);
    let ref_uri = attachments[0].asset_ref.as_deref().unwrap();
    assert!(ref_uri.starts_with("asset://"));
}

#[tokio::test]
async fn empty_request_is_rejected_before_enqueue() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1")], provider).await;

    let err = run(
        ctx,
        RunRequest::new(IncomingMessage {
            content: MessageContent::Text("   ".into()),
            sender: Sender::user("user-1"),
            thread: None,
            tool_calls: Vec::new(),
            metadata: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn malformed_tool_block_becomes_parse_error_metadata() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("On it.<tool_calls>{broken json</tool_calls>");
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("go"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    let agent_message = messages.last().unwrap();
    assert_eq!(agent_message.sender_id, "A1");
    assert_eq!(agent_message.content.as_deref(), Some("On it."));
    assert!(!agent_message.has_tool_calls());
    assert!(agent_message.metadata.contains_key("parseError"));
}

#[tokio::test]
async fn cancel_before_the_worker_starts_errors_with_cancelled() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("never delivered");
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    // Current-thread runtime: the spawned worker cannot run until we
    // await, so the cancel lands before its first dequeue.
    let mut handle = run(
        ctx,
        RunRequest {
            message: user_message("hi"),
            options: RunOptions::default(),
        },
    )
    .await
    .unwrap();
    handle.cancel();

    let err = handle.done().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(provider.recorded_requests().is_empty());
}

#[tokio::test]
async fn end_thread_archives_and_silences_the_thread() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response(concat!(
        "Wrapping up.<tool_calls>{\"function\":{\"name\":\"end_thread\",",
        "\"arguments\":\"{\\\"summary\\\":\\\"greeted the user\\\"}\"}}</tool_calls>",
    ));
    let mut a = agent("A1");
    a.allowed_tools = vec!["end_thread".into()];
    let ctx = context_with(vec![a], provider.clone()).await;

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("bye"),
            options: on_complete(),
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();

    let thread = ctx.db.threads().get(&handle.thread_id).unwrap();
    assert!(thread.is_archived());
    assert_eq!(thread.summary.as_deref(), Some("greeted the user"));

    // Only the initial exchange: no tool-result message, no second call.
    assert_eq!(provider.recorded_requests().len(), 1);
    let messages = ctx.db.messages().list_for_thread(&handle.thread_id);
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn stream_false_suppresses_token_events() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("quiet reply");
    let ctx = context_with(vec![agent("A1")], provider).await;

    let mut handle = run(
        ctx,
        RunRequest {
            message: user_message("hi"),
            options: RunOptions {
                stream: false,
                ack_mode: cz_engine::AckMode::OnComplete,
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    assert!(events.iter().all(|e| e.event_type != EventType::Token));
    assert_eq!(
        completed_types(&events),
        vec!["NEW_MESSAGE", "LLM_CALL", "NEW_MESSAGE"]
    );
}

#[tokio::test]
async fn hook_augment_runs_default_and_adds_events() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    provider.push_response("default reply");
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    // Augment the user's NEW_MESSAGE with an extra custom event.
    let hook = FnHook::new(|event: &cz_domain::event::Event| {
        if event.event_type != EventType::NewMessage {
            return Ok(HookAction::Continue);
        }
        let payload: NewMessagePayload = event.payload_as()?;
        if payload.sender.sender_type != SenderType::User {
            return Ok(HookAction::Continue);
        }
        Ok(HookAction::Augment(vec![EventSpec::new(
            EventType::Custom("AUDIT".into()),
            json!({"note": "user message observed"}),
        )]))
    });

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: user_message("hi"),
            options: RunOptions {
                ack_mode: cz_engine::AckMode::OnComplete,
                on_event: Some(Arc::new(hook)),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    handle.done().await.unwrap();
    let events = handle.collect_events().await;

    // Default path ran (the agent replied) and the custom event
    // completed as a no-op alongside it.
    assert_eq!(provider.recorded_requests().len(), 1);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::Custom("AUDIT".into())
            && e.status == EventStatus::Completed));
}

#[tokio::test]
async fn worker_yields_when_the_thread_is_already_held() {
    let provider = ScriptedProvider::shared(SCRIPTED);
    let ctx = context_with(vec![agent("A1")], provider.clone()).await;

    // Simulate another worker holding the thread.
    let (thread, _) = ctx
        .db
        .threads()
        .upsert(
            &ThreadSpec {
                participants: Some(vec!["user-1".into(), "A1".into()]),
                ..Default::default()
            },
            "held",
        )
        .unwrap();
    let held = NewMessagePayload {
        content: Some(MessageContent::Text("in flight".into())),
        sender: Sender::user("user-1"),
        thread: None,
        tool_calls: None,
        metadata: None,
    };
    let held = ctx
        .db
        .queue()
        .add_to_queue(&thread.id, EventSpec::new_message(&held).unwrap())
        .unwrap();
    ctx.db
        .queue()
        .update_status(&held.id, EventStatus::Processing)
        .unwrap();

    let mut handle = run(
        ctx.clone(),
        RunRequest {
            message: IncomingMessage {
                thread: Some(ThreadSpec {
                    id: Some(thread.id.clone()),
                    ..Default::default()
                }),
                ..user_message("queued behind")
            },
            options: on_complete(),
        },
    )
    .await
    .unwrap();

    // The second worker yields; its event stays pending for whoever
    // holds the thread.
    handle.done().await.unwrap();
    assert_eq!(
        ctx.db.queue().get(&handle.queue_id).unwrap().status,
        EventStatus::Pending
    );
    assert!(provider.recorded_requests().is_empty());
}
