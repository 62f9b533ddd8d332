//! Builds `LLM_CALL` payloads from thread history.
//!
//! History is gathered across the thread and its ancestors (bounded
//! parent-pointer walk), filtered to threads where the agent participates,
//! ordered by creation time with ancestors winning ties, and truncated
//! oldest-first against both a message cap and a token budget. The system
//! turn carries the agent's instructions, its peer/tool allowlists, and
//! the fixed `<tool_calls>` protocol preamble.

use cz_domain::agent::AgentConfig;
use cz_domain::asset::parse_asset_uri;
use cz_domain::chat::{ChatContent, ChatMessage, ChatPart, ChatRole, ImageUrl, InputAudio};
use cz_domain::error::Result;
use cz_domain::event::LlmCallPayload;
use cz_domain::message::{Message, SenderType};
use cz_domain::thread::Thread;

use crate::context::RunContext;

/// How far up the ancestry chain history gathering will walk.
pub(crate) const MAX_ANCESTOR_DEPTH: usize = 8;

/// Message cap when the agent's config does not set one.
pub(crate) const DEFAULT_MAX_HISTORY: usize = 50;

/// Rough prompt budget the truncation pass enforces (system turn exempt).
pub(crate) const CONTEXT_TOKEN_BUDGET: usize = 24_000;

const TOOL_CALL_PREAMBLE: &str = "\
When you need to call a tool, emit exactly one block in this form:\n\
<tool_calls>\n\
{\"function\":{\"name\":\"<tool>\",\"arguments\":\"<json-encoded object>\"}}\n\
</tool_calls>\n\
One JSON object per line; `arguments` must be a JSON-encoded string. \
Text outside the block is shown to the conversation. \
To address a specific participant, start your message with @TheirName.";

/// Build the provider request payload for `agent` responding on `thread`.
pub(crate) async fn build_llm_call(
    ctx: &RunContext,
    thread: &Thread,
    agent: &AgentConfig,
) -> Result<LlmCallPayload> {
    let history = gather_history(ctx, thread, agent);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt(ctx, thread, agent)));
    for message in &history {
        if let Some(turn) = convert_message(ctx, agent, message).await {
            messages.push(turn);
        }
    }
    truncate_to_budget(&mut messages, CONTEXT_TOKEN_BUDGET);

    Ok(LlmCallPayload {
        agent_name: agent.name.clone(),
        agent_id: agent.id.clone(),
        messages,
        tools: ctx.tools.definitions(&agent.allowed_tools),
        config: agent.llm.clone(),
    })
}

/// Recent messages across the thread and its ancestors, oldest first.
fn gather_history(ctx: &RunContext, thread: &Thread, agent: &AgentConfig) -> Vec<Message> {
    let chain = ctx.db.threads().ancestry(&thread.id, MAX_ANCESTOR_DEPTH);

    // (message, ancestor depth); depth 0 is the thread itself.
    let mut entries: Vec<(Message, usize)> = Vec::new();
    for (depth, t) in chain.iter().enumerate() {
        if !t.has_participant(&agent.name) {
            continue;
        }
        for message in ctx.db.messages().list_for_thread(&t.id) {
            entries.push((message, depth));
        }
    }

    // Creation time, ties broken by ancestor depth — parents first.
    entries.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at).then(b.1.cmp(&a.1)));

    let max = agent
        .llm
        .max_history_messages
        .unwrap_or(DEFAULT_MAX_HISTORY);
    if entries.len() > max {
        entries.drain(..entries.len() - max);
    }

    entries.into_iter().map(|(m, _)| m).collect()
}

/// Drop oldest non-system turns until the estimate fits the budget.
fn truncate_to_budget(messages: &mut Vec<ChatMessage>, budget: usize) {
    let mut total: usize = messages.iter().map(ChatMessage::estimated_tokens).sum();
    while total > budget {
        let Some(oldest) = messages
            .iter()
            .position(|m| m.role != ChatRole::System)
        else {
            break;
        };
        total -= messages[oldest].estimated_tokens();
        messages.remove(oldest);
    }
}

fn system_prompt(ctx: &RunContext, thread: &Thread, agent: &AgentConfig) -> String {
    let mut sections = Vec::new();

    let mut identity = format!("You are {}, role: {}.", agent.name, agent.role);
    if let Some(personality) = &agent.personality {
        identity.push_str(&format!(" Personality: {personality}"));
    }
    sections.push(identity);

    if let Some(instructions) = &agent.instructions {
        sections.push(instructions.clone());
    }

    let peers: Vec<&String> = thread
        .participants
        .iter()
        .filter(|p| **p != agent.name && agent.may_address(p))
        .collect();
    if !peers.is_empty() {
        sections.push(format!(
            "Participants you may address: {}.",
            peers
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let tool_defs = ctx.tools.definitions(&agent.allowed_tools);
    if tool_defs.is_empty() {
        sections.push("You have no tools available.".into());
    } else {
        let rendered: Vec<String> = tool_defs
            .iter()
            .map(|d| {
                format!(
                    "- {}: {} (parameters: {})",
                    d.function.name, d.function.description, d.function.parameters
                )
            })
            .collect();
        sections.push(format!("Available tools:\n{}", rendered.join("\n")));
        sections.push(TOOL_CALL_PREAMBLE.into());
    }

    sections.join("\n\n")
}

/// Convert one persisted message to a chat turn from this agent's point
/// of view. Returns `None` for messages with nothing to say.
async fn convert_message(
    ctx: &RunContext,
    agent: &AgentConfig,
    message: &Message,
) -> Option<ChatMessage> {
    let mut text = message.content.clone().unwrap_or_default();
    // Malformed-call feedback travels with the turn so the agent can
    // correct itself.
    if let Some(parse_error) = message.metadata.get("parseError").and_then(|v| v.as_str()) {
        text.push_str(&format!("\n[tool call parse error: {parse_error}]"));
    }

    let (role, prefixed) = if message.sender_type == SenderType::Agent
        && message.sender_id == agent.name
    {
        (ChatRole::Assistant, text)
    } else if message.sender_type == SenderType::Tool {
        (ChatRole::User, format!("[Tool Result]: {text}"))
    } else {
        (ChatRole::User, format!("[{}]: {}", message.sender_id, text))
    };

    let attachments = message.attachments();
    if attachments.is_empty() {
        if prefixed.is_empty() {
            return None;
        }
        return Some(ChatMessage {
            role,
            content: ChatContent::Text(prefixed),
        });
    }

    let mut parts = Vec::new();
    if !prefixed.is_empty() {
        parts.push(ChatPart::Text { text: prefixed });
    }
    for attachment in attachments {
        let part = attachment_to_part(ctx, &attachment).await;
        match part {
            Some(p) => parts.push(p),
            None => tracing::warn!(
                kind = %attachment.kind,
                "attachment could not be inlined for the provider; skipped"
            ),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(ChatMessage {
        role,
        content: ChatContent::Parts(parts),
    })
}

/// Turn an attachment into a provider part, substituting `asset://` refs
/// with inline data: data URLs for images and files, bare base64 for
/// audio.
async fn attachment_to_part(
    ctx: &RunContext,
    attachment: &cz_domain::message::Attachment,
) -> Option<ChatPart> {
    let asset_id = attachment
        .asset_ref
        .as_deref()
        .and_then(parse_asset_uri);

    match attachment.kind.as_str() {
        "image" => {
            let url = match (asset_id, &attachment.data_url) {
                (Some(id), _) => {
                    let store = ctx.asset_store.as_ref()?;
                    cz_assets::resolver::inline_data_url(store, id).await.ok()?
                }
                (None, Some(url)) => url.clone(),
                (None, None) => return None,
            };
            Some(ChatPart::ImageUrl {
                image_url: ImageUrl { url },
            })
        }
        "audio" => {
            let (data, mime) = match (asset_id, &attachment.data_url) {
                (Some(id), _) => {
                    let store = ctx.asset_store.as_ref()?;
                    cz_assets::resolver::inline_base64(store, id).await.ok()?
                }
                (None, Some(url)) => {
                    let decoded = cz_assets::data_url::parse(url)?;
                    (
                        cz_assets::data_url::to_base64(&decoded.bytes),
                        decoded.mime_type,
                    )
                }
                (None, None) => return None,
            };
            let format = attachment
                .format
                .clone()
                .or_else(|| mime.split('/').nth(1).map(str::to_owned))
                .unwrap_or_else(|| "wav".into());
            Some(ChatPart::InputAudio {
                input_audio: InputAudio { data, format },
            })
        }
        // Files ride as data URLs in a text part; providers that accept
        // file inputs natively can unpack them in their adapter.
        _ => {
            let url = match (asset_id, &attachment.data_url) {
                (Some(id), _) => {
                    let store = ctx.asset_store.as_ref()?;
                    cz_assets::resolver::inline_data_url(store, id).await.ok()?
                }
                (None, Some(url)) => url.clone(),
                (None, None) => return None,
            };
            let label = attachment.file_name.as_deref().unwrap_or("attachment");
            Some(ChatPart::Text {
                text: format!("[{label}]: {url}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_domain::chat::ChatContent;

    fn turn(role: ChatRole, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: ChatContent::Text(text.into()),
        }
    }

    #[test]
    fn truncation_drops_oldest_but_keeps_system() {
        let mut messages = vec![
            turn(ChatRole::System, "system prompt"),
            turn(ChatRole::User, &"a".repeat(4000)),
            turn(ChatRole::Assistant, &"b".repeat(4000)),
            turn(ChatRole::User, "latest"),
        ];
        truncate_to_budget(&mut messages, 1100);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(matches!(
            &messages[1].content,
            ChatContent::Text(t) if t.starts_with('b')
        ));
    }

    #[test]
    fn truncation_never_removes_the_system_turn() {
        let mut messages = vec![turn(ChatRole::System, &"s".repeat(40_000))];
        truncate_to_budget(&mut messages, 10);
        assert_eq!(messages.len(), 1);
    }
}
