//! The native tool catalog.
//!
//! Two tiers live here. Concrete natives (`get_current_time`, `wait`,
//! `http_request`, `fetch_text`, the filesystem tools, `run_command`)
//! execute in-process. Control tools (`ask_question`, `create_thread`,
//! `create_task`, `end_thread`, `verbal_pause`) are advertised from this
//! catalog but dispatched by the engine, which owns the queue and thread
//! stores they act on.

pub mod fs;
pub mod http;
pub mod shell;
pub mod time;
pub mod wait;

use std::sync::Arc;

use serde_json::{json, Value};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

/// Reserved tool names the engine intercepts before registry execution.
pub const CONTROL_TOOLS: &[&str] = &[
    "ask_question",
    "create_thread",
    "end_thread",
    "create_task",
    "verbal_pause",
];

pub fn is_control_tool(name: &str) -> bool {
    CONTROL_TOOLS.contains(&name)
}

/// The full native catalog, control tools first.
pub fn catalog() -> Vec<Tool> {
    let mut tools: Vec<Tool> = control_tool_configs()
        .into_iter()
        .map(|config| Tool::new(config, ToolSource::Native, Arc::new(ControlExecutor)))
        .collect();

    tools.push(time::tool());
    tools.push(wait::tool());
    tools.push(http::http_request_tool());
    tools.push(http::fetch_text_tool());
    tools.push(fs::read_file_tool());
    tools.push(fs::write_file_tool());
    tools.push(fs::list_directory_tool());
    tools.push(fs::search_files_tool());
    tools.push(shell::tool());
    tools
}

fn control_tool_configs() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new(
            "ask_question",
            "Ask another agent a question in a side conversation and wait for its answer.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "target": {"type": "string", "description": "Name of the agent to ask"},
                "question": {"type": "string", "description": "The question to ask"}
            },
            "required": ["target", "question"]
        })),
        ToolConfig::new(
            "create_thread",
            "Create a child conversation thread and return its id.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "participants": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name"]
        })),
        ToolConfig::new(
            "end_thread",
            "End the current conversation, archiving the thread with a summary.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "Summary of the conversation"}
            },
            "required": ["summary"]
        })),
        ToolConfig::new(
            "create_task",
            "Create a background task thread seeded with a task description.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "task": {"type": "string", "description": "What the task should accomplish"}
            },
            "required": ["task"]
        })),
        ToolConfig::new(
            "verbal_pause",
            "Say nothing and yield the turn until the next incoming message.",
        )
        .with_input_schema(json!({"type": "object", "properties": {}})),
    ]
}

/// Placeholder executor for control tools. The engine's tool-call
/// processor intercepts these names before the registry runs them.
struct ControlExecutor;

#[async_trait::async_trait]
impl ToolExecutor for ControlExecutor {
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value> {
        Err(Error::Execution(
            "control tools are dispatched by the engine, not the registry".into(),
        ))
    }
}
