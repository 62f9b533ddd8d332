//! `run_command` — run a shell command with a hard timeout.
//!
//! Output is captured from piped stdout/stderr by reader tasks so a
//! timed-out child can still be killed and its partial output returned.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_CHARS: usize = 200_000;

pub fn tool() -> Tool {
    let config = ToolConfig::new(
        "run_command",
        "Run a shell command and return its output and exit code.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "command": {"type": "string", "description": "Shell command to execute"},
            "workdir": {"type": "string", "description": "Working directory"},
            "timeoutSec": {"type": "integer", "minimum": 1, "maximum": MAX_TIMEOUT_SECS}
        },
        "required": ["command"]
    }));
    Tool::new(config, ToolSource::Native, Arc::new(RunCommand))
}

struct RunCommand;

#[async_trait::async_trait]
impl ToolExecutor for RunCommand {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("missing required argument 'command'".into()))?;
        let timeout_sec = args
            .get("timeoutSec")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(workdir) = args.get("workdir").and_then(Value::as_str) {
            cmd.current_dir(workdir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Execution(format!("spawning '{command}': {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(collect_lines(stdout));
        let stderr_task = tokio::spawn(collect_lines(stderr));

        let (exit_code, timed_out) =
            match tokio::time::timeout(Duration::from_secs(timeout_sec), child.wait()).await {
                Ok(status) => {
                    let status =
                        status.map_err(|e| Error::Execution(format!("waiting on child: {e}")))?;
                    (status.code(), false)
                }
                Err(_) => {
                    let _ = child.kill().await;
                    (None, true)
                }
            };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(json!({
            "exitCode": exit_code,
            "stdout": truncate(&stdout),
            "stderr": truncate(&stderr),
            "timedOut": timed_out,
        }))
    }
}

async fn collect_lines(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut out = String::new();
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        out.push_str(&line);
        out.push('\n');
        if out.len() > MAX_OUTPUT_CHARS {
            break;
        }
    }
    out
}

fn truncate(s: &str) -> &str {
    let mut end = s.len().min(MAX_OUTPUT_CHARS);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
