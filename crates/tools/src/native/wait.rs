use std::sync::Arc;

use serde_json::{json, Value};

use cz_domain::error::Result;
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

/// Hard cap so a runaway argument cannot stall a thread for minutes.
const MAX_WAIT_MS: u64 = 60_000;

pub fn tool() -> Tool {
    let config = ToolConfig::new("wait", "Pause for a number of milliseconds (max 60000).")
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "ms": {"type": "integer", "minimum": 0, "description": "Milliseconds to wait"}
            },
            "required": ["ms"]
        }));
    Tool::new(config, ToolSource::Native, Arc::new(Wait))
}

struct Wait;

#[async_trait::async_trait]
impl ToolExecutor for Wait {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let ms = args
            .get("ms")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .min(MAX_WAIT_MS);
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(json!({"waitedMs": ms}))
    }
}
