use std::sync::Arc;

use serde_json::{json, Value};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

pub fn tool() -> Tool {
    let config = ToolConfig::new(
        "get_current_time",
        "Get the current date and time, optionally in a specific IANA timezone.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "timezone": {
                "type": "string",
                "description": "IANA timezone name, e.g. 'Europe/Paris'. Defaults to UTC."
            }
        }
    }));
    Tool::new(config, ToolSource::Native, Arc::new(GetCurrentTime))
}

struct GetCurrentTime;

#[async_trait::async_trait]
impl ToolExecutor for GetCurrentTime {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let now = chrono::Utc::now();
        let (iso, tz_name) = match args.get("timezone").and_then(Value::as_str) {
            Some(name) => {
                let tz: chrono_tz::Tz = name
                    .parse()
                    .map_err(|_| Error::Execution(format!("unknown timezone '{name}'")))?;
                (now.with_timezone(&tz).to_rfc3339(), name.to_owned())
            }
            None => (now.to_rfc3339(), "UTC".to_owned()),
        };
        Ok(json!({
            "iso": iso,
            "unixMs": now.timestamp_millis(),
            "timezone": tz_name,
        }))
    }
}
