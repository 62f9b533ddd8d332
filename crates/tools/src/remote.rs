//! Remote tool-protocol servers.
//!
//! Transports (stdio, websocket, HTTP) live outside the core; the engine
//! only needs a server's advertised tool list and a call capability.
//! Registered tools are keyed `<server-name>_<tool-name>`.

use std::sync::Arc;

use serde_json::Value;

use cz_domain::error::Result;
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

#[async_trait::async_trait]
pub trait RemoteToolServer: Send + Sync {
    fn name(&self) -> &str;

    /// The tools this server advertises.
    async fn list_tools(&self) -> Result<Vec<ToolConfig>>;

    /// Invoke one tool by its server-local name.
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value>;
}

struct RemoteExecutor {
    server: Arc<dyn RemoteToolServer>,
    /// Server-local tool name (without the `<server>_` prefix).
    tool_name: String,
}

#[async_trait::async_trait]
impl ToolExecutor for RemoteExecutor {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        self.server.call_tool(&self.tool_name, args).await
    }
}

/// Wrap a server's advertised tools as registry entries.
pub async fn tools_from_server(server: Arc<dyn RemoteToolServer>) -> Result<Vec<Tool>> {
    let server_name = server.name().to_owned();
    let configs = server.list_tools().await?;

    let tools = configs
        .into_iter()
        .map(|mut config| {
            let local_name = config.key.clone();
            config.key = format!("{server_name}_{local_name}");
            Tool::new(
                config,
                ToolSource::Remote {
                    server: server_name.clone(),
                },
                Arc::new(RemoteExecutor {
                    server: server.clone(),
                    tool_name: local_name,
                }),
            )
        })
        .collect();

    tracing::debug!(server = %server_name, "remote tool server registered");
    Ok(tools)
}
