//! Tools: named capabilities an agent can call from an LLM response.
//!
//! The core sees a uniform capability — `execute(args, ctx) → value` —
//! behind four sources merged into one registry: the native catalog,
//! user-provided tools, OpenAPI-derived operations, and remote
//! tool-protocol servers.

pub mod executor;
pub mod native;
pub mod openapi;
pub mod registry;
pub mod remote;
pub mod validate;

use std::sync::Arc;

use serde_json::Value;

use cz_domain::error::Result;
use cz_domain::tool::{ToolConfig, ToolDefinition};

pub use executor::{FnExecutor, ToolContext, ToolExecutor};
pub use openapi::ApiConfig;
pub use registry::ToolRegistry;
pub use remote::RemoteToolServer;

/// Where a tool came from; doubles as the resolution precedence
/// (native before user before OpenAPI before remote).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Native,
    User,
    OpenApi { api: String },
    Remote { server: String },
}

/// One registered tool: config plus executor capability.
#[derive(Clone)]
pub struct Tool {
    pub config: ToolConfig,
    pub source: ToolSource,
    executor: Arc<dyn ToolExecutor>,
}

impl Tool {
    pub fn new(config: ToolConfig, source: ToolSource, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            config,
            source,
            executor,
        }
    }

    /// A user-provided tool from a plain function.
    pub fn from_fn<F>(config: ToolConfig, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(config, ToolSource::User, Arc::new(FnExecutor::new(f)))
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn definition(&self) -> ToolDefinition {
        self.config.definition()
    }

    pub async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        self.executor.execute(args, ctx).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("key", &self.config.key)
            .field("source", &self.source)
            .finish()
    }
}
