use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use cz_assets::AssetStore;
use cz_domain::error::Result;
use cz_store::Db;

/// What every executor receives alongside its arguments.
#[derive(Clone)]
pub struct ToolContext {
    pub db: Arc<Db>,
    pub asset_store: Option<Arc<dyn AssetStore>>,
    pub thread_id: String,
    pub agent_name: String,
    pub trace_id: Option<String>,
    /// Root the filesystem tools are confined to.
    pub workspace_root: PathBuf,
}

impl ToolContext {
    pub fn new(db: Arc<Db>, thread_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            db,
            asset_store: None,
            thread_id: thread_id.into(),
            agent_name: agent_name.into(),
            trace_id: None,
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn with_asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.asset_store = Some(store);
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }
}

/// The uniform tool capability. Retries, backoff, and per-call timeouts
/// are the executor's concern; the core does not retry.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Adapter for synchronous user functions.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        (self.f)(args)
    }
}
