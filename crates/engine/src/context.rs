//! The run context: everything a run is given from outside.
//!
//! Agents and tools are read-only for the duration of a run; mutating the
//! catalog means starting a new run. The database handle comes either
//! from an injected instance or from the process-scoped handle cache.

use std::path::PathBuf;
use std::sync::Arc;

use cz_assets::AssetStore;
use cz_domain::agent::AgentConfig;
use cz_domain::error::Result;
use cz_providers::ProviderRegistry;
use cz_store::{Db, DbConfig};
use cz_tools::{ApiConfig, RemoteToolServer, Tool, ToolRegistry};

pub struct RunContext {
    pub agents: Vec<AgentConfig>,
    pub providers: ProviderRegistry,
    pub tools: ToolRegistry,
    pub db: Arc<Db>,
    pub asset_store: Option<Arc<dyn AssetStore>>,
    /// Root the filesystem tools are confined to.
    pub workspace_root: PathBuf,
}

impl RunContext {
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::default()
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}

#[derive(Default)]
pub struct RunContextBuilder {
    agents: Vec<AgentConfig>,
    tools: Vec<Tool>,
    apis: Vec<ApiConfig>,
    servers: Vec<Arc<dyn RemoteToolServer>>,
    providers: Option<ProviderRegistry>,
    db_config: Option<DbConfig>,
    db_instance: Option<Arc<Db>>,
    asset_store: Option<Arc<dyn AssetStore>>,
    workspace_root: Option<PathBuf>,
}

impl RunContextBuilder {
    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = AgentConfig>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn api(mut self, api: ApiConfig) -> Self {
        self.apis.push(api);
        self
    }

    pub fn remote_server(mut self, server: Arc<dyn RemoteToolServer>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn db_config(mut self, config: DbConfig) -> Self {
        self.db_config = Some(config);
        self
    }

    pub fn db_instance(mut self, db: Arc<Db>) -> Self {
        self.db_instance = Some(db);
        self
    }

    pub fn asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.asset_store = Some(store);
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Assemble the context: merge the tool registry (native catalog,
    /// user tools, OpenAPI lowerings, remote servers) and resolve the
    /// database handle. Async because remote servers advertise their
    /// tools over the wire.
    pub async fn build(self) -> Result<Arc<RunContext>> {
        let mut registry = ToolRegistry::with_native();
        for tool in self.tools {
            registry.add_user_tool(tool);
        }
        for api in &self.apis {
            let count = registry.add_api(api)?;
            tracing::debug!(api = %api.name, tools = count, "API registered");
        }
        for server in self.servers {
            registry.add_remote_server(server).await?;
        }

        let db = match self.db_instance {
            Some(db) => db,
            None => Db::open_cached(&self.db_config.unwrap_or_default())?,
        };

        Ok(Arc::new(RunContext {
            agents: self.agents,
            providers: self.providers.unwrap_or_default(),
            tools: registry,
            db,
            asset_store: self.asset_store,
            workspace_root: self.workspace_root.unwrap_or_else(|| PathBuf::from(".")),
        }))
    }
}
