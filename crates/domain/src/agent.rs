//! Agent configuration — the in-memory catalog the engine works from
//! during a run. Agents are configuration, not stored state.

use serde::{Deserialize, Serialize};

/// Known provider families. Everything here speaks the OpenAI-compatible
/// chat completions wire format; `Custom` points at a caller-registered
/// adapter in the provider registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Groq,
    Deepseek,
    Ollama,
    Openrouter,
    Custom(String),
}

impl ProviderKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Openrouter => "openrouter",
            ProviderKind::Custom(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Per-agent LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Cap on how many history messages the call builder gathers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_messages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Request a JSON-object response from the provider.
    #[serde(default)]
    pub json_response: bool,
    /// Endpoint override; defaults come from the provider registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl LlmConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            max_history_messages: None,
            reasoning_effort: None,
            json_response: false,
            base_url: None,
            api_key: None,
        }
    }
}

/// One agent in the run's catalog. `name` must be unique within the
/// running process; it doubles as the agent's participant name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool keys this agent may call. Empty means no tools.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Peer agent names this agent may address. Empty means unrestricted.
    #[serde(default)]
    pub allowed_agents: Vec<String>,
    pub llm: LlmConfig,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, llm: LlmConfig) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            role: "assistant".into(),
            personality: None,
            instructions: None,
            description: None,
            allowed_tools: Vec::new(),
            allowed_agents: Vec::new(),
            llm,
        }
    }

    pub fn may_use_tool(&self, key: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == key)
    }

    /// Whether this agent may address `peer`. An empty allowlist leaves
    /// targeting unrestricted.
    pub fn may_address(&self, peer: &str) -> bool {
        self.allowed_agents.is_empty() || self.allowed_agents.iter().any(|a| a == peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowed_agents_is_unrestricted() {
        let agent = AgentConfig::new("A1", LlmConfig::new(ProviderKind::Openai, "gpt-4o"));
        assert!(agent.may_address("anyone"));
    }

    #[test]
    fn allowed_agents_restricts_targeting() {
        let mut agent = AgentConfig::new("Asker", LlmConfig::new(ProviderKind::Openai, "gpt-4o"));
        agent.allowed_agents = vec!["Expert".into()];
        assert!(agent.may_address("Expert"));
        assert!(!agent.may_address("Stranger"));
    }

    #[test]
    fn tools_require_explicit_allowlisting() {
        let agent = AgentConfig::new("A1", LlmConfig::new(ProviderKind::Openai, "gpt-4o"));
        assert!(!agent.may_use_tool("get_current_time"));
    }
}
