//! The merged tool registry.
//!
//! Resolution order for a call by name: native registry, user-provided
//! tools, OpenAPI-derived operations (keyed by `operationId`), remote
//! servers (keyed `<server>_<tool>`). Unresolved names get a diagnostic
//! with the available keys and the nearest matches.

use std::sync::Arc;

use serde_json::Value;

use cz_domain::error::Result;
use cz_domain::tool::ToolDefinition;

use crate::openapi::{self, ApiConfig};
use crate::remote::{self, RemoteToolServer};
use crate::{Tool, ToolSource};

/// Levenshtein cutoff for "did you mean" suggestions.
const NEAR_MATCH_DISTANCE: usize = 2;

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the native catalog.
    pub fn with_native() -> Self {
        let mut registry = Self::new();
        registry.tools.extend(crate::native::catalog());
        registry
    }

    /// Register additional native tools (custom keys joining the native
    /// precedence tier).
    pub fn add_native(&mut self, tool: Tool) {
        let insert_at = self.tier_end(|s| matches!(s, ToolSource::Native));
        self.tools.insert(insert_at, tool);
    }

    pub fn add_user_tool(&mut self, tool: Tool) {
        let insert_at = self.tier_end(|s| matches!(s, ToolSource::Native | ToolSource::User));
        self.tools.insert(insert_at, tool);
    }

    /// Lower an OpenAPI document into tools, one per operation id.
    pub fn add_api(&mut self, api: &ApiConfig) -> Result<usize> {
        let tools = openapi::tools_from_openapi(api)?;
        let count = tools.len();
        let insert_at = self.tier_end(|s| !matches!(s, ToolSource::Remote { .. }));
        for (i, tool) in tools.into_iter().enumerate() {
            self.tools.insert(insert_at + i, tool);
        }
        Ok(count)
    }

    /// Register every tool a remote server advertises.
    pub async fn add_remote_server(&mut self, server: Arc<dyn RemoteToolServer>) -> Result<usize> {
        let tools = remote::tools_from_server(server).await?;
        let count = tools.len();
        self.tools.extend(tools);
        Ok(count)
    }

    /// End index of the precedence tier(s) matched by `in_tier`.
    fn tier_end(&self, in_tier: impl Fn(&ToolSource) -> bool) -> usize {
        self.tools
            .iter()
            .rposition(|t| in_tier(&t.source))
            .map_or(0, |i| i + 1)
    }

    /// First tool matching `name` in precedence order.
    pub fn resolve(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.key() == name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.key().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// LLM-facing definitions for an agent's allowlisted keys, in
    /// registry order. Unknown keys are skipped.
    pub fn definitions(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| allowed.iter().any(|k| k == t.key()))
            .map(|t| t.definition())
            .collect()
    }

    /// Nearest matches for an unresolved name: Levenshtein distance ≤ 2,
    /// or substring containment either way.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let lowered = name.to_lowercase();
        self.tools
            .iter()
            .map(|t| t.key())
            .filter(|key| {
                let key_lower = key.to_lowercase();
                strsim::levenshtein(&key_lower, &lowered) <= NEAR_MATCH_DISTANCE
                    || key_lower.contains(&lowered)
                    || lowered.contains(&key_lower)
            })
            .map(str::to_owned)
            .collect()
    }

    /// The diagnostic body for a `TOOL_NOT_FOUND` result message.
    pub fn not_found_diagnostic(&self, name: &str) -> Value {
        serde_json::json!({
            "error": "TOOL_NOT_FOUND",
            "message": format!("no tool named '{name}' is registered"),
            "availableTools": self.keys(),
            "nearestMatches": self.suggestions(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_domain::tool::ToolConfig;
    use serde_json::json;

    fn user_tool(key: &str) -> Tool {
        Tool::from_fn(ToolConfig::new(key, "test tool"), |_| Ok(json!("ok")))
    }

    #[test]
    fn native_catalog_wins_over_user_tools() {
        let mut registry = ToolRegistry::with_native();
        registry.add_user_tool(user_tool("get_current_time"));
        let resolved = registry.resolve("get_current_time").unwrap();
        assert_eq!(resolved.source, ToolSource::Native);
    }

    #[test]
    fn user_tools_resolve_by_key() {
        let mut registry = ToolRegistry::with_native();
        registry.add_user_tool(user_tool("lookup_order"));
        assert!(registry.resolve("lookup_order").is_some());
        assert!(registry.resolve("missing_tool").is_none());
    }

    #[test]
    fn suggestions_cover_typos_and_substrings() {
        let registry = ToolRegistry::with_native();
        assert!(registry
            .suggestions("get_curent_time")
            .contains(&"get_current_time".to_owned()));
        assert!(registry
            .suggestions("fetch")
            .contains(&"fetch_text".to_owned()));
    }

    #[test]
    fn definitions_respect_allowlist_order_and_unknowns() {
        let registry = ToolRegistry::with_native();
        let defs = registry.definitions(&["wait".into(), "no_such".into()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "wait");
    }

    #[test]
    fn not_found_diagnostic_shape() {
        let registry = ToolRegistry::with_native();
        let diag = registry.not_found_diagnostic("get_curent_time");
        assert_eq!(diag["error"], "TOOL_NOT_FOUND");
        assert!(diag["availableTools"].as_array().unwrap().len() > 5);
        assert!(diag["nearestMatches"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "get_current_time"));
    }
}
