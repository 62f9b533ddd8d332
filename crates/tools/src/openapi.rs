//! OpenAPI document lowering.
//!
//! Each operation with an `operationId` becomes one tool: path and query
//! parameters plus the JSON request-body schema fold into a single input
//! schema, and the executor performs the HTTP call, substituting path
//! parameters and splitting the remaining arguments into query string or
//! body by the declared parameter locations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

/// One OpenAPI-backed API in the run context.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub name: String,
    /// Overrides the document's first `servers[].url` entry.
    pub base_url: Option<String>,
    /// The parsed OpenAPI document.
    pub spec: Value,
    /// Extra headers sent on every call (auth tokens and the like).
    pub headers: HashMap<String, String>,
}

const METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];

/// Lower an OpenAPI document into tools, one per operation id.
pub fn tools_from_openapi(api: &ApiConfig) -> Result<Vec<Tool>> {
    let base_url = api
        .base_url
        .clone()
        .or_else(|| {
            api.spec
                .pointer("/servers/0/url")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "API '{}' has no base URL (neither configured nor in servers[])",
                api.name
            ))
        })?;

    let Some(paths) = api.spec.get("paths").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut tools = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in METHODS {
            let Some(op) = item.get(*method).and_then(Value::as_object) else {
                continue;
            };
            let Some(operation_id) = op.get("operationId").and_then(Value::as_str) else {
                tracing::debug!(api = %api.name, path, method, "skipping operation without id");
                continue;
            };

            let (input_schema, params) = lower_operation_inputs(item, op);
            let description = op
                .get("summary")
                .or_else(|| op.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();

            let config = ToolConfig::new(operation_id, description).with_input_schema(input_schema);
            let executor = HttpOperationExecutor {
                method: method.to_uppercase(),
                url_template: format!("{}{}", base_url.trim_end_matches('/'), path),
                headers: api.headers.clone(),
                params,
                client: reqwest::Client::new(),
            };
            tools.push(Tool::new(
                config,
                ToolSource::OpenApi {
                    api: api.name.clone(),
                },
                Arc::new(executor),
            ));
        }
    }

    tracing::debug!(api = %api.name, tools = tools.len(), "OpenAPI document lowered");
    Ok(tools)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    location: ParamLocation,
}

/// Fold path/query parameters and the JSON request body into one input
/// schema, remembering where each named parameter goes on the wire.
fn lower_operation_inputs(
    path_item: &Map<String, Value>,
    op: &Map<String, Value>,
) -> (Value, Vec<ParamSpec>) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut params = Vec::new();

    let parameter_lists = [
        path_item.get("parameters").and_then(Value::as_array),
        op.get("parameters").and_then(Value::as_array),
    ];
    for param in parameter_lists.into_iter().flatten().flatten() {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = match param.get("in").and_then(Value::as_str) {
            Some("path") => ParamLocation::Path,
            Some("query") => ParamLocation::Query,
            // Header/cookie parameters are the caller's concern via
            // ApiConfig.headers.
            _ => continue,
        };
        let schema = param
            .get("schema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "string"}));
        if param.get("required").and_then(Value::as_bool).unwrap_or(false)
            || location == ParamLocation::Path
        {
            required.push(Value::String(name.to_owned()));
        }
        properties.insert(name.to_owned(), schema);
        params.push(ParamSpec {
            name: name.to_owned(),
            location,
        });
    }

    // JSON request body: merge its object properties at the top level.
    if let Some(body_schema) = op
        .get("requestBody")
        .and_then(|body| body.pointer("/content/application~1json/schema"))
    {
        if let Some(body_props) = body_schema.get("properties").and_then(Value::as_object) {
            for (k, v) in body_props {
                properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        if let Some(body_required) = body_schema.get("required").and_then(Value::as_array) {
            for name in body_required {
                if !required.contains(name) {
                    required.push(name.clone());
                }
            }
        }
    }

    let mut schema = serde_json::json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    (schema, params)
}

struct HttpOperationExecutor {
    method: String,
    url_template: String,
    headers: HashMap<String, String>,
    params: Vec<ParamSpec>,
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl ToolExecutor for HttpOperationExecutor {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let args_map = args.as_object().cloned().unwrap_or_default();

        let mut url = self.url_template.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut body = args_map.clone();

        for param in &self.params {
            let Some(value) = args_map.get(&param.name) else {
                continue;
            };
            body.remove(&param.name);
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match param.location {
                ParamLocation::Path => {
                    url = url.replace(&format!("{{{}}}", param.name), &rendered);
                }
                ParamLocation::Query => query.push((param.name.clone(), rendered)),
            }
        }

        let mut request = self
            .client
            .request(
                self.method.parse().map_err(|_| {
                    Error::Execution(format!("unsupported HTTP method {}", self.method))
                })?,
                &url,
            )
            .query(&query);
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }
        if !body.is_empty() && self.method != "GET" {
            request = request.json(&Value::Object(body));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Execution(format!("{} {url}: {e}", self.method)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Execution(format!("reading response body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Execution(format!(
                "{} {url} returned {status}: {text}",
                self.method
            )));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
