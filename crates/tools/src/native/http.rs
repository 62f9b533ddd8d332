//! Outbound HTTP natives: `http_request` (full request/response) and
//! `fetch_text` (readable text extraction).
//!
//! Binary response bodies are returned as `{mimeType, dataBase64}` so the
//! tool-call processor's output normalization moves them into the asset
//! store.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TEXT_CHARS: usize = 100_000;

pub fn http_request_tool() -> Tool {
    let config = ToolConfig::new(
        "http_request",
        "Make an HTTP request and return status, headers, and body.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "url": {"type": "string", "description": "Request URL"},
            "method": {"type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"]},
            "headers": {"type": "object", "additionalProperties": {"type": "string"}},
            "body": {"description": "Request body: a string, or an object sent as JSON"},
            "timeoutSec": {"type": "integer", "minimum": 1, "maximum": 120}
        },
        "required": ["url"]
    }));
    Tool::new(config, ToolSource::Native, Arc::new(HttpRequest))
}

pub fn fetch_text_tool() -> Tool {
    let config = ToolConfig::new(
        "fetch_text",
        "Fetch a URL and return its readable text (HTML is converted to plain text).",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "url": {"type": "string", "description": "URL to fetch"},
            "maxChars": {"type": "integer", "minimum": 1}
        },
        "required": ["url"]
    }));
    Tool::new(config, ToolSource::Native, Arc::new(FetchText))
}

fn client(timeout_sec: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_sec))
        .build()
        .map_err(|e| Error::Execution(e.to_string()))
}

fn is_texty(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("javascript")
        || content_type.contains("x-www-form-urlencoded")
}

struct HttpRequest;

#[async_trait::async_trait]
impl ToolExecutor for HttpRequest {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("missing required argument 'url'".into()))?;
        let method = args
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let timeout_sec = args
            .get("timeoutSec")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut request = client(timeout_sec)?
            .request(
                method
                    .parse()
                    .map_err(|_| Error::Execution(format!("unsupported method '{method}'")))?,
                url,
            );
        if let Some(headers) = args.get("headers").and_then(Value::as_object) {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    request = request.header(k, v);
                }
            }
        }
        match args.get("body") {
            Some(Value::String(s)) => request = request.body(s.clone()),
            Some(body @ (Value::Object(_) | Value::Array(_))) => request = request.json(body),
            _ => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Execution(format!("{method} {url}: {e}")))?;

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), Value::String(v.to_owned()));
            }
        }
        let content_type = headers
            .get("content-type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .split(';')
            .next()
            .unwrap_or_default()
            .to_owned();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Execution(format!("reading response body: {e}")))?;

        let body = if is_texty(&content_type) {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            json!({"mimeType": content_type, "dataBase64": BASE64.encode(&bytes)})
        };

        Ok(json!({
            "status": status,
            "headers": headers,
            "body": body,
        }))
    }
}

struct FetchText;

#[async_trait::async_trait]
impl ToolExecutor for FetchText {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("missing required argument 'url'".into()))?;
        let max_chars = args
            .get("maxChars")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(MAX_TEXT_CHARS);

        let response = client(DEFAULT_TIMEOUT_SECS)?
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Execution(format!("GET {url}: {e}")))?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Execution(format!("reading response body: {e}")))?;

        let text = if content_type.contains("html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        let text = truncate_chars(&text, max_chars);

        Ok(json!({"url": url, "text": text}))
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...[truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texty_content_types() {
        assert!(is_texty("text/html"));
        assert!(is_texty("application/json"));
        assert!(!is_texty("image/png"));
        assert!(!is_texty("application/octet-stream"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        let out = truncate_chars(s, 4);
        assert!(out.starts_with("héll"));
        assert!(out.ends_with("[truncated]"));
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
