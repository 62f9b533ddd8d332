//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Groq, DeepSeek, Ollama, OpenRouter, and any other
//! endpoint following the chat completions contract.

use serde_json::Value;

use cz_domain::error::{Error, Result};
use cz_domain::stream::TokenStream;

use crate::sse::sse_token_stream;
use crate::traits::{ChatRequest, LlmProvider};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        let base_url: String = base_url.into();
        Ok(Self {
            id: id.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let mut body = serde_json::json!({
            "model": req.model,
            "messages": req.messages,
            "stream": true,
        });
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = req.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }

    fn provider_err(&self, message: impl Into<String>) -> Error {
        Error::Provider {
            provider: self.id.clone(),
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn stream_chat(&self, req: &ChatRequest) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.build_body(req));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        tracing::debug!(provider = %self.id, model = %req.model, "starting chat stream");

        let response = request
            .send()
            .await
            .map_err(|e| self.provider_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.provider_err(format!("HTTP {status}: {body}")));
        }

        Ok(sse_token_stream(response, parse_delta))
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Extract the text delta from one `data:` payload. Returns `None` on the
/// `[DONE]` sentinel; unparseable payloads are skipped.
fn parse_delta(payload: &str) -> Option<Vec<String>> {
    if payload == "[DONE]" {
        return None;
    }
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return Some(Vec::new()),
    };
    let delta = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    Some(delta.map(str::to_owned).into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_domain::chat::ChatMessage;

    #[test]
    fn parse_delta_extracts_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_delta(payload), Some(vec!["Hel".to_owned()]));
    }

    #[test]
    fn parse_delta_skips_empty_and_stops_on_done() {
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            Some(Vec::new())
        );
        assert_eq!(parse_delta("[DONE]"), None);
    }

    #[test]
    fn body_carries_sampling_knobs() {
        let provider =
            OpenAiCompatProvider::new("openai", "https://api.openai.com/v1/", None).unwrap();
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "gpt-4o".into(),
            temperature: Some(0.5),
            top_p: None,
            max_tokens: Some(256),
            json_mode: true,
        };
        let body = provider.build_body(&req);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], true);
    }
}
