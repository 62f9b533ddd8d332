use cz_domain::agent::LlmConfig;
use cz_domain::chat::ChatMessage;
use cz_domain::error::Result;
use cz_domain::stream::TokenStream;

/// A provider-agnostic streaming chat request.
///
/// Tool calling rides the `<tool_calls>` text protocol inside the system
/// turn, so no native tool definitions travel on the request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When true, ask the provider for a JSON-object response.
    pub json_mode: bool,
}

impl ChatRequest {
    /// Build a request from an agent's LLM settings plus prepared turns.
    pub fn from_config(messages: Vec<ChatMessage>, config: &LlmConfig) -> Self {
        Self {
            messages,
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            json_mode: config.json_response,
        }
    }
}

/// Trait every LLM adapter implements.
///
/// `stream_chat` returns decoded text chunks; stream end means the
/// response is complete. Errors inside the stream abort the call.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream_chat(&self, req: &ChatRequest) -> Result<TokenStream>;

    /// A unique identifier for this provider instance.
    fn id(&self) -> &str;
}
