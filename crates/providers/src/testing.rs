//! Scripted provider for tests and examples.
//!
//! Each call pops the next scripted response and streams it in the given
//! chunks; when the script runs dry, a fixed fallback is streamed. Every
//! request is recorded so tests can assert on prompts and history.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use cz_domain::error::Result;
use cz_domain::stream::TokenStream;

use crate::traits::{ChatRequest, LlmProvider};

pub struct ScriptedProvider {
    id: String,
    scripts: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one response, pre-split into stream chunks.
    pub fn push_chunks(&self, chunks: Vec<&str>) {
        self.scripts
            .lock()
            .push_back(chunks.into_iter().map(str::to_owned).collect());
    }

    /// Queue one response streamed as a single chunk.
    pub fn push_response(&self, text: &str) {
        self.push_chunks(vec![text]);
    }

    /// Requests seen so far, in call order.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn shared(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(id))
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream_chat(&self, req: &ChatRequest) -> Result<TokenStream> {
        self.requests.lock().push(req.clone());

        let chunks = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec!["Okay.".to_owned()]);

        let stream = async_stream::stream! {
            for chunk in chunks {
                // Let the consumer interleave, as a real socket would.
                tokio::task::yield_now().await;
                yield Ok(chunk);
            }
        };
        Ok(Box::pin(stream))
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_domain::chat::ChatMessage;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn streams_scripted_chunks_in_order() {
        let provider = ScriptedProvider::new("test");
        provider.push_chunks(vec!["Hel", "lo"]);

        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "scripted".into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            json_mode: false,
        };
        let mut stream = provider.stream_chat(&req).await.unwrap();

        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.unwrap());
        }
        assert_eq!(out, "Hello");
        assert_eq!(provider.recorded_requests().len(), 1);
    }
}
