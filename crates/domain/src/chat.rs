//! Provider-facing chat turns.
//!
//! These are the messages carried inside an `LLM_CALL` payload, already
//! converted from thread history. The wire shapes follow the OpenAI chat
//! completions contract so adapters can pass them through.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    #[serde(rename = "input_audio")]
    InputAudio { input_audio: InputAudio },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// An `https://` or `data:` URL.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudio {
    /// Base64-encoded audio bytes.
    pub data: String,
    /// Audio format, e.g. `wav` or `mp3`.
    pub format: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: ChatContent::Text(text.into()),
        }
    }

    /// Rough token estimate used by history truncation (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        let chars = match &self.content {
            ChatContent::Text(t) => t.len(),
            ChatContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ChatPart::Text { text } => text.len(),
                    ChatPart::ImageUrl { image_url } => image_url.url.len(),
                    ChatPart::InputAudio { input_audio } => input_audio.data.len(),
                })
                .sum(),
        };
        chars / 4 + 1
    }
}
