use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::JsonMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Senders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Agent,
    Tool,
    System,
}

/// Who produced a message. `name` doubles as the participant name for
/// agents; users fall back to `id`/`external_id` when unnamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    #[serde(rename = "type")]
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
}

impl Sender {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            sender_type: SenderType::User,
            id: Some(id.into()),
            external_id: None,
            name: None,
            metadata: None,
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sender_type: SenderType::Agent,
            id: Some(name.clone()),
            external_id: None,
            name: Some(name),
            metadata: None,
        }
    }

    pub fn tool(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sender_type: SenderType::Tool,
            id: Some(name.clone()),
            external_id: None,
            name: Some(name),
            metadata: None,
        }
    }

    /// The participant name this sender goes by in a thread.
    pub fn participant_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .or_else(|| self.external_id.clone())
            .unwrap_or_else(|| "user".to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One typed content part. Binary payloads may arrive inline
/// (`data_base64` / `data_url`) and are normalized to `asset_ref`
/// before persistence when an asset store is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "dataBase64", default, skip_serializing_if = "Option::is_none")]
        data_base64: Option<String>,
        #[serde(rename = "dataUrl", default, skip_serializing_if = "Option::is_none")]
        data_url: Option<String>,
        #[serde(rename = "assetRef", default, skip_serializing_if = "Option::is_none")]
        asset_ref: Option<String>,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Audio {
        #[serde(rename = "dataBase64", default, skip_serializing_if = "Option::is_none")]
        data_base64: Option<String>,
        #[serde(rename = "dataUrl", default, skip_serializing_if = "Option::is_none")]
        data_url: Option<String>,
        #[serde(rename = "assetRef", default, skip_serializing_if = "Option::is_none")]
        asset_ref: Option<String>,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    File {
        #[serde(rename = "dataBase64", default, skip_serializing_if = "Option::is_none")]
        data_base64: Option<String>,
        #[serde(rename = "dataUrl", default, skip_serializing_if = "Option::is_none")]
        data_url: Option<String>,
        #[serde(rename = "assetRef", default, skip_serializing_if = "Option::is_none")]
        asset_ref: Option<String>,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    Json {
        value: Value,
    },
}

impl MessageContent {
    /// Join all text parts into one string. `Text` is returned as-is;
    /// non-text parts are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// True when the content carries no text and no parts at all.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(t) => t.trim().is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// True when the content is text only (no typed parts).
    pub fn is_plain_text(&self) -> bool {
        matches!(self, MessageContent::Text(_))
    }
}

/// One normalized attachment entry under `metadata.attachments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Part kind: `image`, `audio`, `file`, or `json`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool call descriptors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool invocation as carried on messages and in the `<tool_calls>`
/// text protocol: `{"function":{"name":"...","arguments":"<json>"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

impl ToolCallDescriptor {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the JSON-encoded arguments. An empty string parses as `{}`.
    pub fn parsed_arguments(&self) -> Result<Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(raw).map_err(|e| {
            Error::Validation(format!(
                "tool call '{}' carries malformed arguments: {e}",
                self.function.name
            ))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted, append-only message. Corrections are produced as new
/// messages; rows are never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDescriptor>>,
    /// Set when this message is a tool's reply to one specific call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// The normalized attachments array, when present.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.metadata
            .get("attachments")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}
