use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::agent::LlmConfig;
use crate::chat::ChatMessage;
use crate::error::{Error, Result};
use crate::message::{MessageContent, Sender, SenderType, ToolCallDescriptor};
use crate::thread::ThreadSpec;
use crate::tool::ToolDefinition;
use crate::JsonMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The queue discriminator. Five names are reserved; any other name is
/// admitted as a custom type so callers can schedule their own work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    NewMessage,
    LlmCall,
    ToolCall,
    Token,
    AssetCreated,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::NewMessage => "NEW_MESSAGE",
            EventType::LlmCall => "LLM_CALL",
            EventType::ToolCall => "TOOL_CALL",
            EventType::Token => "TOKEN",
            EventType::AssetCreated => "ASSET_CREATED",
            EventType::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "NEW_MESSAGE" => EventType::NewMessage,
            "LLM_CALL" => EventType::LlmCall,
            "TOOL_CALL" => EventType::ToolCall,
            "TOKEN" => EventType::Token,
            "ASSET_CREATED" => EventType::AssetCreated,
            other => EventType::Custom(other.to_owned()),
        }
    }

    /// `TOKEN` and `ASSET_CREATED` are stream-only signals: they are
    /// emitted on the run handle but never enqueued for processing.
    pub fn is_enqueueable(&self) -> bool {
        !matches!(self, EventType::Token | EventType::AssetCreated)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventType::from_name(&name))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Queue item lifecycle. Legal transitions:
/// `pending → processing → {completed | failed}`,
/// `pending → expired` (sweeper), `pending → overwritten` (override hook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    Overwritten,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Pending | EventStatus::Processing)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything needed to create one message and decide what happens next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
}

/// A fully prepared provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCallPayload {
    pub agent_name: String,
    pub agent_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub config: LlmConfig,
}

/// One tool invocation on behalf of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    pub agent_name: String,
    pub sender_id: String,
    pub sender_type: SenderType,
    pub call: ToolCallDescriptor,
}

/// Streaming signal. Never enqueued; only emitted on the run handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub thread_id: String,
    pub agent_name: String,
    pub token: String,
    pub is_complete: bool,
}

/// Emitted once per asset a processor creates. Never enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCreatedPayload {
    pub asset_id: String,
    /// The `asset://<id>` URI substituted into the owning message.
    #[serde(rename = "ref")]
    pub ref_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Participant name of whoever produced the binary.
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One queue row. `payload` holds the type-discriminated JSON; typed
/// accessors deserialize it at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub thread_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Higher runs earlier. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Deserialize the payload into its typed form.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            Error::InvalidInput(format!(
                "event {} has malformed {} payload: {e}",
                self.id, self.event_type
            ))
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event spec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a caller or processor hands to the queue; the queue assigns id,
/// timestamps, and the derived expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSpec {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub metadata: JsonMap,
}

impl EventSpec {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
            parent_event_id: None,
            trace_id: None,
            priority: 0,
            ttl_ms: None,
            expires_at: None,
            status: None,
            metadata: JsonMap::new(),
        }
    }

    /// Build a spec from a typed payload.
    pub fn from_payload<T: Serialize>(event_type: EventType, payload: &T) -> Result<Self> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    pub fn new_message(payload: &NewMessagePayload) -> Result<Self> {
        Self::from_payload(EventType::NewMessage, payload)
    }

    pub fn llm_call(payload: &LlmCallPayload) -> Result<Self> {
        Self::from_payload(EventType::LlmCall, payload)
    }

    pub fn tool_call(payload: &ToolCallPayload) -> Result<Self> {
        Self::from_payload(EventType::ToolCall, payload)
    }

    pub fn with_parent(mut self, parent_event_id: impl Into<String>) -> Self {
        self.parent_event_id = Some(parent_event_id.into());
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }
}
