//! Shared domain types for the copilotz runtime.
//!
//! Everything that crosses a crate boundary lives here: threads, messages,
//! queue events and their payloads, agent and tool configuration, chat
//! turns, asset metadata, the workspace-wide error enum, and the boxed
//! stream alias used for provider output.

pub mod agent;
pub mod asset;
pub mod chat;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;
pub mod thread;
pub mod tool;

pub use error::{Error, Result};

/// Free-form JSON metadata attached to threads, messages, and events.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
