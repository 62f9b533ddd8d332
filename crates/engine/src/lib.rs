//! The event-driven thread engine.
//!
//! Each run enqueues a `NEW_MESSAGE` on its thread's durable queue and
//! spawns a per-thread worker that dispatches events to the built-in
//! processors — `NEW_MESSAGE` materializes messages and decides what
//! runs next, `LLM_CALL` streams a provider and parses tool calls,
//! `TOOL_CALL` executes a tool and reports its result back into the
//! conversation — until the thread drains. The run handle streams every
//! event as it happens.

pub mod cancel;
pub mod context;
mod emitter;
pub mod hook;
mod llm_builder;
mod processors;
pub mod run;
pub mod token_filter;
mod worker;

pub use cancel::CancelToken;
pub use context::{RunContext, RunContextBuilder};
pub use hook::{EventHook, FnHook, HookAction};
pub use run::{
    run, AckMode, IncomingMessage, IncomingToolCall, RunHandle, RunOptions, RunRequest,
};
pub use token_filter::{parse_response, ParsedResponse, ToolCallFilter};
