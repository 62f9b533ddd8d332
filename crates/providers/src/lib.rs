//! LLM provider adapters.
//!
//! The engine only sees [`LlmProvider`]: a streaming chat call that yields
//! decoded text chunks until the stream ends. Wire parsing belongs here.
//! One adapter ships in-tree — the OpenAI-compatible SSE contract, which
//! covers every default [`cz_domain::agent::ProviderKind`]; anything else
//! is registered by the caller.

mod openai_compat;
mod registry;
mod sse;
pub mod testing;
mod traits;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::ProviderRegistry;
pub use traits::{ChatRequest, LlmProvider};
