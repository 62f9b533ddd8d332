//! copilotz — a multi-agent conversation runtime.
//!
//! Messages are submitted to conversation threads; each thread is driven
//! forward by a durable, priority-ordered event queue whose processors
//! call LLM providers, execute tools, and materialize new messages. Each
//! run yields an async stream of events (tokens, tool lifecycle, message
//! creation, asset creation) and a terminal completion.
//!
//! ```no_run
//! use copilotz::domain::agent::{AgentConfig, LlmConfig, ProviderKind};
//! use copilotz::domain::message::{MessageContent, Sender};
//! use copilotz::engine::{run, IncomingMessage, RunContext, RunRequest};
//!
//! # async fn demo() -> copilotz::domain::Result<()> {
//! let mut agent = AgentConfig::new("Ada", LlmConfig::new(ProviderKind::Openai, "gpt-4o-mini"));
//! agent.allowed_tools = vec!["get_current_time".into()];
//!
//! let ctx = RunContext::builder().agent(agent).build().await?;
//! let mut handle = run(
//!     ctx,
//!     RunRequest::new(IncomingMessage {
//!         content: MessageContent::Text("what time is it?".into()),
//!         sender: Sender::user("user-1"),
//!         thread: None,
//!         tool_calls: Vec::new(),
//!         metadata: None,
//!     }),
//! )
//! .await?;
//!
//! while let Some(event) = handle.next_event().await {
//!     println!("{} {:?}", event.event_type, event.status);
//! }
//! handle.done().await
//! # }
//! ```

pub use cz_assets as assets;
pub use cz_domain as domain;
pub use cz_engine as engine;
pub use cz_providers as providers;
pub use cz_store as store;
pub use cz_tools as tools;

pub use cz_engine::{run, RunContext, RunHandle, RunRequest};
