//! The override hook.
//!
//! A caller-supplied hook sees every non-`TOKEN` event before its default
//! processor runs and can let it through, substitute a different event,
//! replace it with other events, or drop it. Hook errors are swallowed
//! and the default path runs.

use cz_domain::error::Result;
use cz_domain::event::{Event, EventSpec};

/// What the hook decided.
pub enum HookAction {
    /// Run the default processor unchanged.
    Continue,
    /// Run the default processor with this event substituted.
    Substitute(Box<Event>),
    /// Mark the original `overwritten` and enqueue these instead.
    Replace(Vec<EventSpec>),
    /// Mark the original `overwritten` and enqueue nothing.
    Drop,
    /// Run the default processor, then enqueue these in addition to
    /// whatever it produced.
    Augment(Vec<EventSpec>),
}

#[async_trait::async_trait]
pub trait EventHook: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<HookAction>;
}

/// Hook from a plain synchronous function.
pub struct FnHook<F> {
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Event) -> Result<HookAction> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F> EventHook for FnHook<F>
where
    F: Fn(&Event) -> Result<HookAction> + Send + Sync,
{
    async fn on_event(&self, event: &Event) -> Result<HookAction> {
        (self.f)(event)
    }
}
