//! Cooperative cancellation.
//!
//! Each run gets a `CancelToken`; the worker checks it before every
//! dequeue, and the token streamer checks it between chunks. Cancellation
//! is not retroactive: persisted events and emitted tokens remain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
