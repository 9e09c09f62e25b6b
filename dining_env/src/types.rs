//! Common types for the environment abstraction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Work run once when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a scheduled timer, unique within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl TimerId {
    /// Returns the raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Shared cancellation flag between a [`TimerHandle`] and the context
/// that will eventually fire the timer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel()` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellable handle to one scheduled timer.
///
/// Dropping the handle does NOT cancel the timer; call [`TimerHandle::cancel`].
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    token: CancelToken,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    /// Creates a handle sharing `token` with the context's pending entry.
    pub fn new(id: TimerId, token: CancelToken) -> Self {
        Self {
            id,
            token,
            task: None,
        }
    }

    /// Attaches the runtime task driving this timer, aborted on cancel.
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Returns the timer's ID.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancels the timer. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Returns true if the timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_timer_handle_cancel_is_idempotent() {
        let token = CancelToken::new();
        let handle = TimerHandle::new(TimerId(7), token.clone());

        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
        assert_eq!(handle.id().to_string(), "timer#7");
    }
}
