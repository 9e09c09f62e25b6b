//! Production implementation of DiningContext using Tokio.

use crate::error::EnvError;
use crate::types::{CancelToken, TimerCallback, TimerHandle, TimerId};
use crate::DiningContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::trace;

/// Production context backed by a Tokio runtime.
///
/// This is the "real" implementation used when the simulation runs in
/// real time. Each timer is a spawned task that sleeps and then runs its
/// callback; cancelling the handle aborts the task.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Runtime the timer tasks are spawned on
    handle: Handle,

    /// Counter for timer IDs
    next_timer: AtomicU64,
}

impl TokioContext {
    /// Creates a new TokioContext on the current runtime.
    ///
    /// # Errors
    /// Returns `EnvError::NoRuntime` when called outside a Tokio runtime.
    pub fn new() -> Result<Self, EnvError> {
        let handle = Handle::try_current().map_err(|e| EnvError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    /// Creates a context that spawns its timers on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            start: Instant::now(),
            handle,
            next_timer: AtomicU64::new(0),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Result<Arc<Self>, EnvError> {
        Self::new().map(Arc::new)
    }
}

#[async_trait]
impl DiningContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn schedule(&self, name: &str, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed));
        let token = CancelToken::new();
        let guard = token.clone();
        let name = name.to_string();

        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.is_cancelled() {
                trace!(timer = %id, %name, "cancelled timer woke up, skipping");
                return;
            }
            trace!(timer = %id, %name, "timer fired");
            callback();
        });

        TimerHandle::new(id, token).with_task(task.abort_handle())
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new().unwrap();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_timer_fires() {
        let ctx = TokioContext::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let handle = ctx.schedule(
            "test",
            Duration::from_millis(100),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        ctx.sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));

        ctx.sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(!handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_cancelled_timer_never_fires() {
        let ctx = TokioContext::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let handle = ctx.schedule(
            "test",
            Duration::from_millis(100),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        handle.cancel();

        ctx.sleep(Duration::from_millis(500)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tokio_context_requires_runtime() {
        assert!(matches!(TokioContext::new(), Err(EnvError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_tokio_context_seed() {
        let ctx = TokioContext::new().unwrap();
        assert_eq!(ctx.seed(), 0);
    }
}
