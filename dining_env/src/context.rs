//! Core environment context trait for the dining philosophers engine.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{TimerCallback, TimerHandle};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the engine can run
/// on a production runtime (tokio) and in a deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and task spawning
/// - **Simulation**: `SimContext` (in `dining_sim`) - virtual clock + event queue
///
/// # Determinism
///
/// For simulation, every source of timing non-determinism (the clock and
/// the order in which due timers fire) is controlled by the implementation.
#[async_trait]
pub trait DiningContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: completes once virtual time has passed the deadline
    async fn sleep(&self, duration: Duration);

    /// Runs `callback` once after `delay`.
    ///
    /// Never blocks the caller. The returned handle cancels the timer; a
    /// cancelled timer's callback is guaranteed not to start. A callback
    /// that is already running is not interrupted.
    ///
    /// # Arguments
    /// * `name` - Label used in trace output
    /// * `delay` - Time from now until the callback fires
    /// * `callback` - Work to run when the timer fires
    fn schedule(&self, name: &str, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
