//! Dining Philosophers Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the simulation
//! engine to run on both a **Runtime** (tokio) and a **Simulation**
//! (virtual clock) environment.
//!
//! # Core Concept: Timers, not Threads
//!
//! Philosophers never block. Every "wait" in the engine is expressed as a
//! timer callback scheduled through the context:
//! - Time (`now()`, `sleep()`)
//! - Timers (`schedule()` → cancellable [`TimerHandle`])
//!
//! By routing every delay through one trait, a deterministic harness can
//! replace the wall clock and replay any interleaving of timer firings.
//!
//! # Example
//!
//! ```ignore
//! use dining_env::{DiningContext, TokioContext};
//! use std::time::Duration;
//!
//! let ctx = TokioContext::shared()?;
//! let handle = ctx.schedule("greeter", Duration::from_millis(100), Box::new(|| {
//!     println!("tick");
//! }));
//! handle.cancel();
//! ```

mod context;
mod error;
mod tokio_impl;
mod types;

pub use context::DiningContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{CancelToken, TimerCallback, TimerHandle, TimerId};
