//! Dining Philosophers Core
//!
//! N philosophers alternate between thinking, hungry and eating around a
//! ring of N single-owner resources. Each needs both resources adjacent to
//! it to eat.
//!
//! - [`ring`]: the Resource Ring and its atomic pair operations
//! - [`philosopher`]: the per-seat state machine
//! - [`engine`]: timer-driven scheduling and the start/stop/reset lifecycle
//! - [`observer`]: events and snapshots for external renderers
//! - [`config`]: timing parameters

pub mod config;
pub mod engine;
pub mod error;
pub mod observer;
pub mod philosopher;
pub mod ring;

// Re-export key types for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::SimulationEngine;
pub use error::EngineError;
pub use observer::{
    EngineObserver, EngineSnapshot, EventKind, PhilosopherSnapshot, SimulationEvent,
    TracingObserver,
};
pub use philosopher::{Philosopher, PhilosopherState, Transition};
pub use ring::ResourceRing;
