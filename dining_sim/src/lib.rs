//! Deterministic simulation harness for the dining-philosophers engine.
//!
//! The engine from `dining_core` is driven by a [`SimContext`] whose clock
//! only moves when the harness says so. Every timer fires in deadline
//! order, so a run is a pure function of its configuration and seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │ SimContext (virtual clock + timer heap)            │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │             │ fires due timers                           │
//! │  ┌──────────▼─────────────┐      events     ┌─────────┐  │
//! │  │   SimulationEngine     │───────────────►│ Oracle  │  │
//! │  │  (philosophers, ring)  │                 │         │  │
//! │  └────────────────────────┘                 └─────────┘  │
//! │             │ snapshots                                  │
//! │  ┌──────────▼─────────────┐                              │
//! │  │       SimExport        │                              │
//! │  └────────────────────────┘                              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dining_sim::{ScenarioId, ScenarioRunner};
//! use std::time::Duration;
//!
//! let runner = ScenarioRunner::new(42).with_duration(Duration::from_secs(60));
//! let result = runner.run(ScenarioId::AdjacentContention);
//! assert!(result.passed);
//! ```

mod context;
pub mod exporter;
mod oracle;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{ExportError, SimExport, SimFrame};
pub use oracle::{InvariantOracle, ScenarioMetrics, Violation};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
