//! JSON exporter for external renderers.
//!
//! Exports table snapshots and the event stream of one scenario run.

use crate::oracle::ScenarioMetrics;
use dining_core::{EngineConfig, EngineSnapshot, SimulationEvent};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors while writing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode export: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in milliseconds
    pub time_ms: u64,

    /// Table state at that time
    pub snapshot: EngineSnapshot,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Engine configuration of the run
    pub config: EngineConfig,

    /// Duration in milliseconds
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Every event, in publication order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimulationEvent>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScenarioMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, config: EngineConfig) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            config,
            duration_ms: 0,
            frames: Vec::new(),
            events: Vec::new(),
            passed: false,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, snapshot: EngineSnapshot) {
        self.duration_ms = snapshot.at_ms;
        self.frames.push(SimFrame {
            time_ms: snapshot.at_ms,
            snapshot,
        });
    }

    /// Finalizes the export.
    pub fn finalize(
        &mut self,
        passed: bool,
        metrics: ScenarioMetrics,
        events: Vec<SimulationEvent>,
    ) {
        self.passed = passed;
        self.metrics = Some(metrics);
        self.events = events;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
