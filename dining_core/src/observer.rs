//! Observer interface between the engine and whatever renders it.
//!
//! Observers only read. The engine publishes one [`SimulationEvent`] per
//! state change and per ring mutation, and exposes an [`EngineSnapshot`]
//! on demand.

use crate::philosopher::PhilosopherState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// `start()` took effect
    Started,

    /// `stop()` finished; no transition follows until the next `Started`
    Stopped,

    /// `reset()` finished
    Reset,

    /// A philosopher changed state
    StateChanged {
        philosopher: usize,
        from: PhilosopherState,
        to: PhilosopherState,
    },

    /// Both resources were claimed
    PairAcquired {
        philosopher: usize,
        left: usize,
        right: usize,
    },

    /// The pair was not free; a retry is scheduled
    AcquireFailed {
        philosopher: usize,
        left: usize,
        right: usize,
        streak: u32,
    },

    /// Both resources were returned
    PairReleased {
        philosopher: usize,
        left: usize,
        right: usize,
    },

    /// Every resource was made available by `reset()`
    ResourcesRestored,
}

/// An event stamped with context time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Context time in milliseconds
    pub at_ms: u64,

    #[serde(flatten)]
    pub kind: EventKind,
}

/// Receives every event the engine publishes.
///
/// Called synchronously while the engine holds its locks: keep it cheap and
/// never call back into the engine's lifecycle methods from here.
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &SimulationEvent);
}

/// Per-philosopher part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhilosopherSnapshot {
    pub id: usize,
    pub state: PhilosopherState,
    pub meals: u64,
    pub failed_attempts: u64,
    pub hungry_streak: u32,
}

/// Consistent read-only view of the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub at_ms: u64,
    pub running: bool,
    pub philosophers: Vec<PhilosopherSnapshot>,

    /// `true` = available
    pub resources: Vec<bool>,
}

impl EngineSnapshot {
    /// States only, indexed by philosopher.
    pub fn states(&self) -> Vec<PhilosopherState> {
        self.philosophers.iter().map(|p| p.state).collect()
    }

    /// Number of philosophers currently eating.
    pub fn eating_count(&self) -> usize {
        self.philosophers
            .iter()
            .filter(|p| p.state == PhilosopherState::Eating)
            .count()
    }

    /// Number of resources currently held.
    pub fn held_count(&self) -> usize {
        self.resources.iter().filter(|a| !**a).count()
    }

    /// Compact one-line rendering, e.g. `T H E . T | ##__#`.
    pub fn table_line(&self) -> String {
        let seats: Vec<&str> = self
            .philosophers
            .iter()
            .map(|p| match p.state {
                PhilosopherState::Uninitialized => ".",
                PhilosopherState::Thinking => "T",
                PhilosopherState::Hungry => "H",
                PhilosopherState::Eating => "E",
            })
            .collect();
        let resources: String = self
            .resources
            .iter()
            .map(|a| if *a { '_' } else { '#' })
            .collect();
        format!("{} | {}", seats.join(" "), resources)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_event(&self, event: &SimulationEvent) {
        let at_ms = event.at_ms;
        match &event.kind {
            EventKind::Started => info!(at_ms, "simulation started"),
            EventKind::Stopped => info!(at_ms, "simulation stopped"),
            EventKind::Reset => info!(at_ms, "simulation reset"),
            EventKind::ResourcesRestored => info!(at_ms, "all resources restored"),
            EventKind::StateChanged { philosopher, from, to } => {
                debug!(at_ms, philosopher, %from, %to, "state changed")
            }
            EventKind::PairAcquired { philosopher, left, right } => {
                debug!(at_ms, philosopher, left, right, "pair acquired")
            }
            EventKind::AcquireFailed { philosopher, left, right, streak } => {
                debug!(at_ms, philosopher, left, right, streak, "pair busy, retrying")
            }
            EventKind::PairReleased { philosopher, left, right } => {
                debug!(at_ms, philosopher, left, right, "pair released")
            }
        }
    }
}
