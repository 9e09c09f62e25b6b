//! Invariant oracle for simulation.
//!
//! The Oracle keeps its own "ground truth" copy of the table, rebuilt only
//! from the engine's event stream, and flags every event that contradicts
//! it:
//! - a resource handed to a second philosopher before being released
//! - a release by someone who does not hold the pair
//! - a state change outside `Thinking → Hungry → Eating → Thinking`
//! - `Eating` without a pair-acquire immediately before it
//! - more than `floor(N/2)` philosophers eating
//! - held resources ≠ 2 × eaters while running
//! - any transition between `Stopped` and the next `Started`

use dining_core::{EngineConfig, EngineObserver, EventKind, PhilosopherState, SimulationEvent};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Who holds a resource, as far as the event stream tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    Free,
    Philosopher(usize),

    /// Held when the simulation stopped; nobody will release it until reset
    Orphaned,
}

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub at_ms: u64,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}ms: {}", self.at_ms, self.message)
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// State changes observed (excluding forced resets)
    pub transitions: u64,

    /// Completed eating episodes
    pub meals: u64,

    /// Failed pair-acquires
    pub failed_acquires: u64,

    /// Most philosophers seen eating at once
    pub max_concurrent_eaters: usize,

    /// Longest run of consecutive failed acquires by one philosopher
    pub longest_hungry_streak: u32,
}

struct OracleState {
    running: bool,
    states: Vec<PhilosopherState>,
    holders: Vec<Holder>,

    /// Pair-acquire seen, `Eating` expected next
    acquired: Vec<bool>,

    /// Pair-release seen, `Thinking` expected next
    released: Vec<bool>,

    eating: usize,
    event_count: usize,
    violations: Vec<Violation>,
    metrics: ScenarioMetrics,

    /// Full event log, kept only when recording
    log: Option<Vec<SimulationEvent>>,
}

/// Observer that checks the engine's invariants on every event.
pub struct InvariantOracle {
    n: usize,
    state: Mutex<OracleState>,
}

impl InvariantOracle {
    /// Creates an oracle for a table described by `config`.
    pub fn new(config: &EngineConfig) -> Self {
        let n = config.num_philosophers;
        Self {
            n,
            state: Mutex::new(OracleState {
                running: false,
                states: vec![PhilosopherState::Uninitialized; n],
                holders: vec![Holder::Free; n],
                acquired: vec![false; n],
                released: vec![false; n],
                eating: 0,
                event_count: 0,
                violations: Vec::new(),
                metrics: ScenarioMetrics::default(),
                log: None,
            }),
        }
    }

    /// Also keeps every event for later export.
    pub fn recording(self) -> Self {
        self.lock().log = Some(Vec::new());
        self
    }

    fn lock(&self) -> MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Violations found so far.
    pub fn violations(&self) -> Vec<Violation> {
        self.lock().violations.clone()
    }

    /// Returns true if no invariant has been broken.
    pub fn is_clean(&self) -> bool {
        self.lock().violations.is_empty()
    }

    pub fn metrics(&self) -> ScenarioMetrics {
        self.lock().metrics.clone()
    }

    /// Number of events observed.
    pub fn event_count(&self) -> usize {
        self.lock().event_count
    }

    /// Recorded events (empty unless built with [`InvariantOracle::recording`]).
    pub fn events(&self) -> Vec<SimulationEvent> {
        self.lock().log.clone().unwrap_or_default()
    }

    /// Shadow state of philosopher `id`.
    pub fn state_of(&self, id: usize) -> PhilosopherState {
        self.lock().states[id]
    }

    fn expected_pair(&self, id: usize) -> (usize, usize) {
        (id, (id + 1) % self.n)
    }
}

impl OracleState {
    fn violation(&mut self, at_ms: u64, message: String) {
        self.violations.push(Violation { at_ms, message });
    }

    fn held_by_philosophers(&self) -> usize {
        self.holders
            .iter()
            .filter(|h| matches!(h, Holder::Philosopher(_)))
            .count()
    }
}

impl EngineObserver for InvariantOracle {
    fn on_event(&self, event: &SimulationEvent) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let at = event.at_ms;
        st.event_count += 1;
        if let Some(log) = st.log.as_mut() {
            log.push(event.clone());
        }

        match event.kind {
            EventKind::Started => {
                if st.running {
                    st.violation(at, "started while already running".into());
                }
                if st.states.iter().any(|s| s.is_active()) {
                    st.violation(at, "started with philosophers not uninitialized".into());
                }
                st.running = true;
            }

            EventKind::Stopped => {
                st.running = false;
                for holder in st.holders.iter_mut() {
                    if let Holder::Philosopher(_) = holder {
                        *holder = Holder::Orphaned;
                    }
                }
                if st.states.iter().any(|s| s.is_active()) {
                    st.violation(at, "stopped with philosophers still active".into());
                }
            }

            EventKind::ResourcesRestored => {
                st.holders.iter_mut().for_each(|h| *h = Holder::Free);
            }

            EventKind::Reset => {
                if st.running {
                    st.violation(at, "reset left the simulation running".into());
                }
                if st.holders.iter().any(|h| *h != Holder::Free) {
                    st.violation(at, "reset left resources held".into());
                }
            }

            EventKind::PairAcquired { philosopher, left, right } => {
                if !st.running {
                    st.violation(at, format!("philosopher {philosopher} acquired while stopped"));
                }
                if st.states[philosopher] != PhilosopherState::Hungry {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} acquired while {}", st.states[philosopher]),
                    );
                }
                if (left, right) != self.expected_pair(philosopher) {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} acquired foreign pair ({left}, {right})"),
                    );
                }
                for r in [left, right] {
                    if st.holders[r] != Holder::Free {
                        let holder = st.holders[r];
                        st.violation(
                            at,
                            format!("resource {r} acquired by {philosopher} while held: {holder:?}"),
                        );
                    }
                    st.holders[r] = Holder::Philosopher(philosopher);
                }
                st.acquired[philosopher] = true;
            }

            EventKind::AcquireFailed { philosopher, left, right, streak } => {
                if !st.running {
                    st.violation(at, format!("philosopher {philosopher} retried while stopped"));
                }
                if st.states[philosopher] != PhilosopherState::Hungry {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} tried to acquire while {}", st.states[philosopher]),
                    );
                }
                if st.holders[left] == Holder::Free && st.holders[right] == Holder::Free {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} failed to acquire a free pair ({left}, {right})"),
                    );
                }
                st.metrics.failed_acquires += 1;
                st.metrics.longest_hungry_streak = st.metrics.longest_hungry_streak.max(streak);
            }

            EventKind::PairReleased { philosopher, left, right } => {
                if st.states[philosopher] != PhilosopherState::Eating {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} released while {}", st.states[philosopher]),
                    );
                }
                for r in [left, right] {
                    if st.holders[r] != Holder::Philosopher(philosopher) {
                        let holder = st.holders[r];
                        st.violation(
                            at,
                            format!("resource {r} released by {philosopher} but held by {holder:?}"),
                        );
                    }
                    st.holders[r] = Holder::Free;
                }
                st.released[philosopher] = true;
                st.metrics.meals += 1;
            }

            EventKind::StateChanged { philosopher, from, to } => {
                if st.states[philosopher] != from {
                    st.violation(
                        at,
                        format!(
                            "philosopher {philosopher} left {from} but was {}",
                            st.states[philosopher]
                        ),
                    );
                }
                st.states[philosopher] = to;

                if from == PhilosopherState::Eating {
                    st.eating = st.eating.saturating_sub(1);
                }

                // Forced by stop/reset, always legal
                if to == PhilosopherState::Uninitialized {
                    st.acquired[philosopher] = false;
                    st.released[philosopher] = false;
                    return;
                }

                if !st.running {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} moved {from} -> {to} while stopped"),
                    );
                }

                let legal = match (from, to) {
                    (PhilosopherState::Uninitialized, PhilosopherState::Thinking) => true,
                    (PhilosopherState::Thinking, PhilosopherState::Hungry) => true,
                    (PhilosopherState::Hungry, PhilosopherState::Eating) => {
                        std::mem::take(&mut st.acquired[philosopher])
                    }
                    (PhilosopherState::Eating, PhilosopherState::Thinking) => {
                        std::mem::take(&mut st.released[philosopher])
                    }
                    _ => false,
                };
                if !legal {
                    st.violation(
                        at,
                        format!("philosopher {philosopher} made illegal transition {from} -> {to}"),
                    );
                }

                if to == PhilosopherState::Eating {
                    st.eating += 1;
                    st.metrics.max_concurrent_eaters = st.metrics.max_concurrent_eaters.max(st.eating);
                    if st.eating > self.n / 2 {
                        let eating = st.eating;
                        st.violation(at, format!("{eating} philosophers eating at a table of {}", self.n));
                    }
                }
                st.metrics.transitions += 1;

                let held = st.held_by_philosophers();
                if held != 2 * st.eating {
                    let eating = st.eating;
                    st.violation(at, format!("{held} resources held by {eating} eaters"));
                }
            }
        }
    }
}
