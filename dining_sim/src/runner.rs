//! Scenario runner - executes simulation scenarios under the virtual clock.

use crate::context::SimContext;
use crate::exporter::SimExport;
use crate::oracle::{InvariantOracle, ScenarioMetrics};
use crate::scenarios::ScenarioId;

use dining_core::{EngineConfig, EngineError, EventKind, PhilosopherState, SimulationEngine};
use dining_env::DiningContext;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Base engine configuration (scenarios may override parts of it)
    config: EngineConfig,

    /// Simulated time each scenario runs for
    max_duration: Duration,

    /// Snapshot interval when exporting
    frame_interval: Duration,
}

/// One engine on one virtual clock, plus the bookkeeping of a run.
struct Harness {
    ctx: Arc<SimContext>,
    engine: SimulationEngine<SimContext>,
    oracle: Arc<InvariantOracle>,
    export: Option<SimExport>,
    frame_interval: Duration,
    failures: Vec<String>,
}

impl Harness {
    fn new(
        ctx: SimContext,
        config: EngineConfig,
        export: Option<SimExport>,
        frame_interval: Duration,
    ) -> Result<Self, EngineError> {
        let ctx = Arc::new(ctx);
        let oracle = Arc::new(InvariantOracle::new(&config).recording());
        let engine = SimulationEngine::new(ctx.clone(), config)?.with_observer(oracle.clone());

        let mut harness = Self {
            ctx,
            engine,
            oracle,
            export,
            frame_interval,
            failures: Vec::new(),
        };
        harness.record_frame();
        Ok(harness)
    }

    fn config(&self) -> EngineConfig {
        self.engine.config().clone()
    }

    fn record_frame(&mut self) {
        if let Some(export) = self.export.as_mut() {
            export.add_frame(self.engine.snapshot());
        }
    }

    /// Advances the clock, recording a frame every `frame_interval` when exporting.
    fn advance(&mut self, duration: Duration) {
        if self.export.is_none() || self.frame_interval.is_zero() {
            self.ctx.advance_time(duration);
            return;
        }

        let target = self.ctx.now() + duration;
        while self.ctx.now() < target {
            let step = self.frame_interval.min(target - self.ctx.now());
            self.ctx.advance_time(step);
            self.record_frame();
        }
    }

    fn advance_to(&mut self, target: Duration) {
        let now = self.ctx.now();
        if target > now {
            self.advance(target - now);
        }
    }

    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            let message = message();
            debug!(at_ms = self.ctx.now().as_millis() as u64, %message, "check failed");
            self.failures.push(message);
        }
    }

    fn eaters(&self) -> Vec<usize> {
        self.engine
            .snapshot()
            .philosophers
            .iter()
            .filter(|p| p.state == PhilosopherState::Eating)
            .map(|p| p.id)
            .collect()
    }

    fn all_uninitialized(&self) -> bool {
        self.engine
            .snapshot()
            .states()
            .iter()
            .all(|s| *s == PhilosopherState::Uninitialized)
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64) -> (ScenarioResult, Option<SimExport>) {
        for violation in self.oracle.violations() {
            self.failures.push(violation.to_string());
        }

        let passed = self.failures.is_empty();
        let metrics = self.oracle.metrics();
        let mut export = self.export.take();
        if let Some(export) = export.as_mut() {
            export.finalize(passed, metrics.clone(), self.oracle.events());
        }

        let result = ScenarioResult {
            scenario,
            seed,
            passed,
            final_time_secs: self.ctx.now().as_secs_f64(),
            failure_reason: if passed {
                None
            } else {
                Some(self.failures.join("; "))
            },
            metrics,
        };
        (result, export)
    }
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: EngineConfig::default(),
            max_duration: Duration::from_secs(60),
            frame_interval: Duration::from_millis(250),
        }
    }

    /// Sets the base engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    /// Sets the export frame interval.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario and captures frames and events for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let export = export.unwrap_or_else(|| {
            SimExport::new(scenario.name(), self.seed, self.config_for(scenario))
        });
        (result, export)
    }

    fn duration(&self) -> Duration {
        self.max_duration
    }

    /// Engine configuration a scenario runs with.
    pub fn config_for(&self, scenario: ScenarioId) -> EngineConfig {
        let base = self.config.clone();
        match scenario {
            ScenarioId::AdjacentContention | ScenarioId::ShuffledTies => {
                base.with_stagger(Duration::ZERO)
            }
            ScenarioId::LargeRing => base.with_philosophers(64),
            ScenarioId::Pair => base.with_philosophers(2),
            ScenarioId::ColdStart | ScenarioId::StopMidMeal | ScenarioId::ResetCycle => base,
        }
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("{}", scenario.description());

        let config = self.config_for(scenario);
        let ctx = match scenario {
            ScenarioId::ShuffledTies => SimContext::new(self.seed).with_shuffled_ties(),
            _ => SimContext::new(self.seed),
        };
        let export = export.then(|| SimExport::new(scenario.name(), self.seed, config.clone()));

        let mut harness = match Harness::new(ctx, config, export, self.frame_interval) {
            Ok(harness) => harness,
            Err(e) => {
                warn!("Scenario {} could not build an engine: {}", scenario.name(), e);
                let result = ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    final_time_secs: 0.0,
                    failure_reason: Some(e.to_string()),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, None);
            }
        };

        match scenario {
            ScenarioId::ColdStart => self.run_cold_start(&mut harness),
            ScenarioId::StopMidMeal => self.run_stop_mid_meal(&mut harness),
            ScenarioId::AdjacentContention => self.run_adjacent_contention(&mut harness),
            ScenarioId::ShuffledTies | ScenarioId::LargeRing | ScenarioId::Pair => {
                self.run_steady_state(&mut harness)
            }
            ScenarioId::ResetCycle => self.run_reset_cycle(&mut harness),
        }

        harness.finish(scenario, self.seed)
    }

    /// First meal appears after the first hand-off window, holding exactly
    /// its two resources, and is released one eating duration later.
    fn run_cold_start(&self, h: &mut Harness) {
        let cfg = h.config();
        let first_attempt = cfg.thinking_duration + cfg.hand_off_delay;

        h.engine.start();
        h.advance_to(first_attempt);

        let eaters = h.eaters();
        let snap = h.engine.snapshot();
        h.check(!eaters.is_empty(), || {
            format!("nobody eating at {}ms", first_attempt.as_millis())
        });
        for &e in &eaters {
            let (left, right) = (cfg.left_resource(e), cfg.right_resource(e));
            h.check(!snap.resources[left] && !snap.resources[right], || {
                format!("philosopher {e} eating without holding ({left}, {right})")
            });
        }
        h.check(snap.held_count() == 2 * eaters.len(), || {
            format!("{} resources held by {} eaters", snap.held_count(), eaters.len())
        });

        if let Some(&first) = eaters.first() {
            let (left, right) = (cfg.left_resource(first), cfg.right_resource(first));
            let released_at = first_attempt + cfg.eating_duration;
            h.advance_to(released_at);

            let release = EventKind::PairReleased {
                philosopher: first,
                left,
                right,
            };
            let released = h
                .oracle
                .events()
                .iter()
                .any(|ev| ev.kind == release && ev.at_ms == released_at.as_millis() as u64);
            h.check(released, || {
                format!("philosopher {first} did not release at {}ms", released_at.as_millis())
            });
            if !cfg.thinking_duration.is_zero() {
                let state = h.engine.state_of(first);
                h.check(state == PhilosopherState::Thinking, || {
                    format!("philosopher {first} is {state} after eating")
                });
            }
        }

        h.advance_to(self.duration().max(first_attempt));
        let meals = h.oracle.metrics().meals;
        h.check(meals > 0, || "no meal completed".to_string());
    }

    /// Stopping mid-meal resets philosophers, keeps resources and silences
    /// every timer.
    fn run_stop_mid_meal(&self, h: &mut Harness) {
        let cfg = h.config();
        let first_attempt = cfg.thinking_duration + cfg.hand_off_delay;

        h.engine.start();
        h.advance_to(first_attempt);

        let Some(eater) = h.eaters().first().copied() else {
            h.check(false, || format!("nobody eating at {}ms", first_attempt.as_millis()));
            return;
        };
        let before = h.engine.resources();

        h.engine.stop();
        let after = h.engine.snapshot();
        h.check(h.all_uninitialized(), || "stop left philosophers active".to_string());
        h.check(after.resources == before, || {
            format!("stop changed resources {:?} -> {:?}", before, after.resources)
        });
        let (left, right) = (cfg.left_resource(eater), cfg.right_resource(eater));
        h.check(!after.resources[left] && !after.resources[right], || {
            format!("resources of philosopher {eater} were released by stop")
        });
        let pending = h.ctx.pending_timers();
        h.check(pending == 0, || format!("{pending} timers pending after stop"));

        let events = h.oracle.event_count();
        let fired = h.ctx.fired_count();
        h.advance(cfg.eating_duration + cfg.thinking_duration + cfg.retry_backoff);
        h.check(h.oracle.event_count() == events, || {
            "events published after stop".to_string()
        });
        h.check(h.ctx.fired_count() == fired, || "timers fired after stop".to_string());
        h.check(h.engine.resources() == before, || {
            "resources changed after stop".to_string()
        });

        h.engine.stop();
        h.check(h.oracle.event_count() == events, || {
            "second stop published events".to_string()
        });
        h.check(h.engine.snapshot().states() == after.states(), || {
            "second stop changed state".to_string()
        });
    }

    /// All philosophers go hungry at once: neighbours never both eat, and the
    /// losers record a failed acquire.
    fn run_adjacent_contention(&self, h: &mut Harness) {
        let cfg = h.config();
        let n = cfg.num_philosophers;
        let first_attempt = cfg.thinking_duration + cfg.hand_off_delay;

        h.engine.start();
        h.advance_to(first_attempt);

        let states = h.engine.snapshot().states();
        for i in 0..n {
            let j = (i + 1) % n;
            let both = states[i] == PhilosopherState::Eating && states[j] == PhilosopherState::Eating;
            h.check(!both, || format!("neighbours {i} and {j} eating together"));
        }

        let at_ms = first_attempt.as_millis() as u64;
        let failed: Vec<usize> = h
            .oracle
            .events()
            .iter()
            .filter(|ev| ev.at_ms == at_ms)
            .filter_map(|ev| match ev.kind {
                EventKind::AcquireFailed { philosopher, streak: 1, .. } => Some(philosopher),
                _ => None,
            })
            .collect();
        h.check(!failed.is_empty(), || "no contended acquire failed".to_string());

        for i in 0..n {
            if states[i] != PhilosopherState::Hungry {
                continue;
            }
            let left = (i + n - 1) % n;
            let right = (i + 1) % n;
            let blocked = states[left] == PhilosopherState::Eating
                || states[right] == PhilosopherState::Eating;
            h.check(blocked && failed.contains(&i), || {
                format!("philosopher {i} hungry without an eating neighbour or failed attempt")
            });
        }

        h.advance_to(self.duration().max(first_attempt));
    }

    /// Runs to the duration and relies on the oracle for the invariants.
    fn run_steady_state(&self, h: &mut Harness) {
        let cfg = h.config();
        h.engine.start();
        h.advance_to(self.duration());

        let metrics = h.oracle.metrics();
        if self.duration() >= cfg.thinking_duration + cfg.hand_off_delay + cfg.eating_duration {
            h.check(metrics.meals > 0, || "no meal completed".to_string());
        }
        h.check(metrics.max_concurrent_eaters <= cfg.max_concurrent_eaters(), || {
            format!("{} eaters at once", metrics.max_concurrent_eaters)
        });
        if metrics.longest_hungry_streak > 10 {
            warn!(
                streak = metrics.longest_hungry_streak,
                "a philosopher retried many times in a row (possible livelock)"
            );
        }
    }

    /// Seeded sequence of start / stop / reset with random gaps.
    fn run_reset_cycle(&self, h: &mut Harness) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for round in 0..6 {
            h.engine.start();
            h.check(h.engine.is_running(), || format!("round {round}: not running after start"));
            h.advance(Duration::from_millis(rng.gen_range(1..15_000)));

            if round % 2 == 0 {
                h.engine.stop();
            } else {
                h.engine.reset();
                let resources = h.engine.resources();
                h.check(resources.iter().all(|a| *a), || {
                    format!("round {round}: reset left resources held: {resources:?}")
                });
            }

            h.check(!h.engine.is_running(), || format!("round {round}: still running"));
            h.check(h.all_uninitialized(), || {
                format!("round {round}: philosophers active after stop")
            });
            let pending = h.engine.pending_timers();
            h.check(pending == 0, || format!("round {round}: {pending} timers pending"));

            let fired = h.ctx.fired_count();
            h.advance(Duration::from_millis(rng.gen_range(1..5_000)));
            h.check(h.ctx.fired_count() == fired, || {
                format!("round {round}: timers fired while stopped")
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_creation() {
        let runner = ScenarioRunner::new(42).with_duration(Duration::from_secs(30));
        assert_eq!(runner.duration(), Duration::from_secs(30));
        assert_eq!(runner.config_for(ScenarioId::Pair).num_philosophers, 2);
        assert_eq!(
            runner.config_for(ScenarioId::AdjacentContention).stagger_interval,
            Duration::ZERO
        );
    }

    #[test]
    fn test_all_scenarios_pass_with_defaults() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[test]
    fn test_invalid_config_fails_cleanly() {
        let runner =
            ScenarioRunner::new(1).with_config(EngineConfig::default().with_retry_backoff(Duration::ZERO));
        let result = runner.run(ScenarioId::ColdStart);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("retry_backoff"));
    }

    #[test]
    fn test_export_captures_frames_and_events() {
        let runner = ScenarioRunner::new(7)
            .with_duration(Duration::from_secs(10))
            .with_frame_interval(Duration::from_millis(500));
        let (result, export) = runner.run_with_export(ScenarioId::ColdStart);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(export.passed);
        assert_eq!(export.frames.first().map(|f| f.time_ms), Some(0));
        assert_eq!(export.duration_ms, 10_000);
        assert!(export.events.iter().any(|e| e.kind == EventKind::Started));
        assert_eq!(export.metrics, Some(result.metrics));
    }
}
