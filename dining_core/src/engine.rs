//! Simulation engine - timer-driven scheduling and lifecycle.
//!
//! There is no global tick. Each philosopher owns a chain of timers: when
//! its timer fires the philosopher takes one step and schedules the next.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SimulationEngine                         │
//! │                                                               │
//! │  seats[0]   seats[1]   ...   seats[N-1]     (Mutex each)      │
//! │  ┌───────┐  ┌───────┐        ┌───────┐                        │
//! │  │ phil  │  │ phil  │        │ phil  │                        │
//! │  │ timer │  │ timer │        │ timer │  ◄── ctx.schedule()    │
//! │  │ticket │  │ticket │        │ticket │                        │
//! │  └───┬───┘  └───┬───┘        └───┬───┘                        │
//! │      └──────────┴──────┬─────────┘                            │
//! │                 ┌──────▼───────┐                              │
//! │                 │ ResourceRing │  (one Mutex, pair ops only)  │
//! │                 └──────────────┘                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! Every scheduled callback carries the seat's `ticket` at scheduling time.
//! `stop()` clears the running flag, cancels every handle and bumps every
//! ticket while holding the seat lock. A callback already in flight then
//! finds either the flag cleared or a stale ticket and returns without
//! touching anything, even if `start()` has been called again meanwhile.
//!
//! # Lock order
//!
//! `lifecycle` → `seats[i]` (ascending) → `ring` → observers. Transitions
//! and their events happen under the ring lock, so observers receive one
//! linearized stream.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::observer::{EngineObserver, EngineSnapshot, EventKind, SimulationEvent};
use crate::philosopher::{Philosopher, PhilosopherState, Transition};
use crate::ring::ResourceRing;

use dining_env::{DiningContext, TimerHandle, TokioContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-philosopher slot: the state machine plus its single live timer.
struct Seat {
    philosopher: Philosopher,
    timer: Option<TimerHandle>,
    ticket: u64,
}

impl Seat {
    fn new(id: usize) -> Self {
        Self {
            philosopher: Philosopher::new(id),
            timer: None,
            ticket: 0,
        }
    }

    /// Cancels the live timer, if any, and invalidates in-flight callbacks.
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.ticket += 1;
    }

    fn has_live_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

struct Shared<Ctx: DiningContext> {
    context: Arc<Ctx>,
    config: EngineConfig,
    running: AtomicBool,

    /// Serializes start/stop/reset
    lifecycle: Mutex<()>,

    seats: Vec<Mutex<Seat>>,
    ring: Mutex<ResourceRing>,
    observers: RwLock<Vec<Arc<dyn EngineObserver>>>,
}

/// The dining philosophers simulation.
///
/// Cheap to clone; clones drive the same table. Dropping the last clone
/// cancels every pending timer.
pub struct SimulationEngine<Ctx: DiningContext> {
    shared: Arc<Shared<Ctx>>,
}

impl<Ctx: DiningContext> Clone for SimulationEngine<Ctx> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SimulationEngine<TokioContext> {
    /// Creates an engine whose timers run on the current Tokio runtime.
    pub fn on_current_runtime(config: EngineConfig) -> Result<Self, EngineError> {
        let context = TokioContext::shared()?;
        Self::new(context, config)
    }
}

impl<Ctx: DiningContext> SimulationEngine<Ctx> {
    /// Creates a stopped engine with every philosopher uninitialized and
    /// every resource available.
    pub fn new(context: Arc<Ctx>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let n = config.num_philosophers;

        let shared = Shared {
            context,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            seats: (0..n).map(|id| Mutex::new(Seat::new(id))).collect(),
            ring: Mutex::new(ResourceRing::new(n)),
            observers: RwLock::new(Vec::new()),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Registers an observer (builder form).
    pub fn with_observer(self, observer: Arc<dyn EngineObserver>) -> Self {
        self.add_observer(observer);
        self
    }

    /// Registers an observer for all subsequent events.
    pub fn add_observer(&self, observer: Arc<dyn EngineObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.shared.context
    }

    /// Context time.
    pub fn now(&self) -> Duration {
        self.shared.context.now()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Starts the simulation. No-op if already running.
    ///
    /// Philosopher `i` takes its first step after `i * stagger_interval`.
    pub fn start(&self) {
        let shared = &self.shared;
        let _lifecycle = lock(&shared.lifecycle);

        if shared.running.swap(true, Ordering::SeqCst) {
            debug!("start ignored, simulation already running");
            return;
        }

        info!(
            philosophers = shared.config.num_philosophers,
            seed = shared.context.seed(),
            "starting simulation"
        );
        shared.publish(EventKind::Started);

        for (id, seat) in shared.seats.iter().enumerate() {
            let mut seat = lock(seat);
            shared.schedule(&mut seat, id, shared.config.start_offset(id));
        }
    }

    /// Stops the simulation.
    ///
    /// Cancels every pending timer and returns every philosopher to
    /// `Uninitialized`. Resources keep their current availability.
    /// No transition happens after this returns.
    pub fn stop(&self) {
        let _lifecycle = lock(&self.shared.lifecycle);
        self.shared.halt();
    }

    /// Stops the simulation and makes every resource available.
    /// Does not start it again.
    pub fn reset(&self) {
        let shared = &self.shared;
        let _lifecycle = lock(&shared.lifecycle);
        shared.halt();

        let mut ring = lock(&shared.ring);
        ring.restore_all();
        shared.publish(EventKind::ResourcesRestored);
        shared.publish(EventKind::Reset);
        info!("simulation reset");
    }

    /// Consistent view of every philosopher and resource.
    pub fn snapshot(&self) -> EngineSnapshot {
        let shared = &self.shared;
        let seats: Vec<MutexGuard<'_, Seat>> = shared.seats.iter().map(|s| lock(s)).collect();
        let ring = lock(&shared.ring);

        EngineSnapshot {
            at_ms: shared.context.now().as_millis() as u64,
            running: self.is_running(),
            philosophers: seats.iter().map(|s| s.philosopher.snapshot()).collect(),
            resources: ring.availability().to_vec(),
        }
    }

    /// Current state of philosopher `id`.
    ///
    /// # Panics
    /// If `id` is not a seat at this table.
    pub fn state_of(&self, id: usize) -> PhilosopherState {
        lock(&self.shared.seats[id]).philosopher.state()
    }

    /// Current resource availability (`true` = available).
    pub fn resources(&self) -> Vec<bool> {
        lock(&self.shared.ring).availability().to_vec()
    }

    /// Number of philosophers with a live scheduled step.
    pub fn pending_timers(&self) -> usize {
        self.shared
            .seats
            .iter()
            .map(|seat| lock(seat).has_live_timer())
            .filter(|live| *live)
            .count()
    }
}

impl<Ctx: DiningContext> Shared<Ctx> {
    /// Schedules the next step of philosopher `id`, replacing its live timer.
    fn schedule(self: &Arc<Self>, seat: &mut Seat, id: usize, delay: Duration) {
        seat.cancel_timer();
        let ticket = seat.ticket;
        let engine = Arc::downgrade(self);

        let handle = self.context.schedule(
            &format!("philosopher-{id}"),
            delay,
            Box::new(move || {
                if let Some(shared) = engine.upgrade() {
                    shared.tick(id, ticket);
                }
            }),
        );
        seat.timer = Some(handle);
    }

    /// Timer body: one step of philosopher `id`.
    fn tick(self: &Arc<Self>, id: usize, ticket: u64) {
        if !self.running.load(Ordering::SeqCst) {
            trace!(philosopher = id, "timer fired after stop, discarded");
            return;
        }

        let mut seat = lock(&self.seats[id]);
        if !self.running.load(Ordering::SeqCst) || seat.ticket != ticket {
            trace!(philosopher = id, ticket, current = seat.ticket, "stale timer discarded");
            return;
        }
        // This handle has fired
        seat.timer = None;

        let transition = {
            let mut ring = lock(&self.ring);
            let transition = seat.philosopher.step(&mut ring, &self.config);
            self.publish_transition(id, &transition);
            transition
        };

        self.schedule(&mut seat, id, transition.delay(&self.config));
    }

    /// Stops, cancels, resets philosophers. Caller holds `lifecycle`.
    fn halt(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        for (id, seat) in self.seats.iter().enumerate() {
            let mut seat = lock(seat);
            seat.cancel_timer();

            let from = seat.philosopher.state();
            seat.philosopher = Philosopher::new(id);
            if from != PhilosopherState::Uninitialized {
                let _ring = lock(&self.ring);
                self.publish(EventKind::StateChanged {
                    philosopher: id,
                    from,
                    to: PhilosopherState::Uninitialized,
                });
            }
        }

        if was_running {
            info!("simulation stopped");
            self.publish(EventKind::Stopped);
        }
    }

    fn publish_transition(&self, id: usize, transition: &Transition) {
        match *transition {
            Transition::Seated | Transition::Hungered => {}
            Transition::Acquired { left, right } => self.publish(EventKind::PairAcquired {
                philosopher: id,
                left,
                right,
            }),
            Transition::Waiting { left, right, streak } => self.publish(EventKind::AcquireFailed {
                philosopher: id,
                left,
                right,
                streak,
            }),
            Transition::Finished { left, right } => self.publish(EventKind::PairReleased {
                philosopher: id,
                left,
                right,
            }),
        }

        if transition.from() != transition.to() {
            self.publish(EventKind::StateChanged {
                philosopher: id,
                from: transition.from(),
                to: transition.to(),
            });
        }
    }

    fn publish(&self, kind: EventKind) {
        let event = SimulationEvent {
            at_ms: self.context.now().as_millis() as u64,
            kind,
        };
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }
}

impl<Ctx: DiningContext> Drop for Shared<Ctx> {
    fn drop(&mut self) {
        for seat in &mut self.seats {
            let seat = seat.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Some(timer) = seat.timer.take() {
                timer.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SimulationEvent>>,
    }

    impl EngineObserver for Recorder {
        fn on_event(&self, event: &SimulationEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind.clone()).collect()
        }
    }

    fn engine() -> (SimulationEngine<TokioContext>, Arc<TokioContext>, Arc<Recorder>) {
        let ctx = TokioContext::shared().unwrap();
        let recorder = Arc::new(Recorder::default());
        let engine = SimulationEngine::new(ctx.clone(), EngineConfig::default())
            .unwrap()
            .with_observer(recorder.clone());
        (engine, ctx, recorder)
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let ctx = TokioContext::shared().unwrap();
        let result = SimulationEngine::new(ctx, EngineConfig::default().with_philosophers(1));
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::TooFewPhilosophers(1)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state() {
        let (engine, _ctx, _) = engine();
        let snap = engine.snapshot();

        assert!(!snap.running);
        assert!(snap.states().iter().all(|s| *s == PhilosopherState::Uninitialized));
        assert!(snap.resources.iter().all(|a| *a));
        assert_eq!(engine.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_meal_and_release() {
        let (engine, ctx, _) = engine();
        engine.start();
        assert!(engine.is_running());

        // Seat 0: thinking at 0, hungry at 5000, eating at 5100
        ctx.sleep(Duration::from_millis(5150)).await;
        let snap = engine.snapshot();
        assert_eq!(snap.philosophers[0].state, PhilosopherState::Eating);
        assert_eq!(snap.resources, vec![false, false, true, true, true]);
        assert_eq!(snap.eating_count(), 1);

        // Finished at 9100
        ctx.sleep(Duration::from_millis(4000)).await;
        assert_eq!(engine.state_of(0), PhilosopherState::Thinking);
        assert_eq!(engine.snapshot().philosophers[0].meals, 1);
        assert!(engine.resources()[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (engine, ctx, recorder) = engine();
        engine.start();
        engine.start();

        ctx.sleep(Duration::from_millis(10)).await;
        let started = recorder
            .kinds()
            .into_iter()
            .filter(|k| *k == EventKind::Started)
            .count();
        assert_eq!(started, 1);
        assert_eq!(engine.pending_timers(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_meal_keeps_resources() {
        let (engine, ctx, recorder) = engine();
        engine.start();
        ctx.sleep(Duration::from_millis(5150)).await;
        assert_eq!(engine.state_of(0), PhilosopherState::Eating);

        engine.stop();
        let after_stop = recorder.kinds().len();
        let snap = engine.snapshot();
        assert!(!snap.running);
        assert!(snap.states().iter().all(|s| *s == PhilosopherState::Uninitialized));
        assert_eq!(snap.resources, vec![false, false, true, true, true]);
        assert_eq!(engine.pending_timers(), 0);

        // Well past the original end of the meal
        ctx.sleep(Duration::from_secs(20)).await;
        assert_eq!(engine.snapshot().resources, snap.resources);
        assert_eq!(recorder.kinds().len(), after_stop);

        // Second stop changes nothing
        engine.stop();
        assert_eq!(engine.snapshot().states(), snap.states());
        assert_eq!(recorder.kinds().len(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_everything() {
        let (engine, ctx, recorder) = engine();
        engine.start();
        ctx.sleep(Duration::from_millis(7000)).await;

        engine.reset();
        let snap = engine.snapshot();
        assert!(!snap.running);
        assert!(snap.states().iter().all(|s| *s == PhilosopherState::Uninitialized));
        assert!(snap.resources.iter().all(|a| *a));
        assert_eq!(recorder.kinds().last(), Some(&EventKind::Reset));

        ctx.sleep(Duration::from_secs(30)).await;
        assert_eq!(engine.snapshot().resources, snap.resources);
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (engine, ctx, _) = engine();
        engine.start();
        ctx.sleep(Duration::from_millis(2000)).await;
        engine.stop();
        engine.start();

        // Seat 0 starts thinking again immediately, seat 4 only after 3200ms
        ctx.sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.state_of(0), PhilosopherState::Thinking);
        assert_eq!(engine.state_of(4), PhilosopherState::Uninitialized);
        assert_eq!(engine.pending_timers(), 5);
    }
}
