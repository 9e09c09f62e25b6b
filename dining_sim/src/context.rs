//! Simulation context implementing DiningContext for deterministic testing.

use async_trait::async_trait;
use dining_env::{CancelToken, DiningContext, TimerCallback, TimerHandle, TimerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// A timer waiting for the virtual clock to reach its deadline.
struct PendingTimer {
    deadline: Duration,

    /// Tie-break among equal deadlines (0 unless ties are shuffled)
    tie: u64,

    /// Scheduling order, the final tie-break
    seq: u64,

    id: TimerId,
    name: String,
    token: CancelToken,
    callback: TimerCallback,
}

impl PendingTimer {
    fn key(&self) -> (Duration, u64, u64) {
        (self.deadline, self.tie, self.seq)
    }
}

impl PartialEq for PendingTimer {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PendingTimer {}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

struct VirtualClock {
    now: Duration,
    next_seq: u64,
    pending: BinaryHeap<Reverse<PendingTimer>>,
    rng: ChaCha8Rng,
    shuffle_ties: bool,
    fired: u64,
}

/// Simulation context backed by a virtual clock and an event queue.
///
/// This implements `DiningContext` using:
/// - A virtual clock that only moves when the harness advances it
/// - A priority queue of pending timers ordered by deadline
/// - A seeded ChaCha8 RNG to (optionally) shuffle timers due at the same instant
///
/// Callbacks run synchronously inside [`SimContext::advance_time`], one at a
/// time, with the clock set to their deadline. They may schedule further
/// timers; those fire within the same advance if they fall due.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    clock: Arc<Mutex<VirtualClock>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    ///
    /// Timers due at the same instant fire in scheduling order.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: Arc::new(Mutex::new(VirtualClock {
                now: Duration::ZERO,
                next_seq: 0,
                pending: BinaryHeap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                shuffle_ties: false,
                fired: 0,
            })),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Fires timers due at the same instant in a seed-determined random
    /// order instead of scheduling order.
    pub fn with_shuffled_ties(self) -> Self {
        lock(&self.clock).shuffle_ties = true;
        self
    }

    /// Advances virtual time by `duration`, firing every timer that falls due.
    ///
    /// Returns the number of callbacks run.
    pub fn advance_time(&self, duration: Duration) -> usize {
        let target = lock(&self.clock).now + duration;
        self.advance_to(target)
    }

    /// Advances virtual time to `target` (no-op if already past it).
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;

        loop {
            let timer = {
                let mut clock = lock(&self.clock);
                let due = clock
                    .pending
                    .peek()
                    .is_some_and(|Reverse(next)| next.deadline <= target);
                if !due {
                    clock.now = clock.now.max(target);
                    break;
                }
                let Some(Reverse(timer)) = clock.pending.pop() else {
                    break;
                };
                clock.now = clock.now.max(timer.deadline);
                timer
            };

            if timer.token.is_cancelled() {
                continue;
            }

            trace!(
                timer = %timer.id,
                name = %timer.name,
                at_ms = timer.deadline.as_millis() as u64,
                "virtual timer fired"
            );
            (timer.callback)();
            fired += 1;
            lock(&self.clock).fired += 1;
        }

        fired
    }

    /// Number of scheduled timers that have not fired or been cancelled.
    pub fn pending_timers(&self) -> usize {
        lock(&self.clock)
            .pending
            .iter()
            .filter(|Reverse(t)| !t.token.is_cancelled())
            .count()
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        lock(&self.clock)
            .pending
            .iter()
            .filter(|Reverse(t)| !t.token.is_cancelled())
            .map(|Reverse(t)| t.deadline)
            .min()
    }

    /// Total callbacks run since creation.
    pub fn fired_count(&self) -> u64 {
        lock(&self.clock).fired
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl DiningContext for SimContext {
    fn now(&self) -> Duration {
        lock(&self.clock).now
    }

    async fn sleep(&self, duration: Duration) {
        // Completes once someone advances the clock past the deadline
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _timer = self.schedule(
            "sleep",
            duration,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        let _ = rx.await;
    }

    fn schedule(&self, name: &str, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut clock = lock(&self.clock);
        let seq = clock.next_seq;
        clock.next_seq += 1;

        let tie = if clock.shuffle_ties { clock.rng.gen() } else { 0 };
        let id = TimerId(seq);
        let token = CancelToken::new();
        let deadline = clock.now + delay;

        clock.pending.push(Reverse(PendingTimer {
            deadline,
            tie,
            seq,
            id,
            name: name.to_string(),
            token: token.clone(),
            callback,
        }));

        TimerHandle::new(id, token)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(ctx: &SimContext, log: &Arc<Mutex<Vec<u32>>>, label: u32, delay_ms: u64) -> TimerHandle {
        let log = log.clone();
        ctx.schedule(
            "test",
            Duration::from_millis(delay_ms),
            Box::new(move || log.lock().unwrap().push(label)),
        )
    }

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let ctx = SimContext::new(42);
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&ctx, &log, 3, 300);
        recorder(&ctx, &log, 1, 100);
        recorder(&ctx, &log, 2, 200);

        assert_eq!(ctx.advance_time(Duration::from_millis(150)), 1);
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(ctx.pending_timers(), 2);
        assert_eq!(ctx.next_deadline(), Some(Duration::from_millis(200)));

        assert_eq!(ctx.advance_time(Duration::from_secs(1)), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(ctx.fired_count(), 3);
    }

    #[test]
    fn test_equal_deadlines_fire_fifo() {
        let ctx = SimContext::new(42);
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in 0..5 {
            recorder(&ctx, &log, label, 100);
        }

        ctx.advance_time(Duration::from_millis(100));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffled_ties_are_seed_deterministic() {
        let order = |seed: u64| {
            let ctx = SimContext::new(seed).with_shuffled_ties();
            let log = Arc::new(Mutex::new(Vec::new()));
            for label in 0..5 {
                recorder(&ctx, &log, label, 100);
            }
            ctx.advance_time(Duration::from_millis(100));
            let fired = log.lock().unwrap().clone();
            fired
        };

        assert_eq!(order(7), order(7));
        let fifo: Vec<u32> = (0..5).collect();
        assert!((0..20).any(|seed| order(seed) != fifo));
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let ctx = SimContext::new(42);
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = recorder(&ctx, &log, 1, 100);
        recorder(&ctx, &log, 2, 100);
        handle.cancel();

        assert_eq!(ctx.pending_timers(), 1);
        assert_eq!(ctx.advance_time(Duration::from_secs(1)), 1);
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_callbacks_can_schedule_within_same_advance() {
        let ctx = SimContext::shared(42);
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_ctx = ctx.clone();
        let inner_log = log.clone();
        ctx.schedule(
            "outer",
            Duration::from_millis(100),
            Box::new(move || {
                inner_log.lock().unwrap().push(inner_ctx.now().as_millis() as u32);
                let log = inner_log.clone();
                let at = inner_ctx.clone();
                inner_ctx.schedule(
                    "inner",
                    Duration::from_millis(50),
                    Box::new(move || log.lock().unwrap().push(at.now().as_millis() as u32)),
                );
            }),
        );

        ctx.advance_time(Duration::from_millis(200));
        assert_eq!(*log.lock().unwrap(), vec![100, 150]);
        assert_eq!(ctx.now(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_sleep_completes_when_clock_advances() {
        let ctx = SimContext::new(42);
        tokio::join!(ctx.sleep(Duration::from_secs(1)), async {
            tokio::task::yield_now().await;
            ctx.advance_time(Duration::from_secs(1));
        });
        assert_eq!(ctx.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_sim_context_seed_and_clone_share_clock() {
        let ctx1 = SimContext::new(12345);
        let ctx2 = ctx1.clone();
        assert_eq!(ctx2.seed(), 12345);

        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx1.now(), ctx2.now());
    }
}
