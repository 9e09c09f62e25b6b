//! Philosopher state machine.
//!
//! ```text
//! Uninitialized ──► Thinking ──► Hungry ──► Eating ──► Thinking ──► ...
//!                                 │  ▲
//!                                 └──┘ failed pair-acquire, retry
//! ```
//!
//! One call to [`Philosopher::step`] applies exactly one rule. The engine
//! decides *when* a step happens (timers); the philosopher decides *what*
//! happens and how long until its next step.

use crate::config::EngineConfig;
use crate::observer::PhilosopherSnapshot;
use crate::ring::ResourceRing;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observable state of one philosopher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhilosopherState {
    /// Before the first tick of a run
    #[default]
    Uninitialized,
    Thinking,
    Hungry,
    /// Holding both adjacent resources
    Eating,
}

impl PhilosopherState {
    /// Returns true for the states reachable while the simulation runs.
    pub fn is_active(&self) -> bool {
        !matches!(self, PhilosopherState::Uninitialized)
    }
}

impl std::fmt::Display for PhilosopherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhilosopherState::Uninitialized => "uninitialized",
            PhilosopherState::Thinking => "thinking",
            PhilosopherState::Hungry => "hungry",
            PhilosopherState::Eating => "eating",
        };
        f.write_str(name)
    }
}

/// The outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Uninitialized -> Thinking
    Seated,

    /// Thinking -> Hungry
    Hungered,

    /// Hungry -> Eating, the pair was claimed
    Acquired { left: usize, right: usize },

    /// Hungry -> Hungry, the pair was not free
    Waiting { left: usize, right: usize, streak: u32 },

    /// Eating -> Thinking, the pair was returned
    Finished { left: usize, right: usize },
}

impl Transition {
    /// State before the step.
    pub fn from(&self) -> PhilosopherState {
        match self {
            Transition::Seated => PhilosopherState::Uninitialized,
            Transition::Hungered => PhilosopherState::Thinking,
            Transition::Acquired { .. } | Transition::Waiting { .. } => PhilosopherState::Hungry,
            Transition::Finished { .. } => PhilosopherState::Eating,
        }
    }

    /// State after the step.
    pub fn to(&self) -> PhilosopherState {
        match self {
            Transition::Seated | Transition::Finished { .. } => PhilosopherState::Thinking,
            Transition::Hungered | Transition::Waiting { .. } => PhilosopherState::Hungry,
            Transition::Acquired { .. } => PhilosopherState::Eating,
        }
    }

    /// Delay until the philosopher's next step.
    pub fn delay(&self, config: &EngineConfig) -> Duration {
        match self {
            Transition::Seated | Transition::Finished { .. } => config.thinking_duration,
            Transition::Hungered => config.hand_off_delay,
            Transition::Acquired { .. } => config.eating_duration,
            Transition::Waiting { .. } => config.retry_backoff,
        }
    }
}

/// One seat at the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Philosopher {
    id: usize,
    state: PhilosopherState,

    /// Pair claimed by the current eating episode
    held: Option<(usize, usize)>,

    meals: u64,
    failed_attempts: u64,

    /// Consecutive failed acquires in the current hungry episode
    hungry_streak: u32,
}

impl Philosopher {
    /// Creates an uninitialized philosopher at seat `id`.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: PhilosopherState::Uninitialized,
            held: None,
            meals: 0,
            failed_attempts: 0,
            hungry_streak: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> PhilosopherState {
        self.state
    }

    /// Resource pair held while eating.
    pub fn held(&self) -> Option<(usize, usize)> {
        self.held
    }

    /// Completed eating episodes.
    pub fn meals(&self) -> u64 {
        self.meals
    }

    /// Failed pair-acquires over the philosopher's lifetime.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    /// Failed pair-acquires since becoming hungry.
    pub fn hungry_streak(&self) -> u32 {
        self.hungry_streak
    }

    /// Applies one transition rule, touching the ring only when hungry or
    /// finishing a meal.
    pub fn step(&mut self, ring: &mut ResourceRing, config: &EngineConfig) -> Transition {
        match self.state {
            PhilosopherState::Uninitialized => {
                self.state = PhilosopherState::Thinking;
                Transition::Seated
            }
            PhilosopherState::Thinking => {
                self.state = PhilosopherState::Hungry;
                self.hungry_streak = 0;
                Transition::Hungered
            }
            PhilosopherState::Hungry => {
                let left = config.left_resource(self.id);
                let right = config.right_resource(self.id);
                if ring.try_acquire_pair(left, right) {
                    self.state = PhilosopherState::Eating;
                    self.held = Some((left, right));
                    self.hungry_streak = 0;
                    Transition::Acquired { left, right }
                } else {
                    self.failed_attempts += 1;
                    self.hungry_streak = self.hungry_streak.saturating_add(1);
                    Transition::Waiting {
                        left,
                        right,
                        streak: self.hungry_streak,
                    }
                }
            }
            PhilosopherState::Eating => {
                // `held` is always set on entry to Eating
                let (left, right) = self.held.take().unwrap_or_else(|| {
                    (config.left_resource(self.id), config.right_resource(self.id))
                });
                ring.release_pair(left, right);
                self.state = PhilosopherState::Thinking;
                self.meals += 1;
                Transition::Finished { left, right }
            }
        }
    }

    /// Read-only view for observers.
    pub fn snapshot(&self) -> PhilosopherSnapshot {
        PhilosopherSnapshot {
            id: self.id,
            state: self.state,
            meals: self.meals,
            failed_attempts: self.failed_attempts,
            hungry_streak: self.hungry_streak,
        }
    }
}
