//! Engine configuration.
//!
//! The defaults reproduce the reference timing: five philosophers, five
//! seconds of thinking, four of eating, a constant 800ms retry backoff and
//! an 800ms start stagger between neighbours.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Number of philosophers (and resources) at the table.
pub const NUM_PHILOSOPHERS: usize = 5;

/// Time spent thinking before becoming hungry.
pub const THINKING_DURATION: Duration = Duration::from_millis(5000);

/// Time spent eating while holding both resources.
pub const EATING_DURATION: Duration = Duration::from_millis(4000);

/// Delay before retrying a failed pair-acquire.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(800);

/// Delay between becoming hungry and the first acquire attempt.
pub const HAND_OFF_DELAY: Duration = Duration::from_millis(100);

/// Start offset between consecutive philosophers.
pub const STAGGER_INTERVAL: Duration = Duration::from_millis(800);

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A ring needs at least two seats for every resource to be shared.
    #[error("at least 2 philosophers are required, got {0}")]
    TooFewPhilosophers(usize),

    /// A zero backoff would spin a hungry philosopher at a single instant.
    #[error("retry_backoff must be greater than zero")]
    ZeroRetryBackoff,

    /// A full think-eat cycle must take time, or a seat spins at one instant.
    #[error("thinking, hand-off and eating durations are all zero")]
    ZeroCycle,

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing and size parameters of one simulation.
///
/// Serialized with durations as integer milliseconds; missing fields take
/// their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of philosophers, equal to the number of resources
    pub num_philosophers: usize,

    /// Thinking duration
    #[serde(rename = "thinking_ms", with = "millis")]
    pub thinking_duration: Duration,

    /// Eating duration
    #[serde(rename = "eating_ms", with = "millis")]
    pub eating_duration: Duration,

    /// Constant backoff after a failed acquire
    #[serde(rename = "retry_backoff_ms", with = "millis")]
    pub retry_backoff: Duration,

    /// Delay between Thinking -> Hungry and the first acquire attempt
    #[serde(rename = "hand_off_ms", with = "millis")]
    pub hand_off_delay: Duration,

    /// Per-seat start offset (`i * stagger_interval`)
    #[serde(rename = "stagger_ms", with = "millis")]
    pub stagger_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_philosophers: NUM_PHILOSOPHERS,
            thinking_duration: THINKING_DURATION,
            eating_duration: EATING_DURATION,
            retry_backoff: RETRY_BACKOFF,
            hand_off_delay: HAND_OFF_DELAY,
            stagger_interval: STAGGER_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Loads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of philosophers.
    pub fn with_philosophers(mut self, n: usize) -> Self {
        self.num_philosophers = n;
        self
    }

    /// Sets the thinking duration.
    pub fn with_thinking(mut self, d: Duration) -> Self {
        self.thinking_duration = d;
        self
    }

    /// Sets the eating duration.
    pub fn with_eating(mut self, d: Duration) -> Self {
        self.eating_duration = d;
        self
    }

    /// Sets the retry backoff.
    pub fn with_retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = d;
        self
    }

    /// Sets the hand-off delay.
    pub fn with_hand_off(mut self, d: Duration) -> Self {
        self.hand_off_delay = d;
        self
    }

    /// Sets the start stagger.
    pub fn with_stagger(mut self, d: Duration) -> Self {
        self.stagger_interval = d;
        self
    }

    /// Checks the config can drive a simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_philosophers < 2 {
            return Err(ConfigError::TooFewPhilosophers(self.num_philosophers));
        }
        if self.retry_backoff.is_zero() {
            return Err(ConfigError::ZeroRetryBackoff);
        }
        if (self.thinking_duration + self.hand_off_delay + self.eating_duration).is_zero() {
            return Err(ConfigError::ZeroCycle);
        }
        if self.hand_off_delay >= self.thinking_duration {
            warn!(
                hand_off_ms = self.hand_off_delay.as_millis() as u64,
                thinking_ms = self.thinking_duration.as_millis() as u64,
                "hand-off delay is not shorter than the thinking duration"
            );
        }
        Ok(())
    }

    /// Left resource of philosopher `id` (same index).
    pub fn left_resource(&self, id: usize) -> usize {
        id
    }

    /// Right resource of philosopher `id` (next index, wrapping).
    pub fn right_resource(&self, id: usize) -> usize {
        (id + 1) % self.num_philosophers
    }

    /// Upper bound on philosophers eating at once: `floor(N / 2)`.
    pub fn max_concurrent_eaters(&self) -> usize {
        self.num_philosophers / 2
    }

    /// Start offset for philosopher `id`.
    pub fn start_offset(&self, id: usize) -> Duration {
        self.stagger_interval * id as u32
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
