//! Error types for the simulation engine.

use crate::config::ConfigError;
use dining_env::EnvError;
use thiserror::Error;

/// Errors raised while building an engine.
///
/// Once running, the engine has no error paths: a failed pair-acquire is an
/// expected outcome and a late timer is silently discarded.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The environment could not provide timers
    #[error("environment error: {0}")]
    Env(#[from] EnvError),
}
