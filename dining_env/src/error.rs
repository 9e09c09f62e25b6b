//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No async runtime is available to drive timers
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}
