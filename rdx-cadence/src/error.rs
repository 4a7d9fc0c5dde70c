//! Error types for the scheduler and its reactors.

use thiserror::Error;

/// Failures raised by a `Reactor` implementation.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("reactor is not running")]
    NotRunning,

    #[error("reactor is already running")]
    AlreadyRunning,

    #[error("periodic timers need a non-zero interval")]
    ZeroInterval,

    #[error("failed to build reactor runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Failures raised by the `Scheduler`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no interval named '{0}' is configured")]
    UnknownInterval(String),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
