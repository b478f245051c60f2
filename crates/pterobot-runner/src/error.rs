//! Error types for the runner service.
//!
//! Only startup and connection failures surface here. Per-request problems
//! (denied callers, panel failures, notification failures) are answered
//! through the reply and never stop the service.

use pterobot_core::ConfigError;

/// Errors that stop the runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// The shutdown signal handler could not be installed.
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}
