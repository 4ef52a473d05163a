//! Runtime error types.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use gitmate_framework::RegistryError;

use crate::config::ConfigError;

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No responder registry was supplied to the builder.
    #[error("No responder registry configured")]
    MissingRegistry,

    /// The registry could not be built.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A periodic job could not be created, added or the scheduler failed.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    /// Shutdown signal handlers could not be installed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
