//! GitMate Runtime - Orchestration layer for the GitMate responder core.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `GitmateConfig`)
//! - Logging configuration (`LoggingBuilder`)
//! - A bounded, acknowledging work queue with one lane per task queue
//!   (`MemoryQueue`)
//! - The queue-backed execution backend and its worker pool (`QueueBackend`,
//!   `WorkerPool`)
//! - Periodic jobs and repository broadcasts (`Scheduler`)
//! - Runtime orchestration (`GitmateRuntime`)
//!
//! ```ignore
//! use gitmate_runtime::GitmateRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = ResponderRegistry::builder();
//!     registry.install(pr_stale::plugin())?;
//!
//!     let runtime = GitmateRuntime::builder()
//!         .registry(registry.build())
//!         .repositories(store)
//!         .build()?;
//!
//!     // Webhook handlers feed `runtime.dispatcher()`.
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Delivery
//!
//! Invocations are serialized onto the queue and acknowledged only after a
//! worker has executed them. A delivery dropped before acknowledgement (for
//! example because its worker was aborted) goes back to the front of its lane
//! and is executed again with an incremented attempt number.

pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod worker;

// Re-exports
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, ExecutionConfig, GitmateConfig,
    LoggingConfig, Profile, SchedulerConfig, WorkerConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use queue::{Delivery, MemoryQueue, Message, QueueError, QueueResult, WorkQueue};
pub use runtime::{GitmateRuntime, RuntimeBuilder};
pub use scheduler::{MemoryRepositoryStore, RepositoryStore, Scheduler, broadcast, tick};
pub use worker::{PendingResults, QueueBackend, WorkerPool};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
