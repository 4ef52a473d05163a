//! # GitMate
//!
//! The event dispatch and responder registry core of the GitMate code-review
//! bot.
//!
//! ## Overview
//!
//! Plugins declare responders: async functions subscribed to event kinds such
//! as `merge_request.opened`, or to named scheduled jobs. Per-repository
//! settings are matched against each responder's declared options, and every
//! selected responder is submitted to a work queue for isolated,
//! time-limited execution.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌───────────┐     ┌─────────────┐
//! │ Webhooks │────▶│            │     │           │     │ short  ×4   │
//! └──────────┘     │ Dispatcher │────▶│ WorkQueue │────▶│ long   ×1   │──▶ responders
//! ┌──────────┐     │            │     │           │     │ analysis ×1 │
//! │Scheduler │────▶│            │     └───────────┘     └─────────────┘
//! └──────────┘     └────────────┘                         WorkerPool
//! ```
//!
//! - **Registry**: built once at startup, frozen afterwards
//! - **Dispatcher**: loop-guard, selection by the repository's enabled
//!   plugins, option resolution, submission
//! - **Workers**: one pool per task queue, acknowledging after execution
//! - **Scheduler**: bare jobs and broadcasts over every repository with a
//!   plugin enabled
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gitmate::prelude::*;
//!
//! async fn greet(ctx: ResponderContext) -> Result<(), BoxError> {
//!     let mr = ctx.merge_request(0)?;
//!     let greeting: String = ctx.option("greeting")?;
//!     info!(number = mr.number, %greeting, "Greeting new merge request");
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = ResponderRegistry::builder();
//!     registry.install(
//!         Plugin::new("welcome_commenter").setting("greeting", "hi").responder(
//!             [MergeRequestAction::Opened],
//!             Responder::new("greet", greet)
//!                 .signature(Signature::new().arg("pr").option("greeting", "hi")),
//!         ),
//!     )?;
//!
//!     let runtime = GitmateRuntime::builder().registry(registry.build()).build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use gitmate_core as core;
pub use gitmate_framework as framework;
pub use gitmate_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gitmate::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use gitmate_runtime::{GitmateRuntime, MemoryRepositoryStore, RepositoryStore};

    // Plugin declarations
    pub use gitmate_framework::{
        BoxError, Plugin, Responder, ResponderContext, ResponderRegistry, Schedule, Signature,
    };

    // Dispatch
    pub use gitmate_framework::{Dispatcher, InvocationError, InvocationHandle};

    // Domain model
    pub use gitmate_core::prelude::*;

    // Logging macros
    pub use gitmate_runtime::prelude::*;
}
