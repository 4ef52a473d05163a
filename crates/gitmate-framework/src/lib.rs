//! # GitMate Framework
//!
//! Responder registration and event dispatch for GitMate plugins.
//!
//! This layer provides:
//! - [`Signature`]: the declared parameters of a responder, and which of them
//!   are options
//! - [`Plugin`] and [`Responder`]: plugin declarations with a settings schema
//! - [`ResponderRegistry`]: the frozen table of responders, built once at startup
//! - [`LoopGuard`]: suppression of events caused by the bot's own comments
//! - [`Dispatcher`]: selection, option resolution and submission
//! - [`ExecutionBackend`], [`Executor`] and [`InlineBackend`]: isolated,
//!   time-limited execution of invocations
//!
//! The durable queue, worker pool and scheduler are built on top of this crate
//! in `gitmate-runtime`.

pub mod dispatcher;
pub mod error;
pub mod execution;
pub mod handler;
pub mod loop_guard;
pub mod plugin;
pub mod registry;
pub mod schedule;
pub mod signature;

pub use dispatcher::Dispatcher;
pub use error::{
    BoxError, ExtractError, ExtractResult, InvocationError, InvocationResult, RegistryError,
    RegistryResult, SubmitError, SubmitResult,
};
pub use execution::{
    ExecutionBackend, Executor, InlineBackend, Invocation, InvocationHandle, ResultSender,
    TaskQueue,
};
pub use handler::{Handler, ResponderContext, ResponderService, into_service};
pub use loop_guard::{DEFAULT_SIGNATURE, LoopGuard};
pub use plugin::{Plugin, PluginCatalog, PluginInfo, Responder, SettingsResolver};
pub use registry::{Registration, RegistryBuilder, ResponderRegistry};
pub use schedule::{JobTarget, Schedule, ScheduleEntry};
pub use signature::{Parameter, Signature};
