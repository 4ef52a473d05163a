//! Configuration module for the GitMate runtime.
//!
//! This module provides layered TOML/YAML/environment configuration loading
//! and validation for logging, the bot identity, execution and scheduling.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotConfig, ExecutionConfig, GitmateConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SchedulerConfig, SpanEventConfig, WorkerConfig,
};
pub use validation::validate_config;
