//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gitmate_framework::{DEFAULT_SIGNATURE, TaskQueue};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitmateConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity of the bot account.
    #[serde(default)]
    pub bot: BotConfig,

    /// Queue and worker settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Periodic job settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file when `output = "file"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG`.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `gitmate_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// Bot identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Marker the bot appends to its comments. Events carrying a comment with
    /// this marker are not dispatched.
    #[serde(default = "default_signature")]
    pub signature: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            signature: default_signature(),
        }
    }
}

fn default_signature() -> String {
    DEFAULT_SIGNATURE.to_string()
}

// =============================================================================
// Execution
// =============================================================================

/// Queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard time limit per invocation in seconds.
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u64,

    /// Maximum number of pending deliveries per task queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a submission waits for queue capacity, in milliseconds.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,

    #[serde(default)]
    pub workers: WorkerConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: default_time_limit_secs(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            workers: WorkerConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

fn default_time_limit_secs() -> u64 {
    3600
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_enqueue_timeout_ms() -> u64 {
    5000
}

/// Number of workers consuming each task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_short_workers")]
    pub short: usize,
    #[serde(default = "default_single_worker")]
    pub long: usize,
    #[serde(default = "default_single_worker")]
    pub analysis: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            short: default_short_workers(),
            long: default_single_worker(),
            analysis: default_single_worker(),
        }
    }
}

impl WorkerConfig {
    /// Returns the worker count for `queue`.
    pub fn for_queue(&self, queue: TaskQueue) -> usize {
        match queue {
            TaskQueue::Short => self.short,
            TaskQueue::Long => self.long,
            TaskQueue::Analysis => self.analysis,
        }
    }
}

fn default_short_workers() -> usize {
    4
}

fn default_single_worker() -> usize {
    1
}

// =============================================================================
// Scheduler
// =============================================================================

/// Periodic job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether scheduled jobs run at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
