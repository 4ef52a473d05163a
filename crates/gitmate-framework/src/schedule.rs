//! Periodic triggers declared by plugins.

use std::fmt;
use std::time::Duration;

use gitmate_core::EventKind;

/// When a periodic job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// A fixed interval.
    Every(Duration),
    /// A cron expression with a leading seconds field, e.g. `"0 0 6,18 * * *"`.
    Cron(String),
}

impl Schedule {
    pub fn every(interval: Duration) -> Self {
        Schedule::Every(interval)
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron(expression.into())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(interval) => write!(f, "every {interval:?}"),
            Schedule::Cron(expression) => write!(f, "cron '{expression}'"),
        }
    }
}

/// What a tick of a scheduled job dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTarget {
    /// Dispatch the job kind once, with no arguments and no repository.
    Bare,
    /// Dispatch the job kind once per stored repository that has the plugin
    /// enabled and whose activation state equals `repo_active`.
    Repositories { repo_active: bool },
}

/// A periodic trigger, as collected by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Plugin that declared the job.
    pub plugin: String,
    /// The job kind each tick dispatches, `"<plugin>.<name>"`.
    pub kind: EventKind,
    pub schedule: Schedule,
    pub target: JobTarget,
}
