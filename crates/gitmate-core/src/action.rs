//! Event kinds: the identifiers responders subscribe to.
//!
//! An [`EventKind`] comes in two flavours:
//!
//! - [`EventKind::Action`]: an enumerated, hosting-provider agnostic domain
//!   action such as `merge_request.opened` or `issue.weight_changed`.
//! - [`EventKind::Job`]: a free-form scheduled job name, conventionally
//!   `"<plugin>.<handler>"`.
//!
//! Both render to and parse from the same dotted string form:
//!
//! ```rust
//! use gitmate_core::{EventKind, MergeRequestAction};
//!
//! let kind: EventKind = "merge_request.opened".parse().unwrap();
//! assert_eq!(kind, EventKind::from(MergeRequestAction::Opened));
//!
//! let job: EventKind = "pr_stale_reminder.add_stale_label".parse().unwrap();
//! assert!(job.is_job());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EventKindError, UnknownAction};

// ============================================================================
// Action enums
// ============================================================================

macro_rules! define_actions {
    (
        $(#[$meta:meta])*
        $name:ident => $prefix:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// The dotted prefix shared by every action of this target.
            pub const PREFIX: &'static str = $prefix;

            /// The action name without its target prefix.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownAction;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(UnknownAction(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}.{}", $prefix, self.as_str())
            }
        }

        impl From<$name> for Action {
            fn from(action: $name) -> Self {
                Action::$name(action)
            }
        }

        impl From<$name> for EventKind {
            fn from(action: $name) -> Self {
                EventKind::Action(Action::$name(action))
            }
        }
    };
}

define_actions! {
    /// Actions on merge requests (pull requests on GitHub).
    MergeRequestAction => "merge_request" {
        Opened => "opened",
        Closed => "closed",
        Reopened => "reopened",
        Merged => "merged",
        /// New commits were pushed to the source branch.
        Synchronized => "synchronized",
        Commented => "commented",
        Labeled => "labeled",
        Unlabeled => "unlabeled",
        /// Title, description or other attributes were edited.
        AttributesChanged => "attributes_changed",
    }
}

define_actions! {
    /// Actions on issues.
    IssueAction => "issue" {
        Opened => "opened",
        Closed => "closed",
        Reopened => "reopened",
        Commented => "commented",
        Labeled => "labeled",
        Unlabeled => "unlabeled",
        AttributesChanged => "attributes_changed",
        /// GitLab only.
        WeightChanged => "weight_changed",
        AssigneesChanged => "assignees_changed",
    }
}

define_actions! {
    /// Commit status / CI pipeline actions.
    PipelineAction => "pipeline" {
        Updated => "updated",
    }
}

define_actions! {
    /// App installation actions (GitHub App installations).
    InstallationAction => "installation" {
        Created => "created",
        Deleted => "deleted",
        RepositoriesAdded => "repositories_added",
        RepositoriesRemoved => "repositories_removed",
    }
}

/// A provider agnostic domain action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::enum_variant_names)]
pub enum Action {
    MergeRequestAction(MergeRequestAction),
    IssueAction(IssueAction),
    PipelineAction(PipelineAction),
    InstallationAction(InstallationAction),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MergeRequestAction(a) => write!(f, "{a}"),
            Action::IssueAction(a) => write!(f, "{a}"),
            Action::PipelineAction(a) => write!(f, "{a}"),
            Action::InstallationAction(a) => write!(f, "{a}"),
        }
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(s.to_string());
        let (prefix, name) = s.split_once('.').ok_or_else(unknown)?;
        match prefix {
            MergeRequestAction::PREFIX => name.parse().map(Action::MergeRequestAction),
            IssueAction::PREFIX => name.parse().map(Action::IssueAction),
            PipelineAction::PREFIX => name.parse().map(Action::PipelineAction),
            InstallationAction::PREFIX => name.parse().map(Action::InstallationAction),
            _ => Err(unknown()),
        }
        .map_err(|_| unknown())
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Identifier for a class of occurrence a responder can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventKind {
    /// An enumerated domain action.
    Action(Action),
    /// A named scheduled job, conventionally `"<plugin>.<handler>"`.
    Job(String),
}

impl EventKind {
    /// Creates a job kind, validating the name.
    pub fn job(name: impl Into<String>) -> Result<Self, EventKindError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EventKindError::Empty);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(EventKindError::InvalidJobName(name));
        }
        Ok(EventKind::Job(name))
    }

    /// Returns `true` for the scheduled-job flavour.
    pub fn is_job(&self) -> bool {
        matches!(self, EventKind::Job(_))
    }

    /// Returns the domain action, if this is one.
    pub fn as_action(&self) -> Option<Action> {
        match self {
            EventKind::Action(action) => Some(*action),
            EventKind::Job(_) => None,
        }
    }

    /// The plugin a `"<plugin>.<handler>"` job name is scoped to.
    pub fn job_plugin(&self) -> Option<&str> {
        match self {
            EventKind::Job(name) => name.split_once('.').map(|(plugin, _)| plugin),
            EventKind::Action(_) => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Action(action) => write!(f, "{action}"),
            EventKind::Job(name) => f.write_str(name),
        }
    }
}

impl FromStr for EventKind {
    type Err = EventKindError;

    /// Strings naming a domain action become [`EventKind::Action`]; anything
    /// else is treated as a job name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Action>() {
            Ok(action) => Ok(EventKind::Action(action)),
            Err(_) => EventKind::job(s),
        }
    }
}

impl From<Action> for EventKind {
    fn from(action: Action) -> Self {
        EventKind::Action(action)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for EventKind {
    type Error = EventKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for EventKind {
    type Error = EventKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
