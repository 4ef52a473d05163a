//! # GitMate Core
//!
//! Domain model shared by the GitMate responder crates.
//!
//! This crate knows nothing about plugins, queues or scheduling. It defines the
//! vocabulary the other layers speak:
//!
//! - **Event kinds**: enumerated domain actions and named scheduled jobs
//!   ([`EventKind`], [`Action`])
//! - **Domain objects**: provider-agnostic snapshots of merge requests, issues,
//!   comments and commits, wrapped as positional [`EventArg`]s
//! - **Repository context**: the read-only view of a repository's enabled
//!   plugins and stored settings ([`RepositoryContext`], [`Repository`])
//!
//! ## Example
//!
//! ```rust
//! use gitmate_core::{EventKind, MergeRequestAction, Repository, RepositoryContext};
//!
//! let kind = EventKind::from(MergeRequestAction::Opened);
//! assert_eq!(kind.to_string(), "merge_request.opened");
//!
//! let repo = Repository::new("gitmate/test").with_plugin("welcome_commenter");
//! assert!(repo.has_plugin("welcome_commenter"));
//! ```

pub mod action;
pub mod domain;
pub mod error;
pub mod repository;

pub use action::{
    Action, EventKind, InstallationAction, IssueAction, MergeRequestAction, PipelineAction,
};
pub use domain::{
    Comment, CommentKind, Commit, EventArg, Hoster, Installation, Issue, IssueState,
    MergeRequest, MergeRequestState, RepositoryHandle, User,
};
pub use error::{EventKindError, RepositoryError, RepositoryResult, UnknownAction};
pub use repository::{PluginSettings, Repository, RepositoryContext};

/// Prelude for common imports.
pub mod prelude {
    pub use super::action::*;
    pub use super::domain::*;
    pub use super::repository::{PluginSettings, Repository, RepositoryContext};
}
