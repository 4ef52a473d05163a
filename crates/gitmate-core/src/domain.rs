//! Canonical domain objects handed to responders as positional arguments.
//!
//! These are plain data snapshots built by the webhook-ingestion layer after
//! payload parsing. They carry no hosting-provider client and can therefore be
//! serialized into the durable work queue.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The hosting provider a domain object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hoster {
    GitHub,
    GitLab,
}

/// Handle to a repository on its hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub hoster: Hoster,
    /// `owner/name`
    pub full_name: String,
    /// Provider-side numeric identifier.
    pub identifier: u64,
}

impl RepositoryHandle {
    pub fn new(hoster: Hoster, full_name: impl Into<String>, identifier: u64) -> Self {
        Self {
            hoster,
            full_name: full_name.into(),
            identifier,
        }
    }
}

/// A user account on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub hoster: Hoster,
    pub username: String,
}

/// What a comment was posted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    MergeRequest,
    Issue,
    Commit,
}

/// A comment on a merge request, issue or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub repository: RepositoryHandle,
    pub kind: CommentKind,
    /// Number of the merge request or issue the comment belongs to.
    pub number: u64,
    pub author: User,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRequestState {
    Open,
    Closed,
    Merged,
}

/// A merge request (pull request on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub repository: RepositoryHandle,
    pub number: u64,
    pub title: String,
    pub state: MergeRequestState,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub head_sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// An issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub repository: RepositoryHandle,
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Issue weight; only GitLab supports weights.
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub assignees: BTreeSet<String>,
}

/// A commit, as seen by pipeline (commit status) events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub repository: RepositoryHandle,
    pub sha: String,
    pub message: String,
}

/// A GitHub App installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub hoster: Hoster,
    pub identifier: u64,
}

// ============================================================================
// EventArg
// ============================================================================

/// One positional argument of an event.
///
/// Events are dispatched as `(EventKind, Vec<EventArg>)`. The leading arguments
/// are domain objects; trailing ones are often scalars such as the label that
/// was added or the set of new assignees, carried as [`EventArg::Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventArg {
    Repository(RepositoryHandle),
    MergeRequest(MergeRequest),
    Issue(Issue),
    Comment(Comment),
    Commit(Commit),
    User(User),
    Installation(Installation),
    Value(Value),
}

impl EventArg {
    pub fn as_repository(&self) -> Option<&RepositoryHandle> {
        match self {
            EventArg::Repository(repo) => Some(repo),
            _ => None,
        }
    }

    pub fn as_merge_request(&self) -> Option<&MergeRequest> {
        match self {
            EventArg::MergeRequest(mr) => Some(mr),
            _ => None,
        }
    }

    pub fn as_issue(&self) -> Option<&Issue> {
        match self {
            EventArg::Issue(issue) => Some(issue),
            _ => None,
        }
    }

    pub fn as_comment(&self) -> Option<&Comment> {
        match self {
            EventArg::Comment(comment) => Some(comment),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            EventArg::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            EventArg::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the string if this argument is a string value.
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }
}

macro_rules! impl_from_domain {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl From<$ty> for EventArg {
                fn from(value: $ty) -> Self {
                    EventArg::$ty(value)
                }
            }
        )+
    };
}

impl_from_domain!(MergeRequest, Issue, Comment, Commit, User, Installation);

impl From<RepositoryHandle> for EventArg {
    fn from(value: RepositoryHandle) -> Self {
        EventArg::Repository(value)
    }
}

impl From<Value> for EventArg {
    fn from(value: Value) -> Self {
        EventArg::Value(value)
    }
}

impl From<&str> for EventArg {
    fn from(value: &str) -> Self {
        EventArg::Value(Value::String(value.to_string()))
    }
}

impl From<String> for EventArg {
    fn from(value: String) -> Self {
        EventArg::Value(Value::String(value))
    }
}
