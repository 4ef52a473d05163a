//! Suppression of events caused by the bot's own comments.
//!
//! Every comment the bot posts ends with a signature line. When such a comment
//! comes back as a `commented` event, dispatching it could trigger another
//! comment, and so on. The guard vetoes any event whose positional arguments
//! contain a comment carrying the signature.
//!
//! The check is a plain substring match on the comment body. It does not look
//! at the comment's author.

use gitmate_core::EventArg;

/// Signature the bot appends to its comments.
pub const DEFAULT_SIGNATURE: &str = "Powered by [GitMate.io]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopGuard {
    signature: String,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE)
    }
}

impl LoopGuard {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns `true` if any argument is a comment carrying the signature.
    pub fn vetoes(&self, args: &[EventArg]) -> bool {
        args.iter()
            .filter_map(EventArg::as_comment)
            .any(|comment| comment.body.contains(&self.signature))
    }
}
