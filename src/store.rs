//! Comment store: where boards live.
//!
//! A board is a single issue comment identified by the managed section
//! marker in its body. The store has no transactions; instead every
//! [`Comment`] remembers the revision of the body it was read with, and an
//! update against a stale revision fails with [`StoreError::Conflict`].
//! The synchronizer answers a conflict by fetching and merging again.

pub mod github;
#[cfg(test)]
pub mod memory;

use std::fmt;

use sha2::{Digest, Sha256};

pub use github::GitHubStore;

/// Errors reported by a comment store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The comment changed (or vanished) since it was read.
    #[error("report comment changed since it was read")]
    Conflict,

    /// A failure worth retrying: rate limits, server errors, timeouts.
    #[error("{0}")]
    Transient(String),

    /// A failure retrying won't fix: auth, permissions, bad requests.
    #[error("{0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether the synchronizer should start a new attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Transient(_))
    }
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// An issue in a repository: the parent of report and notice comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    /// `owner/name`.
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    /// Build an issue reference, validating the `owner/name` repo form.
    pub fn new(repo: &str, number: u64) -> core::result::Result<Self, String> {
        let valid = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            return Err(format!("repo must be in owner/name form, got '{repo}'"));
        }
        if number == 0 {
            return Err("issue number must be positive".to_string());
        }
        Ok(Self {
            repo: repo.to_string(),
            number,
        })
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// GitHub's numeric issue comment ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentId(pub u64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fingerprint of a comment body: hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(String);

impl Revision {
    pub fn of(body: &str) -> Self {
        Self(hex::encode(Sha256::digest(body.as_bytes())))
    }
}

/// A comment as read from the store.
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
    /// Revision of `body` at read time; the base for a later update.
    pub revision: Revision,
}

impl Comment {
    pub fn new(id: CommentId, body: String) -> Self {
        let revision = Revision::of(&body);
        Self { id, body, revision }
    }
}

/// The narrow contract the synchronizer needs from a board's home.
pub trait CommentStore {
    /// Find the issue's report comment, if one exists.
    fn find_report(&self, issue: &IssueRef) -> Result<Option<Comment>>;

    /// Create the issue's report comment.
    ///
    /// Fails with [`StoreError::Conflict`] if another writer created one
    /// after [`find_report`](Self::find_report) came back empty.
    fn create_report(&self, issue: &IssueRef, body: &str) -> Result<CommentId>;

    /// Replace the report comment's body.
    ///
    /// Fails with [`StoreError::Conflict`] if the remote body no longer
    /// matches `base.revision`, or the comment was deleted.
    fn update_report(&self, issue: &IssueRef, base: &Comment, body: &str) -> Result<()>;
}

/// Side channel for one-off alerts, outside the managed board.
pub trait Notifier {
    /// Post a new, separate comment on the issue.
    fn post_notice(&self, issue: &IssueRef, body: &str) -> Result<CommentId>;
}
