//! Synchronization: fold one build state into an issue's board.
//!
//! Each attempt is a straight line:
//!
//! 1. fetch the report comment (absent means an empty board)
//! 2. decode it
//! 3. upsert the incoming state
//! 4. encode, re-rendering the tables
//! 5. update the comment, or create it
//!
//! The store has no transactions, so a lost race shows up as
//! [`StoreError::Conflict`] at step 5. Conflicts and transient failures start
//! a fresh attempt from step 1 with jittered exponential backoff, so writers
//! that collided once drift apart instead of colliding again. Nothing carries
//! over between attempts, and the merge is idempotent, so replays converge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use backon::{BlockingRetryable, ExponentialBuilder};
use tracing::{debug, info, warn};

use crate::codec::{self, DecodeError};
use crate::model::{Document, State, Symbol};
use crate::render;
use crate::store::{CommentId, CommentStore, IssueRef, Notifier, StoreError};

/// Errors that end a synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("build state has an empty ID")]
    EmptyId,

    /// The board exists but can't be trusted; merging into it could lose data.
    #[error("cannot decode report comment: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl SyncError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

/// Bounds on how hard a synchronization tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Jittered exponential backoff: doubling from `initial_backoff` up to
    /// `max_backoff`, with one delay per retry after the first attempt.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(usize::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(usize::MAX))
            .with_jitter()
    }
}

/// Cooperative cancellation, checked before every fetch.
///
/// A submit that has started is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat the operation as cancelled once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[allow(dead_code)] // The CLI cancels by deadline only.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// What happened to the failure notice.
#[derive(Debug)]
pub enum NoticeOutcome {
    /// The build didn't fail, so no notice was due.
    NotNeeded,
    Posted(CommentId),
    /// The board was updated but the notice could not be posted.
    Failed(SyncError),
}

/// Result of a successful board update.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The report comment that now holds the state.
    pub comment: CommentId,
    /// Whether this call created the report comment.
    pub created: bool,
    /// Attempts used for the board update.
    pub attempts: u32,
    pub notice: NoticeOutcome,
}

/// Drives synchronization against a store.
pub struct Synchronizer<'a, S> {
    store: &'a S,
    policy: RetryPolicy,
    cancel: Cancellation,
}

impl<'a, S: CommentStore + Notifier> Synchronizer<'a, S> {
    pub fn new(store: &'a S, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Merge `incoming` into the issue's board, retrying lost races.
    ///
    /// When the build failed, a separate notice comment is posted after the
    /// board update, under its own retry budget. A notice failure is
    /// reported in [`SyncOutcome::notice`] and does not undo the update.
    pub fn synchronize(&self, issue: &IssueRef, incoming: &State) -> Result<SyncOutcome, SyncError> {
        if incoming.id.is_empty() {
            return Err(SyncError::EmptyId);
        }

        let ((comment, created), attempts) =
            self.with_retry("update board", || self.attempt(issue, incoming))?;
        info!(%issue, %comment, created, attempts, id = %incoming.id, "board updated");

        let notice = if incoming.symbol == Symbol::Failed {
            let body = render::render_notice(incoming);
            match self.with_retry("post failure notice", || {
                Ok(self.store.post_notice(issue, &body)?)
            }) {
                Ok((id, _)) => NoticeOutcome::Posted(id),
                Err(e) => NoticeOutcome::Failed(e),
            }
        } else {
            NoticeOutcome::NotNeeded
        };

        Ok(SyncOutcome {
            comment,
            created,
            attempts,
            notice,
        })
    }

    /// One fetch, merge, submit pass.
    fn attempt(&self, issue: &IssueRef, incoming: &State) -> Result<(CommentId, bool), SyncError> {
        let existing = self.store.find_report(issue)?;
        let mut doc = match &existing {
            Some(comment) => codec::decode(&comment.body)?,
            None => Document::default(),
        };

        doc.merge(incoming.clone());
        let body = codec::encode(&doc);
        debug!(%issue, reports = doc.reports().len(), "merged board");

        match existing {
            Some(base) => {
                self.store.update_report(issue, &base, &body)?;
                Ok((base.id, false))
            }
            None => Ok((self.store.create_report(issue, &body)?, true)),
        }
    }

    /// Run `op` until it succeeds, fails for good, or runs out of attempts.
    ///
    /// Returns the value and the number of attempts used. After the last
    /// attempt the last error is returned. Cancellation is checked before
    /// each attempt.
    fn with_retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<(T, u32), SyncError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        let result = (|| {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            debug!(what, attempt, max_attempts, "attempt");
            op()
        })
        .retry(self.policy.backoff())
        .sleep(thread::sleep)
        .when(SyncError::is_retryable)
        .notify(|e: &SyncError, delay: Duration| {
            warn!(what, max_attempts, ?delay, error = %e, "retrying");
        })
        .call();

        match result {
            Ok(value) => Ok((value, attempt)),
            Err(e) => {
                warn!(what, attempts = attempt, error = %e, "giving up");
                Err(e)
            }
        }
    }
}
