//! In-memory comment store for exercising the synchronizer.
//!
//! Holds the comments of a single issue and follows the same revision rules
//! as the GitHub store. Failures and interleaved writers can be scripted.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::codec;

use super::{Comment, CommentId, CommentStore, IssueRef, Notifier, Result, StoreError};

type Interleave = Box<dyn FnMut(&mut Vec<Comment>)>;

#[derive(Default)]
pub struct MemoryStore {
    comments: RefCell<Vec<Comment>>,
    next_id: Cell<u64>,
    fetches: Cell<u32>,
    submit_failures: RefCell<VecDeque<StoreError>>,
    notice_failures: RefCell<VecDeque<StoreError>>,
    interleave: RefCell<Option<Interleave>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the issue with an existing comment.
    pub fn with_comment(self, body: &str) -> Self {
        self.push(body);
        self
    }

    /// Fail the next create or update with `err` before it takes effect.
    pub fn fail_next_submit(&self, err: StoreError) {
        self.submit_failures.borrow_mut().push_back(err);
    }

    /// Fail the next notice with `err`.
    pub fn fail_next_notice(&self, err: StoreError) {
        self.notice_failures.borrow_mut().push_back(err);
    }

    /// Let another writer touch the comments once, right before the next
    /// submit checks its base revision.
    pub fn interleave(&self, f: impl FnMut(&mut Vec<Comment>) + 'static) {
        *self.interleave.borrow_mut() = Some(Box::new(f));
    }

    /// Body of the report comment, if there is one.
    pub fn report_body(&self) -> Option<String> {
        self.comments
            .borrow()
            .iter()
            .find(|c| codec::has_section(&c.body))
            .map(|c| c.body.clone())
    }

    /// Bodies of all comments, in posting order.
    pub fn bodies(&self) -> Vec<String> {
        self.comments.borrow().iter().map(|c| c.body.clone()).collect()
    }

    /// Number of report lookups so far.
    pub fn fetches(&self) -> u32 {
        self.fetches.get()
    }

    fn push(&self, body: &str) -> CommentId {
        let id = CommentId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.comments
            .borrow_mut()
            .push(Comment::new(id, body.to_string()));
        id
    }

    fn before_submit(&self) -> Result<()> {
        if let Some(mut f) = self.interleave.borrow_mut().take() {
            f(&mut self.comments.borrow_mut());
        }
        match self.submit_failures.borrow_mut().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl CommentStore for MemoryStore {
    fn find_report(&self, _issue: &IssueRef) -> Result<Option<Comment>> {
        self.fetches.set(self.fetches.get() + 1);
        Ok(self
            .comments
            .borrow()
            .iter()
            .find(|c| codec::has_section(&c.body))
            .cloned())
    }

    fn create_report(&self, _issue: &IssueRef, body: &str) -> Result<CommentId> {
        self.before_submit()?;
        if self.comments.borrow().iter().any(|c| codec::has_section(&c.body)) {
            return Err(StoreError::Conflict);
        }
        Ok(self.push(body))
    }

    fn update_report(&self, _issue: &IssueRef, base: &Comment, body: &str) -> Result<()> {
        self.before_submit()?;
        let mut comments = self.comments.borrow_mut();
        let current = comments
            .iter_mut()
            .find(|c| c.id == base.id)
            .ok_or(StoreError::Conflict)?;
        if current.revision != base.revision {
            return Err(StoreError::Conflict);
        }
        *current = Comment::new(base.id, body.to_string());
        Ok(())
    }
}

impl Notifier for MemoryStore {
    fn post_notice(&self, _issue: &IssueRef, body: &str) -> Result<CommentId> {
        if let Some(err) = self.notice_failures.borrow_mut().pop_front() {
            return Err(err);
        }
        Ok(self.push(body))
    }
}
