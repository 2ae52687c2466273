//! Document: a report comment split into free text and managed reports.

use super::State;

/// A report comment as seen by the synchronizer.
///
/// Built fresh from remote text on every attempt and discarded once the
/// re-encoded text is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Free text before the managed section, preserved verbatim.
    pub before: String,

    /// Free text after the managed section, preserved verbatim.
    pub after: String,

    /// Reported builds in first-insert order, unique by ID.
    ///
    /// `None` means the comment has no managed data yet, which is distinct
    /// from a managed section holding an empty list.
    pub reports: Option<Vec<State>>,
}

impl Document {
    /// Upsert a state into this document's reports.
    pub fn merge(&mut self, incoming: State) {
        crate::merge::upsert(self.reports.get_or_insert_with(Vec::new), incoming);
    }

    /// The reports, treating a missing section as empty.
    pub fn reports(&self) -> &[State] {
        self.reports.as_deref().unwrap_or_default()
    }
}
