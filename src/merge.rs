//! Merge: apply one incoming state to a board's report list.
//!
//! Identity is the build ID alone. The most recent writer's labels win,
//! except that an unset start time never erases a recorded one. Applying
//! the same state twice gives the same list, so a failed submit can simply
//! re-fetch and merge again.

use crate::model::State;

/// Insert `incoming`, or update the entry with the same ID in place.
///
/// New IDs are appended, so the list keeps first-insert order.
pub fn upsert(reports: &mut Vec<State>, incoming: State) {
    let Some(existing) = reports.iter_mut().find(|s| s.id == incoming.id) else {
        reports.push(incoming);
        return;
    };

    existing.name = incoming.name;
    existing.version = incoming.version;
    existing.url = incoming.url;
    existing.symbol = incoming.symbol;
    existing.last_update = incoming.last_update;
    if incoming.start_time.is_some() {
        existing.start_time = incoming.start_time;
    }
}
