//! `buildboard show`: print the board as it stands.

use crate::codec;
use crate::render;
use crate::store::{CommentStore, IssueRef};

pub fn cmd_show<S: CommentStore>(store: &S, issue: &IssueRef, json: bool) -> Result<(), String> {
    match board(store, issue, json)? {
        Some(text) => print!("{text}"),
        None => eprintln!("No board on {issue}"),
    }
    Ok(())
}

/// The board as text, or `None` when the issue has no report comment.
fn board<S: CommentStore>(store: &S, issue: &IssueRef, json: bool) -> Result<Option<String>, String> {
    let Some(comment) = store
        .find_report(issue)
        .map_err(|e| format!("failed to fetch board from {issue}: {e}"))?
    else {
        return Ok(None);
    };

    let doc = codec::decode(&comment.body)
        .map_err(|e| format!("board on {issue} (comment {}) is unreadable: {e}", comment.id))?;

    let text = if json {
        let mut json = serde_json::to_string_pretty(doc.reports())
            .map_err(|e| format!("failed to serialize reports: {e}"))?;
        json.push('\n');
        json
    } else {
        render::render_board(doc.reports())
    };
    Ok(Some(text))
}
