//! Codec: report comment text to and from a [`Document`].
//!
//! A board comment looks like this:
//!
//! ```text
//! <free text written by humans>
//! <!-- buildboard:section-begin -->
//! <!-- buildboard:data
//! [{"ID":"1234", ...}]
//! buildboard:data-end -->
//! <rendered tables>
//! <!-- buildboard:section-end -->
//! <more free text>
//! ```
//!
//! The markers are HTML comments, so a markdown viewer shows only the free
//! text and the tables. Free text on either side round-trips byte for byte.
//! Marker tokens inside free text are not supported.
//!
//! Markers carry no line endings of their own. Editing the comment in a
//! browser rewrites every `\n` as `\r\n`, and the board must still decode.

use std::collections::HashSet;

use crate::model::{Document, State};
use crate::render;

pub const SECTION_BEGIN: &str = "<!-- buildboard:section-begin -->";
pub const SECTION_END: &str = "<!-- buildboard:section-end -->";
pub const DATA_BEGIN: &str = "<!-- buildboard:data";
pub const DATA_END: &str = "buildboard:data-end -->";

/// Shared by both data markers. Its presence means the section claims data.
const DATA_TOKEN: &str = "buildboard:data";

/// Errors that make a comment's managed section untrustworthy.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("report section is not terminated")]
    UnterminatedSection,

    #[error("report data is not terminated")]
    UnterminatedData,

    #[error("report data marker is damaged")]
    DamagedData,

    #[error("report data has an entry with an empty ID")]
    EmptyId,

    #[error("report data has more than one entry for ID {0:?}")]
    DuplicateId(String),

    #[error("invalid report data: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Whether the text carries a managed section.
pub fn has_section(text: &str) -> bool {
    text.contains(SECTION_BEGIN)
}

/// Parse comment text into a document.
///
/// Text without a managed section decodes to a document whose `before` is
/// the whole input and whose reports are `None`.
pub fn decode(text: &str) -> Result<Document, DecodeError> {
    let Some(start) = text.find(SECTION_BEGIN) else {
        return Ok(Document {
            before: text.to_string(),
            ..Document::default()
        });
    };

    let before = &text[..start];
    let rest = &text[start + SECTION_BEGIN.len()..];
    let end = rest
        .find(SECTION_END)
        .ok_or(DecodeError::UnterminatedSection)?;
    let section = &rest[..end];
    let after = &rest[end + SECTION_END.len()..];

    Ok(Document {
        before: before.to_string(),
        after: after.to_string(),
        reports: decode_section(section)?,
    })
}

fn decode_section(section: &str) -> Result<Option<Vec<State>>, DecodeError> {
    let Some(start) = section.find(DATA_BEGIN) else {
        if section.contains(DATA_TOKEN) {
            return Err(DecodeError::DamagedData);
        }
        return Ok(None);
    };
    let rest = &section[start + DATA_BEGIN.len()..];
    let end = rest.find(DATA_END).ok_or(DecodeError::UnterminatedData)?;

    let payload = rest[..end].trim();
    if payload.is_empty() {
        return Ok(None);
    }
    // A JSON `null` deserializes to `None` here.
    let reports: Option<Vec<State>> = serde_json::from_str(payload)?;
    if let Some(reports) = &reports {
        check_ids(reports)?;
    }
    Ok(reports)
}

/// Merging keys on the ID, so a hand-edited list with a blank or repeated
/// ID can't be merged into safely.
fn check_ids(reports: &[State]) -> Result<(), DecodeError> {
    let mut seen = HashSet::with_capacity(reports.len());
    for state in reports {
        if state.id.is_empty() {
            return Err(DecodeError::EmptyId);
        }
        if !seen.insert(state.id.as_str()) {
            return Err(DecodeError::DuplicateId(state.id.clone()));
        }
    }
    Ok(())
}

/// Serialize a document back into comment text.
///
/// Missing reports are written as an empty list, never `null`, so the
/// output always decodes to a present (possibly empty) report list.
pub fn encode(doc: &Document) -> String {
    let reports = doc.reports();
    let table = render::render_board(reports);
    let payload = encode_payload(reports);

    let mut out = String::with_capacity(
        doc.before.len() + doc.after.len() + table.len() + payload.len() + 128,
    );
    out.push_str(&doc.before);
    out.push_str(SECTION_BEGIN);
    out.push('\n');
    out.push_str(DATA_BEGIN);
    out.push('\n');
    out.push_str(&payload);
    out.push('\n');
    out.push_str(DATA_END);
    out.push('\n');
    out.push_str(&table);
    out.push_str(SECTION_END);
    out.push_str(&doc.after);
    out
}

/// JSON array of reports with HTML-sensitive characters escaped.
///
/// Escaping `<`, `>` and `&` keeps user text such as `-->` from closing the
/// enclosing comment. These characters only occur inside JSON strings, where
/// `\u` escapes are valid.
fn encode_payload(reports: &[State]) -> String {
    let json =
        serde_json::to_string(reports).expect("reports hold only strings and timestamps");
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            c => escaped.push(c),
        }
    }
    escaped
}
