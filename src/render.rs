//! Rendering: the human-readable view of a board.
//!
//! The embedded payload is the source of truth; the tables rendered here are
//! only a view of it, rebuilt from scratch on every write. Output depends on
//! nothing but the report list, so an unchanged list renders byte-identically.

use std::fmt::Write;

use jiff::Timestamp;

use crate::model::{State, Symbol};

/// Heading used for reports without a version.
const UNGROUPED: &str = "Ungrouped";

/// Rendered in place of tables when there is nothing to show.
const EMPTY_BOARD: &str = "_No builds reported yet._\n";

const TABLE_HEADER: &str = "| Pipeline | Status | Build | Started | Last update |\n\
                            | --- | :---: | --- | --- | --- |\n";

/// Render reports as markdown tables, one per version group.
///
/// Groups appear in the order their version first occurs in the list, and
/// rows keep list order within a group.
pub fn render_board(reports: &[State]) -> String {
    if reports.is_empty() {
        return EMPTY_BOARD.to_string();
    }

    let mut out = String::new();
    for (i, (version, rows)) in group_by_version(reports).into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let heading = if version.is_empty() {
            UNGROUPED
        } else {
            version
        };
        let _ = write!(out, "### {}\n\n", escape(heading));
        out.push_str(TABLE_HEADER);
        for state in rows {
            render_row(&mut out, state);
        }
    }
    out
}

/// Render the body of a one-off failure notice for a single build.
pub fn render_notice(state: &State) -> String {
    format!(
        "Build failure: {}\n\n{}",
        escape(&state.name),
        render_board(std::slice::from_ref(state))
    )
}

/// The glyph shown in the status column.
///
/// Custom statuses are shown as their raw text.
pub fn glyph(symbol: &Symbol) -> String {
    match symbol {
        Symbol::NotStarted => "⌚".to_string(),
        Symbol::InProgress => "🏃".to_string(),
        Symbol::Succeeded => "✅".to_string(),
        Symbol::Failed => "❌".to_string(),
        Symbol::Other(raw) => escape(raw),
    }
}

fn group_by_version(reports: &[State]) -> Vec<(&str, Vec<&State>)> {
    let mut groups: Vec<(&str, Vec<&State>)> = Vec::new();
    for state in reports {
        match groups.iter_mut().find(|(v, _)| *v == state.version) {
            Some((_, rows)) => rows.push(state),
            None => groups.push((&state.version, vec![state])),
        }
    }
    groups
}

fn render_row(out: &mut String, state: &State) {
    let build = if state.url.is_empty() {
        escape(&state.id)
    } else {
        format!("[{}]({})", escape(&state.id), escape_url(&state.url))
    };
    let started = state.start_time.map(format_time).unwrap_or_default();

    let _ = writeln!(
        out,
        "| {} | {} | {} | {} | {} |",
        escape(&state.name),
        glyph(&state.symbol),
        build,
        started,
        format_time(state.last_update),
    );
}

fn format_time(ts: Timestamp) -> String {
    ts.strftime("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Keep free text from breaking table cells or forging comment markers.
fn escape(text: &str) -> String {
    text.replace('|', "\\|")
        .replace('<', "&lt;")
        .replace(['\r', '\n'], " ")
}

fn escape_url(url: &str) -> String {
    url.replace(' ', "%20")
        .replace('<', "%3C")
        .replace(')', "%29")
        .replace('|', "%7C")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minute: i64) -> Timestamp {
        Timestamp::new(1_332_896_523 + minute * 60, 0).unwrap()
    }

    fn report(version: &str, id: &str, name: &str, symbol: Symbol) -> State {
        State {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            url: "https://example.org/".into(),
            symbol,
            start_time: Some(at(0)),
            last_update: at(5),
        }
    }

    #[test]
    fn renders_single_group_exactly() {
        let mut queued = report("1.2.3", "1235", "images", Symbol::NotStarted);
        queued.url = String::new();
        queued.start_time = None;
        let reports = vec![report("1.2.3", "1234", "build", Symbol::Succeeded), queued];

        let expected = "### 1.2.3\n\
                        \n\
                        | Pipeline | Status | Build | Started | Last update |\n\
                        | --- | :---: | --- | --- | --- |\n\
                        | build | ✅ | [1234](https://example.org/) | 2012-03-28 01:02:03 UTC | 2012-03-28 01:07:03 UTC |\n\
                        | images | ⌚ | 1235 |  | 2012-03-28 01:07:03 UTC |\n";
        assert_eq!(render_board(&reports), expected);
    }

    #[test]
    fn renders_release_board_exactly() {
        let build = "microsoft-go-infra-release-build";
        let reports = vec![
            report("1.18.2-1", "1234", build, Symbol::Succeeded),
            report("1.18.2-1", "1238", build, Symbol::InProgress),
            report("1.18.2-1", "1500", "microsoft-go-infra-release-go-images", Symbol::InProgress),
            report("1.19.1-1", "1900", build, Symbol::NotStarted),
            report("1.18.2-1-fips", "1239", build, Symbol::Failed),
            report("1.18.2-1", "1233", build, Symbol::Failed),
            report("1.18.2-1", "1300", build, Symbol::NotStarted),
            report("1.18.2-1", "12345", "microsoft-go", Symbol::Failed),
        ];

        let times = "2012-03-28 01:02:03 UTC | 2012-03-28 01:07:03 UTC";
        let row = |name: &str, glyph: &str, id: &str| {
            format!("| {name} | {glyph} | [{id}](https://example.org/) | {times} |\n")
        };
        let expected = [
            format!("### 1.18.2-1\n\n{TABLE_HEADER}"),
            row(build, "✅", "1234"),
            row(build, "🏃", "1238"),
            row("microsoft-go-infra-release-go-images", "🏃", "1500"),
            row(build, "❌", "1233"),
            row(build, "⌚", "1300"),
            row("microsoft-go", "❌", "12345"),
            format!("\n### 1.19.1-1\n\n{TABLE_HEADER}"),
            row(build, "⌚", "1900"),
            format!("\n### 1.18.2-1-fips\n\n{TABLE_HEADER}"),
            row(build, "❌", "1239"),
        ]
        .concat();

        assert_eq!(render_board(&reports), expected);
    }

    #[test]
    fn update_keeps_start_time_in_rendered_row() {
        let mut reports = vec![State {
            url: String::new(),
            ..report("1.2.3", "1234", "microsoft-go", Symbol::InProgress)
        }];
        crate::merge::upsert(
            &mut reports,
            State {
                url: String::new(),
                start_time: None,
                last_update: at(15),
                ..report("1.2.3", "1234", "microsoft-go", Symbol::Succeeded)
            },
        );

        let expected = format!(
            "### 1.2.3\n\n{TABLE_HEADER}\
             | microsoft-go | ✅ | 1234 | 2012-03-28 01:02:03 UTC | 2012-03-28 01:17:03 UTC |\n"
        );
        assert_eq!(render_board(&reports), expected);
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let reports = vec![
            report("1.1", "a", "first", Symbol::Succeeded),
            report("1.2", "b", "second", Symbol::InProgress),
            report("1.1", "c", "third", Symbol::Failed),
        ];

        let out = render_board(&reports);

        let h11 = out.find("### 1.1").unwrap();
        let h12 = out.find("### 1.2").unwrap();
        let first = out.find("| first |").unwrap();
        let second = out.find("| second |").unwrap();
        let third = out.find("| third |").unwrap();
        assert!(h11 < first && first < third && third < h12 && h12 < second);
    }

    #[test]
    fn empty_version_is_ungrouped() {
        let out = render_board(&[report("", "1", "start", Symbol::InProgress)]);
        assert!(out.starts_with("### Ungrouped\n"));
        assert!(out.contains("| start | 🏃 |"));
    }

    #[test]
    fn custom_status_renders_literally() {
        let out = render_board(&[report("1", "1", "p", Symbol::Other("Skipped".into()))]);
        assert!(out.contains("| p | Skipped |"));
    }

    #[test]
    fn empty_board_renders_placeholder() {
        assert_eq!(render_board(&[]), EMPTY_BOARD);
    }

    #[test]
    fn free_text_cannot_break_rows() {
        let out = render_board(&[report("1", "1", "a|b\nc", Symbol::Failed)]);
        assert!(out.contains("| a\\|b c | ❌ |"));
    }

    #[test]
    fn free_text_cannot_forge_markers() {
        let mut state = report("<!--", "1", "<!-- buildboard:section-end -->", Symbol::Failed);
        state.url = "https://example.org/a b)<".into();

        let out = render_board(&[state]);

        assert!(!out.contains('<'));
        assert!(out.contains("[1](https://example.org/a%20b%29%3C)"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let reports = vec![
            report("1.18.2-1", "1234", "build", Symbol::Succeeded),
            report("", "1900", "start", Symbol::NotStarted),
        ];
        assert_eq!(render_board(&reports), render_board(&reports.clone()));
    }

    #[test]
    fn notice_describes_one_build() {
        let state = report("1.2.3", "99", "release-build", Symbol::Failed);

        let out = render_notice(&state);

        assert!(out.starts_with("Build failure: release-build\n\n### 1.2.3\n"));
        assert_eq!(out.matches("| release-build |").count(), 1);
    }
}
