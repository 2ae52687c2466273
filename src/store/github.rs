//! GitHub-backed comment store.
//!
//! Talks to the issue comments REST API through `gh api`, authenticated
//! with the resolved identity's `GH_CONFIG_DIR` (or `gh`'s ambient auth when
//! there is none). Request bodies go over stdin so large boards never hit
//! argument length limits.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info};

use crate::codec;

use super::{Comment, CommentId, CommentStore, IssueRef, Notifier, Result, StoreError};

/// How often a running `gh` process is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lowercased stderr fragments that indicate a network-level hiccup.
const TRANSIENT_HINTS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "unexpected eof",
    "tls handshake",
    "no such host",
];

/// Comment store backed by the `gh` CLI.
pub struct GitHubStore {
    gh_config: Option<PathBuf>,
    timeout: Duration,
}

impl GitHubStore {
    /// A store that runs `gh` with the given config dir and per-call timeout.
    pub fn new(gh_config: Option<PathBuf>, timeout: Duration) -> Self {
        Self { gh_config, timeout }
    }

    fn list_comments(&self, issue: &IssueRef) -> Result<Vec<GhComment>> {
        let endpoint = format!("repos/{}/issues/{}/comments", issue.repo, issue.number);
        let json = self.gh(&["api", &endpoint, "--paginate"], None)?;
        parse_comment_pages(&json)
    }

    fn get_comment(&self, issue: &IssueRef, id: CommentId) -> Result<Option<Comment>> {
        let endpoint = format!("repos/{}/issues/comments/{id}", issue.repo);
        match self.run(&["api", &endpoint], None) {
            Ok(json) => {
                let c: GhComment = serde_json::from_str(&json).map_err(unexpected_output)?;
                Ok(Some(Comment::new(CommentId(c.id), c.body.unwrap_or_default())))
            }
            Err(GhFailure::Exited {
                status: Some(404), ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn post_comment(&self, issue: &IssueRef, body: &str) -> Result<CommentId> {
        let endpoint = format!("repos/{}/issues/{}/comments", issue.repo, issue.number);
        let input = serde_json::json!({ "body": body }).to_string();
        let json = self.gh(
            &["api", &endpoint, "--method", "POST", "--input", "-"],
            Some(&input),
        )?;
        let c: GhComment = serde_json::from_str(&json).map_err(unexpected_output)?;
        info!(url = %c.html_url, "posted comment");
        Ok(CommentId(c.id))
    }

    /// Run `gh` and classify any failure as a store error.
    fn gh(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        self.run(args, input).map_err(StoreError::from)
    }

    /// Run `gh` with the configured auth and timeout, returning stdout.
    fn run(&self, args: &[&str], input: Option<&str>) -> std::result::Result<String, GhFailure> {
        let command = args.join(" ");
        debug!(%command, "running gh");

        let mut cmd = Command::new("gh");
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.gh_config {
            cmd.env("GH_CONFIG_DIR", dir);
        }

        let mut child = cmd.spawn().map_err(GhFailure::Spawn)?;

        let writer = match (input, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.to_string();
                // Dropping stdin at the end of the thread closes the pipe.
                Some(thread::spawn(move || stdin.write_all(input.as_bytes())))
            }
            _ => None,
        };
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().map_err(GhFailure::Spawn)? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GhFailure::TimedOut {
                        command,
                        after: self.timeout,
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(GhFailure::Exited {
                status: http_status(&stderr),
                command,
                stderr,
            });
        }
        Ok(stdout)
    }
}

impl CommentStore for GitHubStore {
    fn find_report(&self, issue: &IssueRef) -> Result<Option<Comment>> {
        let found = self
            .list_comments(issue)?
            .into_iter()
            .find_map(|c| {
                let body = c.body.unwrap_or_default();
                codec::has_section(&body).then(|| Comment::new(CommentId(c.id), body))
            });
        debug!(%issue, comment = ?found.as_ref().map(|c| c.id), "looked up report comment");
        Ok(found)
    }

    fn create_report(&self, issue: &IssueRef, body: &str) -> Result<CommentId> {
        // Narrow the window in which two first writers both create a board.
        if self.find_report(issue)?.is_some() {
            return Err(StoreError::Conflict);
        }
        self.post_comment(issue, body)
    }

    fn update_report(&self, issue: &IssueRef, base: &Comment, body: &str) -> Result<()> {
        match self.get_comment(issue, base.id)? {
            Some(current) if current.revision == base.revision => {}
            _ => return Err(StoreError::Conflict),
        }

        let endpoint = format!("repos/{}/issues/comments/{}", issue.repo, base.id);
        let input = serde_json::json!({ "body": body }).to_string();
        match self.run(
            &["api", &endpoint, "--method", "PATCH", "--input", "-"],
            Some(&input),
        ) {
            Ok(_) => Ok(()),
            Err(GhFailure::Exited {
                status: Some(404), ..
            }) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }
}

impl Notifier for GitHubStore {
    fn post_notice(&self, issue: &IssueRef, body: &str) -> Result<CommentId> {
        self.post_comment(issue, body)
    }
}

/// JSON shape of an issue comment from the REST API.
#[derive(Debug, Deserialize)]
struct GhComment {
    id: u64,
    body: Option<String>,
    #[serde(default)]
    html_url: String,
}

/// Why a `gh` invocation failed.
#[derive(Debug)]
enum GhFailure {
    Spawn(std::io::Error),
    TimedOut {
        command: String,
        after: Duration,
    },
    Exited {
        command: String,
        status: Option<u16>,
        stderr: String,
    },
}

impl From<GhFailure> for StoreError {
    fn from(failure: GhFailure) -> Self {
        match failure {
            GhFailure::Spawn(e) => StoreError::Fatal(format!("failed to run gh: {e}")),
            GhFailure::TimedOut { command, after } => {
                StoreError::Transient(format!("gh {command} timed out after {after:?}"))
            }
            GhFailure::Exited {
                command,
                status,
                stderr,
            } => classify(&command, status, &stderr),
        }
    }
}

/// Decide whether a failed `gh` call is worth retrying.
fn classify(command: &str, status: Option<u16>, stderr: &str) -> StoreError {
    let lower = stderr.to_lowercase();
    let message = format!("gh {command} failed: {}", stderr.trim());
    let transient = match status {
        Some(429) => true,
        Some(s) if s >= 500 => true,
        Some(403) => lower.contains("rate limit"),
        Some(_) => false,
        None => TRANSIENT_HINTS.iter().any(|hint| lower.contains(hint)),
    };
    if transient {
        StoreError::Transient(message)
    } else {
        StoreError::Fatal(message)
    }
}

/// Extract the status from `gh`'s `... (HTTP 404)` error suffix.
fn http_status(stderr: &str) -> Option<u16> {
    let start = stderr.find("(HTTP ")? + "(HTTP ".len();
    let digits = stderr[start..].split(')').next()?;
    digits.trim().parse().ok()
}

/// Parse `gh api --paginate` output: one JSON array per page, concatenated.
fn parse_comment_pages(json: &str) -> Result<Vec<GhComment>> {
    let mut comments = Vec::new();
    for page in serde_json::Deserializer::from_str(json).into_iter::<Vec<GhComment>>() {
        comments.extend(page.map_err(unexpected_output)?);
    }
    Ok(comments)
}

fn unexpected_output(e: serde_json::Error) -> StoreError {
    StoreError::Fatal(format!("unexpected gh output: {e}"))
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_from_gh_error() {
        assert_eq!(http_status("gh: Not Found (HTTP 404)\n"), Some(404));
        assert_eq!(
            http_status("gh: API rate limit exceeded for installation (HTTP 403)"),
            Some(403)
        );
        assert_eq!(http_status("error connecting to api.github.com"), None);
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let cases = [
            (Some(429), "gh: Too Many Requests (HTTP 429)"),
            (Some(502), "gh: Bad Gateway (HTTP 502)"),
            (Some(403), "gh: API rate limit exceeded (HTTP 403)"),
            (None, "Post \"https://api.github.com/...\": net/http: TLS handshake timeout"),
            (None, "read tcp: connection reset by peer"),
        ];
        for (status, stderr) in cases {
            let err = classify("api x", status, stderr);
            assert!(matches!(err, StoreError::Transient(_)), "{stderr}");
        }
    }

    #[test]
    fn auth_and_missing_resources_are_fatal() {
        let cases = [
            (Some(401), "gh: Bad credentials (HTTP 401)"),
            (Some(403), "gh: Resource not accessible by integration (HTTP 403)"),
            (Some(404), "gh: Not Found (HTTP 404)"),
            (None, "To get started with GitHub CLI, please run:  gh auth login"),
        ];
        for (status, stderr) in cases {
            let err = classify("api x", status, stderr);
            assert!(matches!(err, StoreError::Fatal(_)), "{stderr}");
        }
    }

    #[test]
    fn timeouts_are_transient() {
        let err = StoreError::from(GhFailure::TimedOut {
            command: "api repos/o/r/issues/1/comments".into(),
            after: Duration::from_secs(30),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn parses_concatenated_pages() {
        let json = r#"[{"id":1,"body":"a","html_url":"u1"},{"id":2,"body":null}][{"id":3,"body":"c"}]"#;

        let comments = parse_comment_pages(json).unwrap();

        let ids: Vec<u64> = comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(comments[1].body, None);
    }

    #[test]
    fn parses_empty_listing() {
        assert!(parse_comment_pages("[]").unwrap().is_empty());
        assert!(parse_comment_pages("").unwrap().is_empty());
    }

    #[test]
    fn garbage_listing_is_fatal() {
        let err = parse_comment_pages("<html>").unwrap_err();
        assert!(matches!(err, StoreError::Fatal(_)));
    }
}
