//! CLI interface for buildboard.
//!
//! Built to run as a pipeline step: arguments in, one comment updated, exit
//! code out. Build details fall back to the Azure Pipelines environment so a
//! step usually only names the issue.
//!
//! - `buildboard report`: fold this build's state into the issue's board.
//! - `buildboard show`: print the board as it stands.

mod report;
mod show;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::identity::{gh_config_dir, resolve_identity};
use crate::store::{GitHubStore, IssueRef};

use report::ReportArgs;

/// buildboard: a build status board kept in a GitHub issue comment.
#[derive(Debug, Parser)]
#[command(name = "buildboard", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Repository holding the issue, as `owner/name`.
    /// Defaults to `repo` in the config file.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Issue number holding the board.
    #[arg(short, long, global = true)]
    issue: Option<u64>,

    /// Identity for GitHub auth (selects `~/.buildboard/gh-config/<identity>`).
    /// Falls back to `BUILDBOARD_IDENTITY`, then `identity` in the config file,
    /// then `gh`'s own authentication.
    #[arg(long = "as", global = true)]
    identity: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r"Workflow: a release pipeline reporting to its tracking issue
  1. buildboard --repo microsoft/go -i 42 report --build-start --build-status InProgress --version 1.22.3
  2. ... build runs ...
  3. buildboard --repo microsoft/go -i 42 report
     (status, build ID and pipeline name come from AGENT_JOBSTATUS,
      BUILD_BUILDID and BUILD_DEFINITIONNAME)

Inspect:
  buildboard --repo microsoft/go -i 42 show
  buildboard --repo microsoft/go -i 42 show --json

Logging: BUILDBOARD_LOG=debug";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report this build's state to the board.
    ///
    /// Fetches the board, merges the state in by build ID, and writes it
    /// back, retrying when another pipeline wrote in between. A failed build
    /// also gets a notice comment.
    Report(ReportArgs),

    /// Print the current board.
    ///
    /// Pure read. Prints the rendered tables, or the raw reports with `--json`.
    Show {
        /// Print the embedded reports as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config) -> Result<(), String> {
    let cli = Cli::parse();

    let issue = require_issue(config, cli.repo.as_deref(), cli.issue)?;
    let store = github_store(config, cli.identity.as_deref())?;

    match cli.command {
        Command::Report(args) => report::cmd_report(config, &store, &issue, &args),
        Command::Show { json } => show::cmd_show(&store, &issue, json),
    }
}

/// Resolve the target issue from flags and config.
fn require_issue(
    config: &Config,
    repo: Option<&str>,
    number: Option<u64>,
) -> Result<IssueRef, String> {
    let repo = repo
        .or(config.repo.as_deref())
        .ok_or("this command requires --repo <owner/name> (or `repo` in the config file)")?;
    let number = number.ok_or("this command requires --issue <number>")?;
    IssueRef::new(repo, number)
}

fn github_store(config: &Config, explicit: Option<&str>) -> Result<GitHubStore, String> {
    let gh_config = match resolve_identity(explicit, config) {
        Some(identity) => Some(gh_config_dir(&identity)?),
        None => None,
    };
    Ok(GitHubStore::new(gh_config, config.gh_timeout()))
}
