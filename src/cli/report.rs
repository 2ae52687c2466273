//! `buildboard report`: build the incoming state and synchronize it.

use std::time::Instant;

use clap::Args;
use jiff::Timestamp;

use crate::config::Config;
use crate::model::{State, Symbol};
use crate::pipeline_env::PipelineEnv;
use crate::store::{CommentStore, IssueRef, Notifier};
use crate::sync::{Cancellation, NoticeOutcome, RetryPolicy, Synchronizer};

/// Build details. Each falls back to the pipeline's predefined variables.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Raw build status, e.g. `InProgress`, `Succeeded`, `Failed`.
    /// Defaults to `AGENT_JOBSTATUS`.
    #[arg(long)]
    pub build_status: Option<String>,

    /// Build ID, the key the board merges on. Defaults to `BUILD_BUILDID`.
    #[arg(long)]
    pub build_id: Option<String>,

    /// Pipeline name shown on the board. Defaults to `BUILD_DEFINITIONNAME`.
    #[arg(long)]
    pub build_pipeline: Option<String>,

    /// Record that the build starts now.
    #[arg(long)]
    pub build_start: bool,

    /// Version the build belongs to; rows are grouped by it.
    #[arg(long = "version")]
    pub group_version: Option<String>,
}

pub fn cmd_report<S: CommentStore + Notifier>(
    config: &Config,
    store: &S,
    issue: &IssueRef,
    args: &ReportArgs,
) -> Result<(), String> {
    let state = build_state(args, &PipelineEnv::from_env(), Timestamp::now())?;

    let mut cancel = Cancellation::new();
    if let Some(deadline) = config.sync_deadline() {
        cancel = cancel.with_deadline(Instant::now() + deadline);
    }

    report(store, issue, &state, config.retry_policy(), cancel)
}

/// Assemble the state for this build. Flags win over the environment.
pub fn build_state(args: &ReportArgs, env: &PipelineEnv, now: Timestamp) -> Result<State, String> {
    let id = args
        .build_id
        .clone()
        .or_else(|| env.build_id.clone())
        .ok_or("no build ID: pass --build-id or run inside a pipeline (BUILD_BUILDID)")?;
    let raw_status = args
        .build_status
        .clone()
        .or_else(|| env.job_status.clone())
        .filter(|s| !s.is_empty())
        .ok_or("no build status: pass --build-status or run inside a pipeline (AGENT_JOBSTATUS)")?;
    let name = args
        .build_pipeline
        .clone()
        .or_else(|| env.definition_name.clone())
        .unwrap_or_default();

    Ok(State {
        url: env.build_url(&id).unwrap_or_default(),
        id,
        name,
        version: args.group_version.clone().unwrap_or_default(),
        symbol: Symbol::from_status(&raw_status),
        start_time: args.build_start.then_some(now),
        last_update: now,
    })
}

fn report<S: CommentStore + Notifier>(
    store: &S,
    issue: &IssueRef,
    state: &State,
    policy: RetryPolicy,
    cancel: Cancellation,
) -> Result<(), String> {
    let outcome = Synchronizer::new(store, policy)
        .with_cancellation(cancel)
        .synchronize(issue, state)
        .map_err(|e| format!("failed to report build {} to {issue}: {e}", state.id))?;

    let verb = if outcome.created { "Created" } else { "Updated" };
    eprintln!(
        "{verb} board on {issue} (comment {}, {} attempt(s)): {} {}",
        outcome.comment, outcome.attempts, state.id, state.symbol
    );

    match outcome.notice {
        NoticeOutcome::NotNeeded => Ok(()),
        NoticeOutcome::Posted(id) => {
            eprintln!("Posted failure notice (comment {id})");
            Ok(())
        }
        NoticeOutcome::Failed(e) => Err(format!(
            "board updated, but the failure notice could not be posted: {e}"
        )),
    }
}
