//! `pkci report` — Post one commit status by hand.

use std::path::PathBuf;

use clap::Args;
use pkci_common::config::{PkciConfig, StatusConfig};
use pkci_common::types::CommitState;
use pkci_pipeline::context;
use pkci_pipeline::status::{
    GithubStatusSink, RecordingSink, ReportOutcome, StatusReporter, StatusSink,
};

use crate::commands::process_env;
use crate::output::{self, GREEN, RESET, YELLOW};

/// Arguments for the `report` command.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Task name, used as the status context suffix (e.g. `pytest-py3.12`).
    #[arg(long)]
    pub task: String,

    /// State to report: `success` or `failure`.
    #[arg(long)]
    pub state: CommitState,

    /// Pull request metadata directory; otherwise `PR_*` variables are read.
    #[arg(long)]
    pub pr_metadata: Option<PathBuf>,

    /// Print the status instead of sending it.
    #[arg(long)]
    pub dry_run: bool,
}

/// Where statuses go for this invocation.
pub enum Sink {
    /// The hosting service.
    Github(GithubStatusSink),
    /// Kept in memory and printed afterwards.
    DryRun(RecordingSink),
}

impl Sink {
    /// Opens the sink for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if statuses must be sent but no repository is set.
    pub fn open(config: &StatusConfig, dry_run: bool) -> anyhow::Result<Self> {
        if dry_run {
            Ok(Self::DryRun(RecordingSink::new()))
        } else {
            Ok(Self::Github(GithubStatusSink::from_config(config)?))
        }
    }

    /// The sink as a trait object.
    pub fn as_dyn(&self) -> &dyn StatusSink {
        match self {
            Self::Github(sink) => sink,
            Self::DryRun(sink) => sink,
        }
    }

    /// Prints the statuses a dry run collected, one JSON object per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the statuses cannot be read or serialized.
    #[allow(clippy::print_stdout)]
    pub fn print_recorded(&self) -> anyhow::Result<()> {
        if let Self::DryRun(sink) = self {
            for (commit, update) in sink.posted()? {
                let line = serde_json::json!({ "commit": commit.as_str(), "status": update });
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Ok(())
    }
}

/// Renders a status outcome for the summary.
pub fn describe(outcome: ReportOutcome) -> String {
    match outcome {
        ReportOutcome::Sent => format!("{GREEN}sent{RESET}"),
        ReportOutcome::Skipped => "skipped (no pull request)".to_string(),
        ReportOutcome::Dropped => format!("{YELLOW}dropped{RESET}"),
    }
}

/// Executes the `report` command.
///
/// Without a pull request nothing is sent and the command succeeds.
///
/// # Errors
///
/// Returns an error if the pull request context is malformed or the sink
/// cannot be opened. Delivery failures are not errors.
pub fn execute(args: ReportArgs, config: &PkciConfig) -> anyhow::Result<()> {
    let pull_request = context::detect(args.pr_metadata.as_deref(), process_env)?;
    if pull_request.is_none() {
        output::row("status", describe(ReportOutcome::Skipped));
        return Ok(());
    }

    let sink = Sink::open(&config.status, args.dry_run)?;
    let reporter = StatusReporter::new(sink.as_dyn(), pull_request, &config.status);
    let outcome = reporter.report(&args.task, args.state);
    sink.print_recorded()?;

    output::row("context", reporter.context(&args.task));
    output::row("status", describe(outcome));
    Ok(())
}
