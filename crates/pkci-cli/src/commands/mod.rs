//! CLI command definitions and dispatch.

pub mod pipeline;
pub mod publish;
pub mod repack;
pub mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pkci_common::config::PkciConfig;
use pkci_common::constants::env;

/// pkci — pyknic image publishing and CI automation.
#[derive(Parser, Debug)]
#[command(name = "pkci", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, env = env::PKCI_CONFIG)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Package the sdist, build the container image and push it.
    Publish(publish::PublishArgs),
    /// Rewrite an archive deterministically.
    Repack(repack::RepackArgs),
    /// Run the test job: merge, provision, pytest, mypy.
    Test(test::TestArgs),
    /// Post a single commit status for the current pull request.
    Report(report::ReportArgs),
    /// Render Concourse pipelines.
    Pipeline(pipeline::PipelineArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if loading the configuration or executing the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = PkciConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Publish(args) => publish::execute(args, config),
        Command::Repack(args) => repack::execute(args, &config),
        Command::Test(args) => test::execute(args, config),
        Command::Report(args) => report::execute(args, &config),
        Command::Pipeline(args) => pipeline::execute(args, &config),
    }
}

/// Environment lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
