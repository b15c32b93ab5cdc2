//! # pkci — pyknic CI
//!
//! Publishes the pyknic image and drives its CI pipelines.
//! Single binary for packaging, repacking, testing and status reporting.

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    commands::execute(cli)
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins; otherwise each `-v` raises the level from `warn`.
fn init_tracing(verbose: u8, json: bool) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
