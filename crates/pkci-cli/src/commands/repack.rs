//! `pkci repack` — Rewrite an archive so its bytes depend on content only.

use std::path::PathBuf;

use clap::Args;
use pkci_archive::repack::{self, RepackOptions};
use pkci_common::config::PkciConfig;

use crate::output;

/// Arguments for the `repack` command.
#[derive(Args, Debug)]
pub struct RepackArgs {
    /// Archive to normalize (`.tar` or `.tar.gz`).
    pub input: PathBuf,

    /// Write the result here instead of replacing the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Modification time stamped on every entry; defaults to
    /// `SOURCE_DATE_EPOCH` or 0.
    #[arg(long)]
    pub mtime: Option<u64>,
}

/// Executes the `repack` command.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or written.
pub fn execute(args: RepackArgs, config: &PkciConfig) -> anyhow::Result<()> {
    let options = RepackOptions {
        mtime: args.mtime.unwrap_or(config.publish.repack_mtime),
    };
    let report = match args.output {
        Some(ref output) => repack::repack(&args.input, output, &options)?,
        None => repack::repack_in_place(&args.input, &options)?,
    };

    output::headline("Repacked");
    output::row("archive", report.output.display());
    output::row("entries", report.entries);
    output::row("size", output::format_bytes(report.size_bytes));
    output::row("digest", &report.hash);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = RepackArgs {
            input: dir.path().join("absent.tar.gz"),
            output: None,
            mtime: None,
        };
        assert!(execute(args, &PkciConfig::default()).is_err());
    }
}
