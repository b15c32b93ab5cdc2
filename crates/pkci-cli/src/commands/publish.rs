//! `pkci publish` — Package, build and push the pyknic image.

use std::path::PathBuf;

use clap::Args;
use pkci_common::config::PkciConfig;
use pkci_publish::image::DOCKER;
use pkci_publish::publisher::Publisher;
use pkci_runtime::process::SystemRunner;
use pkci_runtime::tool;

use crate::output::{self, GREEN, RESET};

/// Arguments for the `publish` command.
///
/// Unset flags fall back to the configuration file and to
/// `DOCKER_REGISTRY`, `IMAGE_TAG` and `TAR_REPACK`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Registry to push to, e.g. `localhost:5000`.
    #[arg(long)]
    pub registry: Option<String>,

    /// Image tag; defaults to a UTC date stamp.
    #[arg(long)]
    pub tag: Option<String>,

    /// Repack the sdist deterministically before building.
    #[arg(long)]
    pub repack: bool,

    /// Build the image but do not push it.
    #[arg(long)]
    pub no_push: bool,

    /// Project directory holding `setup.py`.
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

/// Executes the `publish` command.
///
/// # Errors
///
/// Returns an error if a required tool is missing or any step fails.
pub fn execute(args: PublishArgs, config: PkciConfig) -> anyhow::Result<()> {
    let mut publish = config.publish;
    if let Some(registry) = args.registry {
        publish.registry = registry;
    }
    if args.tag.is_some() {
        publish.image_tag = args.tag;
    }
    if let Some(dir) = args.project_dir {
        publish.project_dir = dir;
    }
    publish.repack |= args.repack;
    publish.push &= !args.no_push;

    tool::require_all([publish.python.as_str(), DOCKER])?;

    let runner = SystemRunner;
    let report = Publisher::new(&runner, publish).publish()?;

    output::headline("Published");
    output::row("image", &report.image);
    output::row("sdist", report.sdist.display());
    if let Some(repack) = &report.repack {
        output::row(
            "repacked",
            format!(
                "{} entries, {}, {}",
                repack.entries,
                output::format_bytes(repack.size_bytes),
                output::short_digest(&repack.hash.to_string())
            ),
        );
    }
    let pushed = if report.pushed {
        format!("{GREEN}yes{RESET}")
    } else {
        "no".to_string()
    };
    output::row("pushed", pushed);
    Ok(())
}
