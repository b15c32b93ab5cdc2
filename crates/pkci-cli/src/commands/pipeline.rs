//! `pkci pipeline` — Render the Concourse pipelines.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use pkci_common::config::PkciConfig;
use pkci_common::types::PythonVersion;
use pkci_pipeline::concourse::{self, Pipeline};
use pkci_pipeline::fanout;

use crate::output;

/// Arguments for the `pipeline` command.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// What to render.
    #[command(subcommand)]
    pub target: PipelineTarget,
}

/// Renderable pipelines.
#[derive(Subcommand, Debug)]
pub enum PipelineTarget {
    /// The parent pipeline setting one test pipeline per discovered branch
    /// and version.
    Fanout {
        /// Interpreter versions; defaults to the configured ones.
        #[arg(long = "python-version")]
        python_versions: Vec<PythonVersion>,

        /// Path of the test pipeline template inside the repository.
        #[arg(long, default_value = "ci/test-pipeline.yml")]
        template: String,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// The test pipeline template each instance is set from.
    Template {
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Lists the instances a branch listing fans out to, one JSON object
    /// per line.
    Instances {
        /// Branch listing: one per line, or a JSON/YAML array such as the
        /// branch resource's `branches.json`.
        #[arg(long)]
        branches: PathBuf,

        /// Interpreter versions; defaults to the configured ones.
        #[arg(long = "python-version")]
        python_versions: Vec<PythonVersion>,
    },
}

/// Executes the `pipeline` command.
///
/// # Errors
///
/// Returns an error if the branch listing cannot be read or the output
/// cannot be written.
pub fn execute(args: PipelineArgs, config: &PkciConfig) -> anyhow::Result<()> {
    match args.target {
        PipelineTarget::Fanout {
            python_versions,
            template,
            output: dest,
        } => {
            let versions = or_configured(python_versions, config);
            let pipeline = concourse::fanout_pipeline(&versions, &config.pipeline, &template);
            write(&pipeline, dest.as_deref())?;
        }
        PipelineTarget::Template { output: dest } => {
            write(&concourse::test_pipeline(&config.pipeline), dest.as_deref())?;
        }
        PipelineTarget::Instances {
            branches,
            python_versions,
        } => {
            let branches = fanout::read_branch_listing(&branches)?;
            let versions = or_configured(python_versions, config);
            let instances = fanout::fan_out(&branches, &versions);
            print_instances(&instances)?;
            output::row("instances", instances.len());
        }
    }
    Ok(())
}

fn or_configured(versions: Vec<PythonVersion>, config: &PkciConfig) -> Vec<PythonVersion> {
    if versions.is_empty() {
        config.pipeline.python_versions.clone()
    } else {
        versions
    }
}

#[allow(clippy::print_stdout)]
fn print_instances(instances: &[fanout::PipelineInstance]) -> anyhow::Result<()> {
    for instance in instances {
        println!("{}", serde_json::to_string(instance)?);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn write(pipeline: &Pipeline, dest: Option<&Path>) -> anyhow::Result<()> {
    let yaml = concourse::to_yaml(pipeline)?;
    match dest {
        Some(path) => {
            std::fs::write(path, yaml)
                .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
            output::row("written", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
