//! Container image build and push through the docker CLI.

use std::path::Path;

use pkci_common::error::Result;
use pkci_common::types::ImageRef;
use pkci_runtime::process::{self, CommandRunner, CommandSpec};

/// Docker client binary.
pub const DOCKER: &str = "docker";

/// `docker build --tag <image> <context>`.
#[must_use]
pub fn build_command(context: &Path, image: &ImageRef) -> CommandSpec {
    CommandSpec::new(DOCKER)
        .args(["build", "--tag"])
        .arg(image.to_string())
        .path_arg(context)
}

/// `docker push <image>`.
#[must_use]
pub fn push_command(image: &ImageRef) -> CommandSpec {
    CommandSpec::new(DOCKER).arg("push").arg(image.to_string())
}

/// Builds the image from a staged context.
///
/// # Errors
///
/// Returns an error if `docker build` fails.
pub fn build_image(runner: &dyn CommandRunner, context: &Path, image: &ImageRef) -> Result<()> {
    tracing::info!(image = %image, context = %context.display(), "building image");
    let _ = process::run_checked(runner, &build_command(context, image))?;
    Ok(())
}

/// Pushes the image to its registry.
///
/// # Errors
///
/// Returns an error if `docker push` fails.
pub fn push_image(runner: &dyn CommandRunner, image: &ImageRef) -> Result<()> {
    tracing::info!(image = %image, "pushing image");
    let _ = process::run_checked(runner, &push_command(image))?;
    Ok(())
}
