//! Dockerfile rendering and build context staging.

use std::path::Path;

use pkci_common::constants;
use pkci_common::error::{CiError, Result};

/// File name of the rendered Dockerfile inside the context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// A directory ready to be passed to `docker build`.
#[derive(Debug)]
pub struct BuildContext {
    dir: tempfile::TempDir,
}

impl BuildContext {
    /// Root of the context.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Renders the Dockerfile that installs `sdist_name` on top of `base_image`.
///
/// The entrypoint runs pyknic with its fixed flags `-vv -c /pyknic.ini`,
/// in exec form.
///
/// # Errors
///
/// Returns `CiError::Serialization` if the entrypoint cannot be encoded.
pub fn render(base_image: &str, sdist_name: &str) -> Result<String> {
    let entrypoint: Vec<&str> = std::iter::once(constants::APP_ENTRYPOINT)
        .chain(constants::APP_ENTRYPOINT_ARGS)
        .collect();
    let entrypoint = serde_json::to_string(&entrypoint)?;
    Ok(format!(
        "FROM {base_image}\n\
         COPY {sdist_name} /tmp/{sdist_name}\n\
         RUN pip install --no-cache-dir /tmp/{sdist_name} && rm /tmp/{sdist_name}\n\
         ENTRYPOINT {entrypoint}\n"
    ))
}

/// Copies the sdist into a fresh temporary directory next to a rendered
/// Dockerfile. The directory is removed when the context is dropped.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or written.
pub fn stage_context(sdist: &Path, base_image: &str) -> Result<BuildContext> {
    let sdist_name = sdist
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CiError::config(format!("sdist path has no file name: {}", sdist.display())))?
        .to_string();

    let dir = tempfile::Builder::new()
        .prefix("pkci-context-")
        .tempdir()
        .map_err(|e| CiError::io(std::env::temp_dir(), e))?;

    let staged = dir.path().join(&sdist_name);
    let _ = std::fs::copy(sdist, &staged).map_err(|e| CiError::io(sdist, e))?;

    let dockerfile = dir.path().join(DOCKERFILE_NAME);
    std::fs::write(&dockerfile, render(base_image, &sdist_name)?)
        .map_err(|e| CiError::io(&dockerfile, e))?;

    tracing::info!(context = %dir.path().display(), sdist = %sdist_name, "build context staged");
    Ok(BuildContext { dir })
}
