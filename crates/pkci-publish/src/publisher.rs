//! The image publisher workflow.

use std::path::PathBuf;

use pkci_archive::repack::{self, RepackOptions, RepackReport};
use pkci_common::config::PublishConfig;
use pkci_common::error::Result;
use pkci_common::types::ImageRef;
use pkci_runtime::process::CommandRunner;

use crate::{dockerfile, image, sdist};

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Reference the image was built as.
    pub image: ImageRef,
    /// The packaged source distribution.
    pub sdist: PathBuf,
    /// Normalization result, when repacking was enabled.
    pub repack: Option<RepackReport>,
    /// Whether the image was pushed.
    pub pushed: bool,
}

/// Packages, builds and pushes the pyknic image.
pub struct Publisher<'a> {
    runner: &'a dyn CommandRunner,
    config: PublishConfig,
}

impl<'a> Publisher<'a> {
    /// Creates a publisher running its commands through `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, config: PublishConfig) -> Self {
        Self { runner, config }
    }

    /// The image reference this publisher targets.
    ///
    /// # Errors
    ///
    /// Returns an error if registry, name or tag are invalid.
    pub fn image_ref(&self) -> Result<ImageRef> {
        ImageRef::new(
            self.config.registry.clone(),
            self.config.image_name.clone(),
            self.config.resolved_tag(),
        )
    }

    /// Runs the workflow, aborting at the first failing step.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; later steps never run.
    pub fn publish(&self) -> Result<PublishReport> {
        let image = self.image_ref()?;
        tracing::info!(image = %image, repack = self.config.repack, "publishing");

        let sdist = sdist::build_sdist(
            self.runner,
            &self.config.python,
            &self.config.project_dir,
            &self.config.dist_dir,
        )?;

        let repack = if self.config.repack {
            let options = RepackOptions {
                mtime: self.config.repack_mtime,
            };
            Some(repack::repack_in_place(&sdist, &options)?)
        } else {
            None
        };

        let context = dockerfile::stage_context(&sdist, &self.config.base_image)?;
        image::build_image(self.runner, context.path(), &image)?;

        if self.config.push {
            image::push_image(self.runner, &image)?;
        } else {
            tracing::info!(image = %image, "push disabled, image kept local");
        }

        Ok(PublishReport {
            image,
            sdist,
            repack,
            pushed: self.config.push,
        })
    }
}

#[cfg(test)]
mod tests {
    use pkci_common::error::CiError;
    use pkci_runtime::fake::ScriptedRunner;

    use super::*;

    fn config(project: &std::path::Path) -> PublishConfig {
        PublishConfig {
            project_dir: project.to_path_buf(),
            image_tag: Some("test".into()),
            ..PublishConfig::default()
        }
    }

    #[test]
    fn invalid_tag_fails_before_any_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new();
        let publisher = Publisher::new(
            &runner,
            PublishConfig {
                image_tag: Some("bad tag".into()),
                ..config(dir.path())
            },
        );
        assert!(matches!(publisher.publish(), Err(CiError::Config { .. })));
        assert!(runner.calls().expect("calls").is_empty());
    }

    #[test]
    fn image_ref_uses_registry_and_tag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new();
        let publisher = Publisher::new(&runner, config(dir.path()));
        assert_eq!(
            publisher.image_ref().expect("ref").to_string(),
            "localhost:5000/pyknic:test"
        );
    }
}
