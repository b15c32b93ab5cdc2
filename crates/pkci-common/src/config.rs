//! Global configuration model for pyknic-ci.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables. The CLI applies its own flags last.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{self, env};
use crate::error::{CiError, Result};
use crate::types::{BuildId, PythonVersion, RepoSlug};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PkciConfig {
    /// Image publisher settings.
    pub publish: PublishConfig,
    /// CI job and fan-out settings.
    pub pipeline: PipelineConfig,
    /// Status reporter settings.
    pub status: StatusConfig,
}

/// Settings of the image publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Registry the image is pushed to.
    pub registry: String,
    /// Repository name of the image.
    pub image_name: String,
    /// Explicit tag; a date stamp is generated when unset.
    pub image_tag: Option<String>,
    /// Whether the sdist is normalized before the image build.
    pub repack: bool,
    /// Modification time written into repacked entries.
    pub repack_mtime: u64,
    /// Interpreter that builds the sdist.
    pub python: String,
    /// Root of the Python project.
    pub project_dir: PathBuf,
    /// Output directory of the sdist, relative to `project_dir`.
    pub dist_dir: PathBuf,
    /// Base image of the rendered Dockerfile.
    pub base_image: String,
    /// Whether the built image is pushed.
    pub push: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            registry: constants::DEFAULT_DOCKER_REGISTRY.into(),
            image_name: constants::DEFAULT_IMAGE_NAME.into(),
            image_tag: None,
            repack: false,
            repack_mtime: constants::DEFAULT_REPACK_MTIME,
            python: constants::DEFAULT_PACKAGING_PYTHON.into(),
            project_dir: PathBuf::from("."),
            dist_dir: PathBuf::from(constants::DEFAULT_DIST_DIR),
            base_image: constants::DEFAULT_BASE_IMAGE.into(),
            push: true,
        }
    }
}

impl PublishConfig {
    /// Returns the configured tag or a UTC date stamp.
    #[must_use]
    pub fn resolved_tag(&self) -> String {
        self.image_tag.clone().unwrap_or_else(|| {
            chrono::Utc::now()
                .format(constants::IMAGE_TAG_DATE_FORMAT)
                .to_string()
        })
    }
}

/// Settings of the CI job runner and the fan-out driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interpreter versions every branch is tested against.
    pub python_versions: Vec<PythonVersion>,
    /// Virtualenv directory, relative to the checkout.
    pub venv_dir: PathBuf,
    /// Requirement files installed when they exist.
    pub requirement_files: Vec<PathBuf>,
    /// Arguments passed to `python -m pytest`.
    pub pytest_args: Vec<String>,
    /// Arguments passed to `python -m mypy`.
    pub mypy_args: Vec<String>,
    /// Git URI of the tested repository, used in rendered pipelines.
    pub repository_uri: Option<String>,
    /// Container image the rendered pipeline tasks run in, tagged by
    /// interpreter version.
    ///
    /// The task invokes `pkci test` inside it, so every tag must ship the
    /// matching interpreter and the `pkci` binary on `PATH`. A stock
    /// `python` image does not work.
    pub task_image: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            python_versions: constants::DEFAULT_PYTHON_VERSIONS
                .iter()
                .filter_map(|v| v.parse().ok())
                .collect(),
            venv_dir: PathBuf::from(constants::DEFAULT_VENV_DIR),
            requirement_files: constants::DEFAULT_REQUIREMENT_FILES
                .iter()
                .map(PathBuf::from)
                .collect(),
            pytest_args: vec!["tests/pytest".into()],
            mypy_args: vec!["pyknic".into()],
            repository_uri: None,
            task_image: constants::DEFAULT_TASK_IMAGE.into(),
        }
    }
}

/// A credential that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a credential.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw credential.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Settings of the status reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Base URL of the source-hosting API.
    pub api_base: String,
    /// Repository statuses are posted to.
    pub repository: Option<RepoSlug>,
    /// API token; only ever read from the environment or the config file.
    #[serde(skip_serializing)]
    pub token: Option<Secret>,
    /// Prefix of the status context.
    pub context_prefix: String,
    /// External URL of the orchestrator, base of build log links.
    pub external_url: Option<String>,
    /// Identifier of the running build.
    pub build_id: Option<BuildId>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            api_base: constants::DEFAULT_GITHUB_API.into(),
            repository: None,
            token: None,
            context_prefix: constants::DEFAULT_STATUS_CONTEXT_PREFIX.into(),
            external_url: None,
            build_id: None,
        }
    }
}

impl StatusConfig {
    /// Link to the build log, `<external_url>/builds/<build_id>`.
    #[must_use]
    pub fn target_url(&self) -> Option<String> {
        match (&self.external_url, &self.build_id) {
            (Some(base), Some(id)) => Some(format!("{}/builds/{id}", base.trim_end_matches('/'))),
            _ => None,
        }
    }
}

impl PkciConfig {
    /// Loads the configuration file and applies the process environment.
    ///
    /// An explicit `path` must exist. Without one, `PKCI_CONFIG` is
    /// consulted, then `pkci.yaml` in the working directory is used if it
    /// exists; otherwise the defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable holds an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(env::PKCI_CONFIG).map(PathBuf::from));
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let fallback = Path::new(constants::DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parses a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration file");
        let content = std::fs::read_to_string(path).map_err(|e| CiError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parses a YAML configuration document.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Yaml` if the document is malformed.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overrides fields from environment variables returned by `lookup`.
    ///
    /// Empty values are ignored, except for `TAR_REPACK` whose mere presence
    /// enables repacking.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Config` if a variable holds an invalid value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(registry) = non_empty(env::DOCKER_REGISTRY) {
            self.publish.registry = registry;
        }
        if let Some(tag) = non_empty(env::IMAGE_TAG) {
            self.publish.image_tag = Some(tag);
        }
        if lookup(env::TAR_REPACK).is_some() {
            self.publish.repack = true;
        }
        if let Some(epoch) = non_empty(env::SOURCE_DATE_EPOCH) {
            self.publish.repack_mtime = epoch.trim().parse().map_err(|_| {
                CiError::config(format!("{} is not a unix timestamp: {epoch:?}", env::SOURCE_DATE_EPOCH))
            })?;
        }
        if let Some(token) = non_empty(env::GITHUB_TOKEN) {
            self.status.token = Some(Secret::new(token));
        }
        if let Some(repo) = non_empty(env::GITHUB_REPOSITORY) {
            self.status.repository = Some(repo.parse()?);
        }
        if let Some(id) = non_empty(env::BUILD_ID) {
            self.status.build_id = Some(BuildId::new(id));
        }
        if let Some(url) = non_empty(env::ATC_EXTERNAL_URL) {
            self.status.external_url = Some(url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_publisher_script() {
        let config = PkciConfig::default();
        assert_eq!(config.publish.registry, "localhost:5000");
        assert!(!config.publish.repack);
        assert!(config.publish.push);
        assert_eq!(config.pipeline.python_versions.len(), 3);
    }

    #[test]
    fn env_overrides_registry_and_tag() {
        let mut config = PkciConfig::default();
        config
            .apply_env(lookup(&[("DOCKER_REGISTRY", "registry.lan:5000"), ("IMAGE_TAG", "v1")]))
            .expect("apply");
        assert_eq!(config.publish.registry, "registry.lan:5000");
        assert_eq!(config.publish.resolved_tag(), "v1");
    }

    #[test]
    fn empty_registry_keeps_default() {
        let mut config = PkciConfig::default();
        config
            .apply_env(lookup(&[("DOCKER_REGISTRY", "")]))
            .expect("apply");
        assert_eq!(config.publish.registry, "localhost:5000");
    }

    #[test]
    fn tar_repack_presence_enables_repack() {
        let mut config = PkciConfig::default();
        config.apply_env(lookup(&[("TAR_REPACK", "")])).expect("apply");
        assert!(config.publish.repack);
    }

    #[test]
    fn invalid_source_date_epoch_is_rejected() {
        let mut config = PkciConfig::default();
        let result = config.apply_env(lookup(&[("SOURCE_DATE_EPOCH", "yesterday")]));
        assert!(result.is_err());
    }

    #[test]
    fn default_tag_is_date_stamped() {
        let tag = PublishConfig::default().resolved_tag();
        assert_eq!(tag.len(), 14);
        assert!(tag.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn target_url_joins_external_url_and_build() {
        let mut config = PkciConfig::default();
        config
            .apply_env(lookup(&[
                ("ATC_EXTERNAL_URL", "https://ci.example.org/"),
                ("BUILD_ID", "981"),
            ]))
            .expect("apply");
        assert_eq!(
            config.status.target_url().as_deref(),
            Some("https://ci.example.org/builds/981")
        );
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let mut config = PkciConfig::default();
        config
            .apply_env(lookup(&[("GITHUB_TOKEN", "ghp_supersecret")]))
            .expect("apply");
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_supersecret"));
    }

    #[test]
    fn yaml_file_sets_nested_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pkci.yaml");
        std::fs::write(
            &path,
            "publish:\n  image_name: pyknic-dev\n  push: false\npipeline:\n  python_versions: [\"3.11\"]\nstatus:\n  repository: a1ezzz/pyknic\n",
        )
        .expect("write");

        let config = PkciConfig::from_file(&path).expect("load");
        assert_eq!(config.publish.image_name, "pyknic-dev");
        assert!(!config.publish.push);
        assert_eq!(config.publish.registry, "localhost:5000");
        assert_eq!(config.pipeline.python_versions, vec![PythonVersion::new(3, 11)]);
        assert_eq!(
            config.status.repository.map(|r| r.to_string()).as_deref(),
            Some("a1ezzz/pyknic")
        );
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(PkciConfig::from_yaml("publish: [unclosed").is_err());
    }
}
