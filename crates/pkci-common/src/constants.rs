//! Workspace-wide constants and defaults.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "pkci";

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pkci.yaml";

/// Registry images are pushed to when `DOCKER_REGISTRY` is unset.
pub const DEFAULT_DOCKER_REGISTRY: &str = "localhost:5000";

/// Repository name of the published image.
pub const DEFAULT_IMAGE_NAME: &str = "pyknic";

/// `chrono` format of the date-stamped default image tag.
pub const IMAGE_TAG_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Base image of the rendered Dockerfile.
pub const DEFAULT_BASE_IMAGE: &str = "python:3.12-slim";

/// Executable installed by the pyknic sdist.
pub const APP_ENTRYPOINT: &str = "pyknic";

/// Fixed flags passed to the containerized application.
pub const APP_ENTRYPOINT_ARGS: [&str; 3] = ["-vv", "-c", "/pyknic.ini"];

/// Interpreter used to build the source distribution.
pub const DEFAULT_PACKAGING_PYTHON: &str = "python3";

/// Directory the sdist is written to.
pub const DEFAULT_DIST_DIR: &str = "dist";

/// Source-hosting API the status reporter talks to.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Prefix of every posted status context.
pub const DEFAULT_STATUS_CONTEXT_PREFIX: &str = "concourse-ci";

/// Timeout of a single status POST, in seconds.
pub const STATUS_TIMEOUT_SECS: u64 = 10;

/// Interpreter versions tested when none are configured.
pub const DEFAULT_PYTHON_VERSIONS: [&str; 3] = ["3.10", "3.11", "3.12"];

/// Image the rendered test tasks run in, tagged by interpreter version.
///
/// Each tag is the matching `python:<version>` image with the `pkci`
/// binary installed on `PATH`.
pub const DEFAULT_TASK_IMAGE: &str = "localhost:5000/pkci-python";

/// Virtualenv directory created inside the checkout.
pub const DEFAULT_VENV_DIR: &str = ".venv";

/// Requirement files installed into the virtualenv when present.
pub const DEFAULT_REQUIREMENT_FILES: [&str; 2] = ["requirements.txt", "dev-requirements.txt"];

/// Branch the merge step checks out before merging a pull request.
pub const MERGE_BRANCH: &str = "pkci-merge";

/// Modification time written into every repacked entry when none is given.
pub const DEFAULT_REPACK_MTIME: u64 = 0;

/// Environment variables read by the configuration layer.
pub mod env {
    /// Target registry of the publisher.
    pub const DOCKER_REGISTRY: &str = "DOCKER_REGISTRY";
    /// Image tag of the publisher.
    pub const IMAGE_TAG: &str = "IMAGE_TAG";
    /// Presence enables the repack step.
    pub const TAR_REPACK: &str = "TAR_REPACK";
    /// Reproducible-build timestamp honoured by the repack step.
    pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";
    /// Token used by the status reporter.
    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    /// `<org>/<repo>` the statuses are posted to.
    pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
    /// Concourse build identifier.
    pub const BUILD_ID: &str = "BUILD_ID";
    /// Concourse external URL, base of the build log link.
    pub const ATC_EXTERNAL_URL: &str = "ATC_EXTERNAL_URL";
    /// Pull request number.
    pub const PR_NUMBER: &str = "PR_NUMBER";
    /// Pull request head commit.
    pub const PR_HEAD_SHA: &str = "PR_HEAD_SHA";
    /// Pull request base branch.
    pub const PR_BASE_BRANCH: &str = "PR_BASE_BRANCH";
    /// Explicit configuration file path.
    pub const PKCI_CONFIG: &str = "PKCI_CONFIG";
}
