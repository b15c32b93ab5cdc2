//! Domain primitive types used across the pyknic-ci workspace.
//!
//! These are the transient CI variables handed from step to step. They are
//! opaque strings with one rule: whatever describes a pull request is never
//! empty.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CiError, Result};

/// A git branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Creates a branch name, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Config` if the name is empty or contains whitespace.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(CiError::config("branch name is empty"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CiError::config(format!(
                "branch name contains whitespace: {name:?}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a name safe for Concourse identifiers (`feature/x` → `feature-x`).
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = CiError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A git commit SHA, abbreviated or full.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a commit SHA from a hex string.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Config` unless the input is 7 to 40 hex characters.
    pub fn new(sha: impl AsRef<str>) -> Result<Self> {
        let sha = sha.as_ref().trim();
        if !(7..=40).contains(&sha.len()) || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CiError::config(format!("invalid commit SHA: {sha:?}")));
        }
        Ok(Self(sha.to_ascii_lowercase()))
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one CI build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(String);

impl BuildId {
    /// Creates a build ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random build ID for runs outside the orchestrator.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `major.minor` Python interpreter version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion {
    major: u8,
    minor: u8,
}

impl PythonVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Interpreter binary name, e.g. `python3.12`.
    #[must_use]
    pub fn binary(&self) -> String {
        format!("python{self}")
    }

    /// Identifier-safe form, e.g. `312`.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || CiError::config(format!("invalid Python version {s:?}, expected MAJOR.MINOR"));
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = CiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PythonVersion> for String {
    fn from(value: PythonVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An `<org>/<repo>` repository slug on the source-hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    /// Repository owner (user or organization).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoSlug {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(CiError::config(format!(
                "invalid repository {s:?}, expected <org>/<repo>"
            ))),
        }
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = CiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepoSlug> for String {
    fn from(value: RepoSlug) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Metadata of the pull request a CI job operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Head commit of the pull request; statuses are posted against it.
    pub head_sha: CommitSha,
    /// Branch the pull request merges into.
    pub base_branch: BranchName,
}

impl PullRequest {
    /// Builds a pull request from raw CI variables.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Config` if any field is empty or malformed.
    pub fn from_raw(number: &str, head_sha: &str, base_branch: &str) -> Result<Self> {
        let number = number.trim();
        if number.is_empty() {
            return Err(CiError::config("pull request number is empty"));
        }
        let number = number
            .parse()
            .map_err(|_| CiError::config(format!("invalid pull request number: {number:?}")))?;
        Ok(Self {
            number,
            head_sha: CommitSha::new(head_sha)?,
            base_branch: BranchName::new(base_branch)?,
        })
    }
}

/// Commit status posted to the source-hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// The task passed.
    Success,
    /// The task failed.
    Failure,
}

impl CommitState {
    /// Maps a task outcome to a status.
    #[must_use]
    pub const fn from_passed(passed: bool) -> Self {
        if passed { Self::Success } else { Self::Failure }
    }
}

impl FromStr for CommitState {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(CiError::config(format!(
                "invalid commit state {other:?}, expected success or failure"
            ))),
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Fully qualified reference of a container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, optionally with port.
    pub registry: String,
    /// Repository name inside the registry.
    pub name: String,
    /// Image tag.
    pub tag: String,
}

impl ImageRef {
    /// Creates an image reference.
    ///
    /// # Errors
    ///
    /// Returns `CiError::Config` if any component is empty or the tag
    /// contains characters docker rejects.
    pub fn new(
        registry: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self> {
        let registry = registry.into().trim_end_matches('/').to_string();
        let name = name.into();
        let tag = tag.into();
        if registry.is_empty() || name.is_empty() || tag.is_empty() {
            return Err(CiError::config(format!(
                "incomplete image reference {registry:?}/{name:?}:{tag:?}"
            )));
        }
        if tag.len() > 128
            || tag.starts_with(['.', '-'])
            || !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(CiError::config(format!("invalid image tag: {tag:?}")));
        }
        Ok(Self {
            registry,
            name,
            tag,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.name, self.tag)
    }
}

/// Lowercases and replaces every run of non-alphanumeric characters with `-`.
fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
