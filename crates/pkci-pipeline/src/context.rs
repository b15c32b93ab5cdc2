//! Pull request context of a CI job.
//!
//! The orchestrator hands pull request metadata over either as environment
//! variables (`PR_NUMBER`, `PR_HEAD_SHA`, `PR_BASE_BRANCH`) or as the
//! metadata directory the pull request resource writes next to its
//! checkout (`.git/resource/{pr,head_sha,base_name}`). No metadata at all
//! means the job runs for a plain branch.

use std::path::Path;

use pkci_common::constants::env;
use pkci_common::error::{CiError, Result};
use pkci_common::types::PullRequest;

/// Metadata file holding the pull request number.
pub const PR_NUMBER_FILE: &str = "pr";
/// Metadata file holding the head commit SHA.
pub const PR_HEAD_SHA_FILE: &str = "head_sha";
/// Metadata file holding the base branch name.
pub const PR_BASE_FILE: &str = "base_name";

/// Reads the pull request from environment variables.
///
/// Returns `None` when none of the variables is set to a non-empty value.
///
/// # Errors
///
/// Returns `CiError::Config` when only some of them are set, or a value is
/// malformed.
pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<PullRequest>> {
    let number = lookup(env::PR_NUMBER).unwrap_or_default();
    let head = lookup(env::PR_HEAD_SHA).unwrap_or_default();
    let base = lookup(env::PR_BASE_BRANCH).unwrap_or_default();
    from_parts(&number, &head, &base, "environment")
}

/// Reads the pull request from a resource metadata directory.
///
/// # Errors
///
/// Returns an error if the directory does not exist, misses a file, or a
/// file holds an empty or malformed value.
pub fn from_metadata_dir(dir: &Path) -> Result<PullRequest> {
    if !dir.is_dir() {
        return Err(CiError::NotFound {
            kind: "pull request metadata directory",
            id: dir.display().to_string(),
        });
    }
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read_to_string(&path).map_err(|e| CiError::io(path, e))
    };
    let number = read(PR_NUMBER_FILE)?;
    let head = read(PR_HEAD_SHA_FILE)?;
    let base = read(PR_BASE_FILE)?;
    from_parts(&number, &head, &base, "metadata directory")?
        .ok_or_else(|| CiError::config(format!("{} holds no pull request", dir.display())))
}

/// Resolves the pull request for a job.
///
/// A metadata directory, when given, takes precedence over the environment.
///
/// # Errors
///
/// See [`from_env`] and [`from_metadata_dir`].
pub fn detect(
    metadata_dir: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<PullRequest>> {
    let pull_request = match metadata_dir {
        Some(dir) => Some(from_metadata_dir(dir)?),
        None => from_env(lookup)?,
    };
    match &pull_request {
        Some(pr) => tracing::info!(
            number = pr.number,
            head = %pr.head_sha,
            base = %pr.base_branch,
            "pull request context"
        ),
        None => tracing::info!("no pull request context, statuses will not be posted"),
    }
    Ok(pull_request)
}

fn from_parts(number: &str, head: &str, base: &str, origin: &str) -> Result<Option<PullRequest>> {
    let fields = [number.trim(), head.trim(), base.trim()];
    if fields.iter().all(|f| f.is_empty()) {
        return Ok(None);
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(CiError::config(format!(
            "incomplete pull request context from {origin}: number={:?} head_sha={:?} base={:?}",
            fields[0], fields[1], fields[2]
        )));
    }
    PullRequest::from_raw(fields[0], fields[1], fields[2]).map(Some)
}
