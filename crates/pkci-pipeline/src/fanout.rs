//! Branch × interpreter fan-out.
//!
//! Every discovered branch is tested on every supported interpreter
//! version, each [`PipelineInstance`] as its own Concourse pipeline
//! instance. The parent pipeline expands the cross-product at build time;
//! [`fan_out`] computes the same set locally from a branch listing.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::Path;

use pkci_common::error::{CiError, Result};
use pkci_common::types::{BranchName, PythonVersion};
use serde::Serialize;

/// One (branch, interpreter) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PipelineInstance {
    /// Stable display name, `<branch-slug>-py<version-slug>`.
    pub name: String,
    /// Branch under test.
    pub branch: BranchName,
    /// Interpreter version under test.
    pub python_version: PythonVersion,
}

impl PipelineInstance {
    /// Creates the instance for `branch` on `python_version`.
    #[must_use]
    pub fn new(branch: BranchName, python_version: PythonVersion) -> Self {
        Self {
            name: format!("{}-py{}", branch.slug(), python_version.slug()),
            branch,
            python_version,
        }
    }
}

/// Reads a branch listing file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_branch_listing(path: &Path) -> Result<Vec<BranchName>> {
    let content = std::fs::read_to_string(path).map_err(|e| CiError::io(path, e))?;
    let branches = parse_branch_listing(&content)?;
    tracing::debug!(path = %path.display(), count = branches.len(), "read branch listing");
    Ok(branches)
}

/// Parses a branch listing.
///
/// Accepts one branch per line, or a JSON/YAML sequence of names or of
/// `{name: ...}` objects as written by the git-branches resource. Blank
/// lines and `#` comments are ignored; duplicates are dropped keeping the
/// first occurrence.
///
/// # Errors
///
/// Returns an error for malformed sequences or invalid branch names.
pub fn parse_branch_listing(content: &str) -> Result<Vec<BranchName>> {
    let trimmed = content.trim_start();
    let branches = if trimmed.starts_with('[') || trimmed.starts_with('-') {
        let items: Vec<serde_yaml::Value> = serde_yaml::from_str(content)?;
        items
            .iter()
            .map(branch_from_value)
            .collect::<Result<Vec<_>>>()?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(BranchName::new)
            .collect::<Result<Vec<_>>>()?
    };
    Ok(dedup(branches))
}

fn branch_from_value(value: &serde_yaml::Value) -> Result<BranchName> {
    let name = match value {
        serde_yaml::Value::String(name) => Some(name.as_str()),
        serde_yaml::Value::Mapping(map) => map.get("name").and_then(serde_yaml::Value::as_str),
        _ => None,
    };
    name.map_or_else(
        || {
            Err(CiError::config(format!(
                "branch listing entry is neither a name nor {{name: ...}}: {value:?}"
            )))
        },
        BranchName::new,
    )
}

/// Removes duplicates, keeping the first occurrence of each item.
#[must_use]
pub fn dedup<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Builds the branches × versions cross-product.
///
/// Inputs are de-duplicated first, so the result holds exactly
/// `|unique branches| * |unique versions|` distinct instances, ordered by
/// branch, then version.
#[must_use]
pub fn fan_out(branches: &[BranchName], versions: &[PythonVersion]) -> Vec<PipelineInstance> {
    let branches = dedup(branches.iter().cloned());
    let versions = dedup(versions.iter().copied());
    let instances: Vec<_> = branches
        .iter()
        .flat_map(|branch| {
            versions
                .iter()
                .map(move |version| PipelineInstance::new(branch.clone(), *version))
        })
        .collect();
    tracing::info!(
        branches = branches.len(),
        versions = versions.len(),
        instances = instances.len(),
        "fanned out"
    );
    instances
}
