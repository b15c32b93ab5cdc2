//! Source distribution packaging.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use pkci_common::error::{CiError, Result};
use pkci_runtime::process::{self, CommandRunner, CommandSpec};

/// Returns the command that writes an sdist of `project_dir` into `dist_dir`.
///
/// Projects with a `setup.py` use it directly; others go through the
/// PEP 517 `build` frontend.
#[must_use]
pub fn sdist_command(python: &str, project_dir: &Path, dist_dir: &Path) -> CommandSpec {
    let cmd = CommandSpec::new(python).current_dir(project_dir);
    if project_dir.join("setup.py").is_file() {
        cmd.args(["setup.py", "sdist", "--dist-dir"]).path_arg(dist_dir)
    } else {
        cmd.args(["-m", "build", "--sdist", "--outdir"]).path_arg(dist_dir)
    }
}

/// Packages the project and returns the path of the produced archive.
///
/// `dist_dir` is resolved against `project_dir` when relative.
///
/// # Errors
///
/// Returns an error if the packaging command fails or leaves no archive.
pub fn build_sdist(
    runner: &dyn CommandRunner,
    python: &str,
    project_dir: &Path,
    dist_dir: &Path,
) -> Result<PathBuf> {
    let dist_dir = if dist_dir.is_absolute() {
        dist_dir.to_path_buf()
    } else {
        project_dir.join(dist_dir)
    };
    tracing::info!(
        project = %project_dir.display(),
        dist = %dist_dir.display(),
        "packaging source distribution"
    );

    let _ = process::run_checked(runner, &sdist_command(python, project_dir, &dist_dir))?;

    let sdist = newest_archive(&dist_dir)?;
    tracing::info!(sdist = %sdist.display(), "source distribution ready");
    Ok(sdist)
}

/// Picks the most recently modified `.tar.gz` in `dir`.
///
/// # Errors
///
/// Returns `CiError::NotFound` if the directory holds no archive.
pub fn newest_archive(dir: &Path) -> Result<PathBuf> {
    let not_found = || CiError::NotFound {
        kind: "source distribution",
        id: format!("{}/*.tar.gz", dir.display()),
    };
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(CiError::io(dir, e)),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for item in read_dir {
        let item = item.map_err(|e| CiError::io(dir, e))?;
        let path = item.path();
        let is_sdist = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tar.gz"));
        if !is_sdist || !path.is_file() {
            continue;
        }
        let modified = item
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| CiError::io(&path, e))?;
        let newer = newest
            .as_ref()
            .is_none_or(|(t, p)| modified > *t || (modified == *t && path > *p));
        if newer {
            newest = Some((modified, path));
        }
    }
    newest.map(|(_, path)| path).ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use pkci_runtime::fake::ScriptedRunner;

    use super::*;

    #[test]
    fn setup_py_projects_use_setuptools() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("setup.py"), "").expect("write");
        let cmd = sdist_command("python3", dir.path(), Path::new("/out"));
        assert_eq!(cmd.args, vec!["setup.py", "sdist", "--dist-dir", "/out"]);
        assert_eq!(cmd.cwd.as_deref(), Some(dir.path()));
    }

    #[test]
    fn pyproject_projects_use_build_frontend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = sdist_command("python3", dir.path(), Path::new("/out"));
        assert_eq!(cmd.args, vec!["-m", "build", "--sdist", "--outdir", "/out"]);
    }

    #[test]
    fn newest_archive_ignores_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("pyknic-0.1.whl"), "x").expect("write");
        std::fs::write(dir.path().join("pyknic-0.1.tar.gz"), "x").expect("write");
        let found = newest_archive(dir.path()).expect("found");
        assert!(found.ends_with("pyknic-0.1.tar.gz"));
    }

    #[test]
    fn newest_archive_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = newest_archive(&dir.path().join("dist")).expect_err("missing");
        assert!(matches!(err, CiError::NotFound { .. }));
    }

    #[test]
    fn failing_packaging_command_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new().fail_on("sdist", 1);
        let result = build_sdist(&runner, "python3", dir.path(), Path::new("dist"));
        assert!(matches!(result, Err(CiError::CommandFailed { .. })));
    }

    #[test]
    fn successful_command_without_archive_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new();
        let result = build_sdist(&runner, "python3", dir.path(), Path::new("dist"));
        assert!(matches!(result, Err(CiError::NotFound { .. })));
    }
}
