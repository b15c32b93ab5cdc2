//! Locating the external tools a workflow depends on.

use std::path::PathBuf;

use pkci_common::error::{CiError, Result};

/// Finds `program` on `PATH`.
///
/// # Errors
///
/// Returns `CiError::NotFound` if the program is not installed.
pub fn locate(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| CiError::NotFound {
        kind: "executable",
        id: format!("{program} (not on PATH{})", install_hint(program)),
    })
}

/// Checks that every program is installed before a workflow starts, so a
/// missing tool fails the run before any step has side effects.
///
/// # Errors
///
/// Returns `CiError::NotFound` for the first missing program.
pub fn require_all<'a>(programs: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for program in programs {
        let path = locate(program)?;
        tracing::debug!(program, path = %path.display(), "tool found");
    }
    Ok(())
}

fn install_hint(program: &str) -> &'static str {
    if program == "docker" {
        "; see https://docs.docker.com/engine/install/"
    } else if program.starts_with("python") {
        "; install the matching CPython interpreter"
    } else if program == "git" {
        "; install git"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_missing_program_fails_with_hint() {
        let err = locate("docker-pkci-missing").expect_err("missing");
        assert!(err.to_string().contains("docker-pkci-missing"));
    }

    #[test]
    fn require_all_accepts_empty_list() {
        assert!(require_all([]).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn locate_finds_shell() {
        assert!(locate("sh").is_ok());
    }

    #[test]
    fn python_hint_mentions_interpreter() {
        assert!(install_hint("python3.12").contains("CPython"));
    }
}
