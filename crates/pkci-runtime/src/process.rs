//! External process execution.
//!
//! Workflows describe what to run as a [`CommandSpec`] and hand it to a
//! [`CommandRunner`]. The system runner spawns real processes; tests swap
//! in [`crate::fake::ScriptedRunner`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pkci_common::error::{CiError, Result};

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, without the program.
    pub args: Vec<String>,
    /// Working directory; inherits the current one when unset.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Starts a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// How a finished command ended.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOutput {
    /// Exit code returned by the command, `-1` if killed by a signal.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes commands.
///
/// A runner reports how a command ended; it only fails when the command
/// could not be started at all.
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned.
    fn run(&self, command: &CommandSpec) -> Result<ExecOutput>;
}

/// Runs `command` and turns a non-zero exit into `CiError::CommandFailed`.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or exits unsuccessfully.
pub fn run_checked(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<ExecOutput> {
    let output = runner.run(command)?;
    if output.success() {
        Ok(output)
    } else {
        tracing::error!(command = %command, code = output.exit_code, "command failed");
        Err(CiError::CommandFailed {
            program: command.program.clone(),
            code: output.exit_code,
        })
    }
}

/// Runner that spawns real processes.
///
/// Child output goes straight to this process's stdout and stderr, as CI
/// logs expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<ExecOutput> {
        tracing::info!(command = %command, cwd = ?command.cwd, "running");

        let mut cmd = Command::new(&command.program);
        let _ = cmd.args(&command.args).stdin(Stdio::null());
        if let Some(ref dir) = command.cwd {
            let _ = cmd.current_dir(dir);
        }

        let status = cmd
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CiError::NotFound {
                        kind: "executable",
                        id: command.program.clone(),
                    }
                } else {
                    CiError::io(&command.program, e)
                }
            })?;
        let output = ExecOutput {
            exit_code: status.code().unwrap_or(-1),
        };

        tracing::debug!(command = %command.program, code = output.exit_code, "finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandSpec::new("git")
            .args(["commit", "-m"])
            .arg("merge pr")
            .arg("");
        assert_eq!(cmd.to_string(), "git commit -m \"merge pr\" \"\"");
    }

    #[test]
    fn builder_sets_cwd() {
        let cmd = CommandSpec::new("pip").current_dir("/src");
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/src")));
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = SystemRunner
            .run(&CommandSpec::new("pkci-definitely-not-installed"))
            .expect_err("should fail to spawn");
        assert!(matches!(err, CiError::NotFound { .. }), "got {err}");
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let output = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "exit 3"]))
            .expect("spawn");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_maps_failure_to_command_failed() {
        let err = run_checked(&SystemRunner, &CommandSpec::new("sh").args(["-c", "exit 1"]))
            .expect_err("should fail");
        match err {
            CiError::CommandFailed { program, code } => {
                assert_eq!(program, "sh");
                assert_eq!(code, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn cwd_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("marker");
        let output = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "touch marker"]).current_dir(dir.path()))
            .expect("spawn");
        assert!(output.success());
        assert!(marker.is_file());
    }
}
