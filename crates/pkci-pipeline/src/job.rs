//! The test job run by every pipeline instance.
//!
//! Merge (pull requests only), provision a virtualenv, then run pytest and
//! mypy. Each task's result is reported as a commit status; the first
//! failing task ends the job.

use std::fmt;
use std::path::{Path, PathBuf};

use pkci_common::config::PipelineConfig;
use pkci_common::constants;
use pkci_common::error::{CiError, Result};
use pkci_common::types::{CommitState, PullRequest, PythonVersion};
use pkci_runtime::process::{CommandRunner, CommandSpec, run_checked};

use crate::status::{ReportOutcome, StatusReporter};

const GIT: &str = "git";

/// Files marking a directory as an installable project.
const PROJECT_FILES: [&str; 2] = ["setup.py", "pyproject.toml"];

/// A checked task of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// The test suite.
    Pytest,
    /// The type checker.
    Mypy,
}

impl Task {
    /// Tasks in the order they run.
    pub const ALL: [Self; 2] = [Self::Pytest, Self::Mypy];

    /// Python module running the task.
    #[must_use]
    pub const fn module(self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Mypy => "mypy",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module())
    }
}

/// Result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// The task.
    pub task: Task,
    /// Whether it passed.
    pub passed: bool,
    /// What happened to its status.
    pub status: ReportOutcome,
}

/// Result of a job in which every task passed.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Interpreter the job ran on.
    pub python_version: PythonVersion,
    /// Whether a pull request was merged first.
    pub merged: bool,
    /// Task results, in run order.
    pub tasks: Vec<TaskResult>,
}

/// One test job for a checkout and interpreter version.
pub struct TestJob<'a> {
    runner: &'a dyn CommandRunner,
    reporter: StatusReporter<'a>,
    config: PipelineConfig,
    checkout: PathBuf,
    python_version: PythonVersion,
}

impl<'a> TestJob<'a> {
    /// Creates a job for the repository checked out at `checkout`.
    ///
    /// The reporter's pull request, if any, is merged before testing.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        reporter: StatusReporter<'a>,
        config: PipelineConfig,
        checkout: impl Into<PathBuf>,
        python_version: PythonVersion,
    ) -> Self {
        Self {
            runner,
            reporter,
            config,
            checkout: checkout.into(),
            python_version,
        }
    }

    /// Status context name of `task` on this job's interpreter, e.g. `pytest-py3.12`.
    #[must_use]
    pub fn task_name(&self, task: Task) -> String {
        format!("{task}-py{}", self.python_version)
    }

    /// Interpreter inside the job's virtualenv.
    #[must_use]
    pub fn venv_python(&self) -> PathBuf {
        let venv = self.checkout.join(&self.config.venv_dir);
        if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        }
    }

    /// Runs the job.
    ///
    /// # Errors
    ///
    /// Returns the error of the merge or provisioning step, which post no
    /// status, or the error of the first failing task after its failure
    /// status has been reported. A task that cannot be started counts as
    /// failed.
    pub fn run(&self) -> Result<JobReport> {
        tracing::info!(
            python = %self.python_version,
            checkout = %self.checkout.display(),
            "starting test job"
        );

        let merged = match self.reporter.pull_request() {
            Some(pr) => {
                self.merge(pr)?;
                true
            }
            None => false,
        };
        self.provision()?;

        let mut tasks = Vec::with_capacity(Task::ALL.len());
        for task in Task::ALL {
            tasks.push(self.run_task(task)?);
        }

        tracing::info!(python = %self.python_version, "test job passed");
        Ok(JobReport {
            python_version: self.python_version,
            merged,
            tasks,
        })
    }

    fn command(&self, program: impl Into<String>) -> CommandSpec {
        CommandSpec::new(program).current_dir(&self.checkout)
    }

    fn merge(&self, pr: &PullRequest) -> Result<()> {
        tracing::info!(number = pr.number, base = %pr.base_branch, "merging pull request");
        let steps = [
            self.command(GIT)
                .args(["fetch", "origin", pr.base_branch.as_str()]),
            self.command(GIT)
                .args(["checkout", "-B", constants::MERGE_BRANCH, "FETCH_HEAD"]),
            self.command(GIT)
                .args([
                    "-c",
                    "user.name=pkci",
                    "-c",
                    "user.email=pkci@localhost",
                    "merge",
                    "--no-ff",
                    "--no-edit",
                ])
                .arg(pr.head_sha.as_str()),
        ];
        for step in &steps {
            let _ = run_checked(self.runner, step)?;
        }
        Ok(())
    }

    fn provision(&self) -> Result<()> {
        let venv = self.checkout.join(&self.config.venv_dir);
        let python = self.venv_python();
        tracing::info!(venv = %venv.display(), "provisioning virtualenv");

        let mut steps = vec![
            self.command(self.python_version.binary())
                .args(["-m", "venv"])
                .path_arg(&venv),
            self.command(python.display().to_string())
                .args(["-m", "pip", "install", "--upgrade", "pip"]),
        ];
        for file in &self.config.requirement_files {
            if self.checkout.join(file).is_file() {
                steps.push(
                    self.command(python.display().to_string())
                        .args(["-m", "pip", "install", "-r"])
                        .path_arg(file),
                );
            } else {
                tracing::debug!(file = %file.display(), "requirements file absent, skipped");
            }
        }
        if is_project(&self.checkout) {
            steps.push(
                self.command(python.display().to_string())
                    .args(["-m", "pip", "install", "-e", "."]),
            );
        }

        for step in &steps {
            let _ = run_checked(self.runner, step)?;
        }
        Ok(())
    }

    fn run_task(&self, task: Task) -> Result<TaskResult> {
        let args = match task {
            Task::Pytest => &self.config.pytest_args,
            Task::Mypy => &self.config.mypy_args,
        };
        let command = self
            .command(self.venv_python().display().to_string())
            .args(["-m", task.module()])
            .args(args.iter().cloned());

        let name = self.task_name(task);
        let output = match self.runner.run(&command) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(task = %name, error = %e, "task could not start");
                let _ = self.reporter.report(&name, CommitState::Failure);
                return Err(e);
            }
        };
        let passed = output.success();
        let status = self.reporter.report(&name, CommitState::from_passed(passed));

        if passed {
            tracing::info!(task = %name, "task passed");
            Ok(TaskResult {
                task,
                passed,
                status,
            })
        } else {
            tracing::error!(task = %name, code = output.exit_code, "task failed");
            Err(CiError::CommandFailed {
                program: name,
                code: output.exit_code,
            })
        }
    }
}

fn is_project(dir: &Path) -> bool {
    PROJECT_FILES.iter().any(|f| dir.join(f).is_file())
}
