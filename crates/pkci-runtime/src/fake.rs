//! Scripted command runner for tests.
//!
//! Records every command it is asked to run and answers with a scripted
//! exit code, so workflow tests can assert on the exact command sequence
//! without spawning anything.

use std::sync::Mutex;

use pkci_common::error::{CiError, Result};

use crate::process::{CommandRunner, CommandSpec, ExecOutput};

#[derive(Debug)]
enum Outcome {
    Exit(i32),
    Missing,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    outcome: Outcome,
}

/// A [`CommandRunner`] that never spawns processes.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// A runner on which every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes commands whose rendered line contains `needle` exit with `code`.
    ///
    /// The first matching rule wins.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>, exit_code: i32) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: Outcome::Exit(exit_code),
        });
        self
    }

    /// Makes commands containing `needle` fail to start, as if the
    /// executable did not exist.
    #[must_use]
    pub fn missing(mut self, needle: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: Outcome::Missing,
        });
        self
    }

    /// Commands run so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the call log lock is poisoned.
    pub fn calls(&self) -> Result<Vec<CommandSpec>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .map_err(|_| CiError::config("scripted runner lock poisoned"))
    }

    /// Rendered command lines run so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the call log lock is poisoned.
    pub fn lines(&self) -> Result<Vec<String>> {
        Ok(self.calls()?.iter().map(ToString::to_string).collect())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> Result<ExecOutput> {
        self.calls
            .lock()
            .map_err(|_| CiError::config("scripted runner lock poisoned"))?
            .push(command.clone());

        let line = command.to_string();
        match self.rules.iter().find(|rule| line.contains(&rule.needle)) {
            None => Ok(ExecOutput::default()),
            Some(Rule {
                outcome: Outcome::Exit(exit_code),
                ..
            }) => Ok(ExecOutput {
                exit_code: *exit_code,
            }),
            Some(Rule {
                outcome: Outcome::Missing,
                ..
            }) => Err(CiError::NotFound {
                kind: "executable",
                id: command.program.clone(),
            }),
        }
    }
}
