//! # pkci-runtime
//!
//! Every workflow step of pyknic-ci is an external program: git, python,
//! pip, pytest, mypy, docker. This crate is the single place they are
//! spawned from.
//!
//! - [`process`]: `CommandSpec`, the `CommandRunner` seam and the system runner.
//! - [`tool`]: locating executables on `PATH`.
//! - [`fake`]: a scripted runner for tests of the workflows built on top.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod fake;
pub mod process;
pub mod tool;
