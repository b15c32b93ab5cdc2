//! # pkci-pipeline
//!
//! The CI side of pyknic-ci.
//!
//! Handles:
//! - **Context**: Pull request metadata handed over by the orchestrator.
//! - **Status**: Best-effort commit statuses on the source-hosting service.
//! - **Fan-out**: The branches × interpreter versions cross-product.
//! - **Concourse**: Typed pipeline documents rendered to YAML.
//! - **Job**: One test job: merge, provision, pytest, mypy, report.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod concourse;
pub mod context;
pub mod fanout;
pub mod job;
pub mod status;
