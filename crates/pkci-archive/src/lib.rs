//! # pkci-archive
//!
//! Source distribution archive handling for the publisher.
//!
//! Handles:
//! - **Extract**: Unpacking plain and gzip-compressed tarballs.
//! - **Repack**: Re-archiving with normalized metadata so identical inputs
//!   always produce byte-identical archives.
//! - **Hashing**: SHA-256 digests of the produced archives.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod extract;
pub mod hash;
pub mod repack;
