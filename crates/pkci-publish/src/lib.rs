//! # pkci-publish
//!
//! Builds the pyknic container image and pushes it to a registry.
//!
//! The [`publisher::Publisher`] runs the whole chain, stopping at the
//! first failing step:
//!
//! 1. [`sdist`]: package the Python project into a source distribution.
//! 2. `pkci_archive::repack`: optionally normalize the archive.
//! 3. [`dockerfile`]: stage a build context with a rendered Dockerfile.
//! 4. [`image`]: `docker build` and `docker push`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod dockerfile;
pub mod image;
pub mod publisher;
pub mod sdist;
