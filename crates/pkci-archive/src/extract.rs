//! Tarball extraction.
//!
//! Supports plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives,
//! which covers every sdist format setuptools produces.

use std::path::Path;

use pkci_common::error::{CiError, Result};

/// Compression applied on top of the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// gzip-compressed tar.
    Gzip,
}

impl Compression {
    /// Determines the compression from the archive extension.
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        let gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"));
        if gzip { Self::Gzip } else { Self::None }
    }
}

/// Summary of an extracted archive.
#[derive(Debug, Clone, Copy)]
pub struct Extracted {
    /// Compression of the source archive.
    pub compression: Compression,
    /// Size of the source archive in bytes.
    pub size_bytes: u64,
}

/// Extracts a tar archive into the target directory.
///
/// Extended attributes are never restored and modification times are left
/// to the filesystem; only the permission bits survive.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or unpacked.
pub fn extract_archive(archive_path: &Path, target: &Path) -> Result<Extracted> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting archive"
    );

    std::fs::create_dir_all(target).map_err(|e| CiError::io(target, e))?;

    let file = std::fs::File::open(archive_path).map_err(|e| CiError::io(archive_path, e))?;
    let size_bytes = file
        .metadata()
        .map_err(|e| CiError::io(archive_path, e))?
        .len();

    let compression = Compression::detect(archive_path);
    match compression {
        Compression::Gzip => unpack(tar::Archive::new(flate2::read::GzDecoder::new(file)), target)?,
        Compression::None => unpack(tar::Archive::new(file), target)?,
    }

    tracing::debug!(size = size_bytes, ?compression, "archive extracted");
    Ok(Extracted {
        compression,
        size_bytes,
    })
}

fn unpack<R: std::io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<()> {
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);
    archive.unpack(target).map_err(|e| CiError::io(target, e))
}
