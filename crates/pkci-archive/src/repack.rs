//! Deterministic re-archiving of source distributions.
//!
//! setuptools stamps every sdist member with the build machine's
//! timestamps, owners and traversal order, so two builds of the same tree
//! never hash the same and every downstream image layer is rebuilt. The
//! repacker extracts the archive and writes its contents back with all of
//! that metadata pinned:
//!
//! - entries in sorted path order,
//! - a fixed modification time,
//! - uid/gid 0 and no user or group names,
//! - modes collapsed to `0755` (directories, executables) or `0644`,
//! - no PAX records, so no ACLs or extended attributes,
//! - a gzip header without file name and with a zero timestamp.

use std::io::Write;
use std::path::{Path, PathBuf};

use pkci_common::error::{CiError, Result};

use crate::extract::{self, Compression};
use crate::hash::{self, Sha256Hash};

const GZIP_LEVEL: u32 = 9;

/// Knobs of the repack step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackOptions {
    /// Modification time written into every entry, in unix seconds.
    pub mtime: u64,
}

impl Default for RepackOptions {
    fn default() -> Self {
        Self {
            mtime: pkci_common::constants::DEFAULT_REPACK_MTIME,
        }
    }
}

/// Outcome of a repack.
#[derive(Debug, Clone)]
pub struct RepackReport {
    /// Archive that was written.
    pub output: PathBuf,
    /// Number of entries (files, directories, symlinks) written.
    pub entries: usize,
    /// Size of the written archive in bytes.
    pub size_bytes: u64,
    /// Digest of the written archive.
    pub hash: Sha256Hash,
    /// Compression of the written archive, same as the input's.
    pub compression: Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File { executable: bool },
    Symlink,
}

#[derive(Debug)]
struct Entry {
    /// Path relative to the extraction root, `/`-separated, with a
    /// trailing `/` for directories so sort order matches header order.
    name: String,
    kind: EntryKind,
}

/// Repacks `input` into `output` with normalized metadata.
///
/// `input` and `output` may be the same path; the result is written to a
/// sibling temporary file and renamed into place only once complete, so a
/// failure never leaves a truncated archive behind.
///
/// # Errors
///
/// Returns an error if extraction, traversal, or writing fails. Every error
/// is fatal for the caller's build.
pub fn repack(input: &Path, output: &Path, options: &RepackOptions) -> Result<RepackReport> {
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        mtime = options.mtime,
        "repacking archive"
    );

    let staging = tempfile::tempdir().map_err(|e| CiError::io(std::env::temp_dir(), e))?;
    let extracted = extract::extract_archive(input, staging.path())?;

    let mut entries = Vec::new();
    collect_entries(staging.path(), staging.path(), &mut entries)?;
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| CiError::io(parent, e))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| CiError::io(parent, e))?;

    match extracted.compression {
        Compression::Gzip => {
            let encoder = flate2::GzBuilder::new()
                .mtime(0)
                .write(&mut temp, flate2::Compression::new(GZIP_LEVEL));
            let encoder = write_tar(encoder, staging.path(), &entries, options, output)?;
            let _ = encoder.finish().map_err(|e| CiError::io(output, e))?;
        }
        Compression::None => {
            let _ = write_tar(&mut temp, staging.path(), &entries, options, output)?;
        }
    }

    temp.as_file()
        .sync_all()
        .map_err(|e| CiError::io(output, e))?;
    let _ = temp.persist(output).map_err(|e| CiError::io(output, e.error))?;

    let size_bytes = std::fs::metadata(output)
        .map_err(|e| CiError::io(output, e))?
        .len();
    let hash = hash::hash_file(output)?;
    tracing::info!(
        entries = entries.len(),
        size = size_bytes,
        hash = %hash,
        "archive repacked"
    );

    Ok(RepackReport {
        output: output.to_path_buf(),
        entries: entries.len(),
        size_bytes,
        hash,
        compression: extracted.compression,
    })
}

/// Repacks an archive over itself.
///
/// # Errors
///
/// See [`repack`].
pub fn repack_in_place(path: &Path, options: &RepackOptions) -> Result<RepackReport> {
    repack(path, path, options)
}

fn write_tar<W: Write>(
    writer: W,
    root: &Path,
    entries: &[Entry],
    options: &RepackOptions,
    output: &Path,
) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for entry in entries {
        let source = root.join(&entry.name);
        let mut header = tar::Header::new_gnu();
        header.set_mtime(options.mtime);
        header.set_uid(0);
        header.set_gid(0);
        header.set_username("").map_err(|e| CiError::io(&source, e))?;
        header.set_groupname("").map_err(|e| CiError::io(&source, e))?;

        match entry.kind {
            EntryKind::Dir => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder
                    .append_data(&mut header, &entry.name, std::io::empty())
                    .map_err(|e| CiError::io(output, e))?;
            }
            EntryKind::File { executable } => {
                let file = std::fs::File::open(&source).map_err(|e| CiError::io(&source, e))?;
                let size = file
                    .metadata()
                    .map_err(|e| CiError::io(&source, e))?
                    .len();
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(if executable { 0o755 } else { 0o644 });
                header.set_size(size);
                builder
                    .append_data(&mut header, &entry.name, file)
                    .map_err(|e| CiError::io(output, e))?;
            }
            EntryKind::Symlink => {
                let target = std::fs::read_link(&source).map_err(|e| CiError::io(&source, e))?;
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder
                    .append_link(&mut header, &entry.name, &target)
                    .map_err(|e| CiError::io(output, e))?;
            }
        }
    }

    builder.into_inner().map_err(|e| CiError::io(output, e))
}

fn collect_entries(root: &Path, dir: &Path, out: &mut Vec<Entry>) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| CiError::io(dir, e))?;
    for item in read_dir {
        let item = item.map_err(|e| CiError::io(dir, e))?;
        let path = item.path();
        let file_type = item.file_type().map_err(|e| CiError::io(&path, e))?;
        let name = relative_name(root, &path)?;

        if file_type.is_symlink() {
            out.push(Entry {
                name,
                kind: EntryKind::Symlink,
            });
        } else if file_type.is_dir() {
            out.push(Entry {
                name: format!("{name}/"),
                kind: EntryKind::Dir,
            });
            collect_entries(root, &path, out)?;
        } else {
            let metadata = item.metadata().map_err(|e| CiError::io(&path, e))?;
            out.push(Entry {
                name,
                kind: EntryKind::File {
                    executable: is_executable(&metadata),
                },
            });
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| CiError::config(format!("{} escapes the staging root", path.display())))?;
    let parts = rel
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| {
                CiError::config(format!("archive member {} is not valid UTF-8", rel.display()))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}
