//! Tar archive extraction.
//!
//! Streams a tar archive entry by entry into a target directory. Only regular
//! files are materialized; parent directories are created as needed. Entries
//! whose path contains a `..` component are skipped with a warning so a single
//! hostile entry never aborts an otherwise valid archive.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use oscar_core::error::{OscarError, Result};
use tar::Archive;

/// Outcome of an extraction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written
    pub files: usize,
    /// Entries skipped (non-regular files and rejected paths)
    pub skipped: usize,
}

/// Extract a (optionally gzip-compressed) tar file from disk.
pub fn extract_layer(layer_path: &Path, target_dir: &Path, gzip: bool) -> Result<ExtractSummary> {
    let file = File::open(layer_path).map_err(|e| OscarError::NotFoundError {
        target: layer_path.display().to_string(),
        message: e.to_string(),
    })?;
    extract_stream(file, gzip, &layer_path.display().to_string(), target_dir)
}

/// Extract a tar stream, decompressing gzip first when `gzip` is set.
///
/// `source_name` is only used for error context.
pub fn extract_stream<R: Read>(
    reader: R,
    gzip: bool,
    source_name: &str,
    target_dir: &Path,
) -> Result<ExtractSummary> {
    if gzip {
        extract_archive(GzDecoder::new(reader), source_name, target_dir)
    } else {
        extract_archive(reader, source_name, target_dir)
    }
}

/// Extract an uncompressed tar stream into `target_dir`.
///
/// Files from entries processed before a failure are left in place.
pub fn extract_archive<R: Read>(
    reader: R,
    source_name: &str,
    target_dir: &Path,
) -> Result<ExtractSummary> {
    let corrupt = |e: io::Error| OscarError::CorruptArchiveError {
        source_name: source_name.to_string(),
        message: e.to_string(),
    };

    std::fs::create_dir_all(target_dir).map_err(|e| OscarError::local_write(target_dir, e))?;

    let mut archive = Archive::new(reader);
    let mut summary = ExtractSummary::default();

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;

        if !entry.header().entry_type().is_file() {
            summary.skipped += 1;
            continue;
        }

        let entry_path = entry.path().map_err(corrupt)?.into_owned();
        let Some(relative) = sanitize_entry_path(&entry_path) else {
            tracing::warn!(
                name = %entry_path.display(),
                "Skipping archive entry that uses '..' within the path"
            );
            summary.skipped += 1;
            continue;
        };

        let out_path = target_dir.join(&relative);
        write_entry(&mut entry, &out_path).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => corrupt(e),
            _ => OscarError::local_write(&out_path, e),
        })?;
        summary.files += 1;
    }

    tracing::debug!(
        source = source_name,
        target = %target_dir.display(),
        files = summary.files,
        skipped = summary.skipped,
        "Extracted archive"
    );

    Ok(summary)
}

/// Turn an entry path into a path relative to the extraction root.
///
/// Returns `None` when the path contains a parent-directory component.
/// Leading `/` and `./` are dropped, matching a plain path join.
pub(crate) fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn write_entry<R: Read>(entry: &mut tar::Entry<'_, R>, out_path: &Path) -> io::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Replace rather than write through an existing symlink.
    if out_path.symlink_metadata().is_ok() {
        std::fs::remove_file(out_path)?;
    }
    let mut file = File::create(out_path)?;
    io::copy(entry, &mut file)?;

    if let Ok(mode) = entry.header().mode() {
        set_mode(&file, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}
