//! Sequence-numbered segment files on disk.
//!
//! A segment directory holds files named by a zero-padded, six-digit
//! decimal sequence number:
//!
//! ```text
//! <dir>/
//! ├─ 000001
//! ├─ 000002
//! └─ 000003.tmp   # in-flight cut, renamed into place once its header is durable
//! ```
//!
//! Nothing here interprets file contents; headers are passed in as opaque
//! bytes by the caller.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix used for files that are still being created.
const TEMP_SUFFIX: &str = "tmp";

/// Returns the path of the segment file with sequence `seq` in `dir`.
#[must_use]
pub fn segment_file_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("{seq:06}"))
}

/// Lists every segment file in `dir`, keyed by sequence number.
///
/// Entries whose names are not plain decimal numbers are ignored.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_sequence_files(dir: &Path) -> StorageResult<BTreeMap<u64, PathBuf>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(seq) = name.to_str().and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };
        files.insert(seq, entry.path());
    }
    Ok(files)
}

/// Returns the sequence number and path the next cut in `dir` should use.
///
/// This is one past the highest existing sequence number, or 1 for an empty
/// directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn next_sequence_file(dir: &Path) -> StorageResult<(u64, PathBuf)> {
    let last = list_sequence_files(dir)?
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0);
    let seq = last + 1;
    Ok((seq, segment_file_path(dir, seq)))
}

/// A freshly cut segment file, positioned just past its header.
#[derive(Debug)]
pub struct CutFile {
    /// Sequence number of the new file.
    pub seq: u64,
    /// Path of the new file.
    pub path: PathBuf,
    /// Write handle, positioned at `header_len`.
    pub file: File,
    /// Number of header bytes written.
    pub header_len: u64,
}

/// Creates the next segment file in `dir`.
///
/// The header is first written to a temporary file and renamed into place,
/// so a crash never leaves a numbered file without a complete header. The
/// file is then preallocated to `preallocate` bytes (if non-zero) and the
/// returned handle is positioned right after the header.
///
/// # Errors
///
/// Returns an error if any file system operation fails.
pub fn cut_segment_file(dir: &Path, header: &[u8], preallocate: u64) -> StorageResult<CutFile> {
    let (seq, path) = next_sequence_file(dir)?;
    let tmp = path.with_extension(TEMP_SUFFIX);

    {
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(header)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    sync_dir(dir)?;

    let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
    if preallocate > 0 {
        preallocate_file(&file, preallocate)?;
    }
    file.seek(SeekFrom::Start(header.len() as u64))?;

    Ok(CutFile {
        seq,
        path,
        file,
        header_len: header.len() as u64,
    })
}

/// Grows `file` to at least `len` bytes, backed by allocated zeroed blocks.
///
/// Files already larger than `len` are left untouched.
///
/// # Errors
///
/// Returns an error if the allocation fails.
pub fn preallocate_file(file: &File, len: u64) -> StorageResult<()> {
    if file.metadata()?.len() >= len {
        return Ok(());
    }
    file.allocate(len)?;
    Ok(())
}

/// Truncates `file` to exactly `len` bytes and syncs it.
///
/// Used when finalizing a preallocated file. Growing a file through this
/// function is rejected.
///
/// # Errors
///
/// Returns an error if `len` is larger than the file, or on I/O failure.
pub fn truncate_file(file: &File, len: u64) -> StorageResult<()> {
    let current = file.metadata()?.len();
    if len > current {
        return Err(StorageError::invalid_input(format!(
            "cannot truncate to size {len} which is greater than current size {current}"
        )));
    }
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}

/// Makes directory entry changes (create, rename, delete) durable.
///
/// # Errors
///
/// Returns an error if the directory cannot be opened or synced.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Makes directory entry changes durable. A no-op where directories cannot
/// be opened as files.
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

/// Removes leftover temporary files from interrupted cuts.
///
/// Returns the number of files removed.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a file cannot be
/// removed.
pub fn remove_temp_files(dir: &Path) -> StorageResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(TEMP_SUFFIX) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Returns the combined size in bytes of every regular file in `dir`.
///
/// # Errors
///
/// Returns an error if the directory or a file's metadata cannot be read.
pub fn dir_size(dir: &Path) -> StorageResult<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}
