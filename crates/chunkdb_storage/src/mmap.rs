//! Memory-mapped read-only files.

use crate::error::StorageResult;
use crate::view::ByteView;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A read-only memory map of a whole file.
///
/// The map is shared with the page cache, so bytes written to the file
/// through another handle become visible here once they reach the OS
/// (flushed from any userspace buffer). The map covers the file length at
/// the time it was opened; callers that grow or shrink the file must reopen
/// the map.
///
/// # Exclusivity
///
/// The directory holding mapped files must be owned exclusively by this
/// process. Truncating a mapped file from outside turns accesses past the new
/// end into `SIGBUS`.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    // Zero-length files cannot be mapped on every platform.
    mmap: Option<Mmap>,
}

impl MappedFile {
    /// Maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        Self::from_file(path, &file)
    }

    /// Maps an already opened file. The handle may be dropped afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read or the map fails.
    #[allow(unsafe_code)]
    pub fn from_file(path: &Path, file: &File) -> StorageResult<Self> {
        let len = file.metadata()?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and the owning directory is not
            // modified by other processes. Files are only truncated by this
            // process while every map of them is held exclusively and is
            // replaced before readers resume.
            Some(unsafe { Mmap::map(file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Returns the path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteView for MappedFile {
    fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn map_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001");
        std::fs::write(&path, b"mapped bytes").unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert_eq!(mapped.len(), 12);
        assert_eq!(mapped.range(7, 12).unwrap(), b"bytes");
        assert_eq!(mapped.path(), path);
    }

    #[test]
    fn map_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001");
        std::fs::write(&path, b"").unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert!(mapped.is_empty());
        assert!(mapped.range(0, 1).is_err());
    }

    #[test]
    fn map_sees_writes_through_other_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        file.set_len(16).unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert_eq!(mapped.range(0, 4).unwrap(), &[0, 0, 0, 0]);

        file.write_all(b"abcd").unwrap();
        file.flush().unwrap();
        assert_eq!(mapped.range(0, 4).unwrap(), b"abcd");
    }

    #[test]
    fn map_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(MappedFile::open(&dir.path().join("nope")).is_err());
    }
}
