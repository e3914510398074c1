//! Read-only byte views.

use crate::error::{StorageError, StorageResult};

/// An immutable, random-access view over a run of bytes.
///
/// Views are **opaque** - they know nothing about segment headers or chunk
/// records. Every access is bounds-checked and out-of-range requests return
/// [`StorageError::OutOfRange`] instead of panicking, so parsers built on top
/// can turn a short read into a typed corruption error.
///
/// # Implementors
///
/// - [`super::InMemoryBytes`] - For testing
/// - [`super::MappedFile`] - Memory-mapped files
pub trait ByteView: Send + Sync {
    /// Returns the number of addressable bytes.
    fn len(&self) -> usize;

    /// Returns true if the view holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the whole view as a slice.
    fn as_slice(&self) -> &[u8];

    /// Returns the bytes in `start..end`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfRange`] if `start > end` or `end` is
    /// beyond [`ByteView::len`].
    fn range(&self, start: usize, end: usize) -> StorageResult<&[u8]> {
        let bytes = self.as_slice();
        if start > end || end > bytes.len() {
            return Err(StorageError::OutOfRange {
                start,
                end,
                len: bytes.len(),
            });
        }
        Ok(&bytes[start..end])
    }
}
