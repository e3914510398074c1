//! In-memory byte view for testing.

use crate::view::ByteView;

/// An owned, in-memory byte view.
///
/// Useful for unit tests of parsers that normally run over memory-mapped
/// files, and for tools that read a whole file into memory.
///
/// # Example
///
/// ```rust
/// use chunkdb_storage::{ByteView, InMemoryBytes};
///
/// let view = InMemoryBytes::new(b"hello world".to_vec());
/// assert_eq!(view.range(6, 11).unwrap(), b"world");
/// assert!(view.range(6, 12).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryBytes {
    data: Vec<u8>,
}

impl InMemoryBytes {
    /// Creates a view over the given bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Consumes the view and returns the underlying bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for InMemoryBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteView for InMemoryBytes {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
