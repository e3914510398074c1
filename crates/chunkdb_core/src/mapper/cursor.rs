//! Reference assignment for the next chunk.

use crate::format::HEADER_SIZE;
use crate::types::ChunkDiskMapperRef;

/// Position the next chunk will be written at.
///
/// References are handed out here, before any byte is written, so that an
/// asynchronous write can return its reference immediately. The cursor
/// therefore also decides when a new file must be cut.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    seq: u64,
    offset: u64,
    cut_pending: bool,
}

impl Cursor {
    /// Creates a cursor whose next chunk opens file `seq + 1`.
    pub(crate) fn at_seq(seq: u64) -> Self {
        let mut cursor = Self::default();
        cursor.set_seq(seq);
        cursor
    }

    /// Reserves `bytes` for the next chunk.
    ///
    /// Returns the chunk's reference and whether the writer has to cut a new
    /// file before writing it.
    pub(crate) fn next_ref(&mut self, bytes: u64, max_file_size: u64) -> (ChunkDiskMapperRef, bool) {
        let cut = self.cut_pending || self.offset == 0 || self.offset + bytes > max_file_size;
        if cut {
            self.seq += 1;
            self.offset = HEADER_SIZE as u64;
            self.cut_pending = false;
        }
        let chunk_ref = ChunkDiskMapperRef::new(self.seq, self.offset);
        self.offset += bytes;
        (chunk_ref, cut)
    }

    /// Makes the next chunk go to a new file.
    pub(crate) fn request_cut(&mut self) {
        self.cut_pending = true;
    }

    /// Rewinds to `seq`. The next chunk cuts file `seq + 1`.
    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
        self.offset = 0;
    }

    #[cfg(test)]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_cuts() {
        let mut cursor = Cursor::at_seq(0);
        let (r, cut) = cursor.next_ref(40, 1024);
        assert!(cut);
        assert_eq!(r.unpack(), (1, 8));

        let (r, cut) = cursor.next_ref(40, 1024);
        assert!(!cut);
        assert_eq!(r.unpack(), (1, 48));
    }

    #[test]
    fn cuts_when_file_is_full() {
        let mut cursor = Cursor::at_seq(4);
        cursor.next_ref(500, 1024);
        let (r, cut) = cursor.next_ref(516, 1024);
        assert!(!cut);
        assert_eq!(r.unpack(), (5, 508));

        let (r, cut) = cursor.next_ref(1, 1024);
        assert!(cut);
        assert_eq!(r.unpack(), (6, 8));
    }

    #[test]
    fn requested_cut_applies_once() {
        let mut cursor = Cursor::at_seq(0);
        cursor.next_ref(40, 1024);
        cursor.request_cut();

        assert!(cursor.next_ref(40, 1024).1);
        assert!(!cursor.next_ref(40, 1024).1);
        assert_eq!(cursor.seq(), 2);
    }

    #[test]
    fn set_seq_forces_cut() {
        let mut cursor = Cursor::at_seq(0);
        cursor.next_ref(40, 1024);
        cursor.set_seq(7);
        let (r, cut) = cursor.next_ref(40, 1024);
        assert!(cut);
        assert_eq!(r.seq(), 8);
    }
}
