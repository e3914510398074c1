//! Chunk encoding tags.

use std::fmt;

/// Identifies how a chunk's bytes are laid out.
///
/// Tags occupy the low seven bits of the stored encoding byte; the high bit
/// is reserved by the chunk store for its own flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Encoding(u8);

impl Encoding {
    /// Opaque bytes with no sample structure.
    pub const NONE: Self = Self(0);
    /// Delta-encoded timestamps with raw float values, see [`crate::SampleChunk`].
    pub const DELTA: Self = Self(1);

    /// Highest tag value an encoding may use.
    pub const MAX_TAG: u8 = 0x7F;

    /// Creates an encoding from a raw tag.
    #[must_use]
    pub const fn new(tag: u8) -> Self {
        Self(tag)
    }

    /// Returns the raw tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Checks that the tag leaves the reserved high bit clear.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 <= Self::MAX_TAG
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("none"),
            Self::DELTA => f.write_str("delta"),
            Self(other) => write!(f, "enc:{other}"),
        }
    }
}

impl From<Encoding> for u8 {
    fn from(encoding: Encoding) -> Self {
        encoding.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_display() {
        assert_eq!(Encoding::NONE.to_string(), "none");
        assert_eq!(Encoding::DELTA.to_string(), "delta");
        assert_eq!(Encoding::new(9).to_string(), "enc:9");
    }

    #[test]
    fn encoding_validity() {
        assert!(Encoding::DELTA.is_valid());
        assert!(Encoding::new(0x7F).is_valid());
        assert!(!Encoding::new(0x80).is_valid());
    }
}
