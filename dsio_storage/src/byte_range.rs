//! Byte offsets and ranges in a file address space.
//!
//! Layouts address storage with a plain [`ByteOffset`] and a length.
//! A [`ByteRange`] is only needed when a range is relative to the end of the written address space, which is resolved against the current size with [`ByteRange::resolve`].

use std::ops::{Range, RangeFrom};

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range, relative to the start or the end of the written address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteRange {
    /// An offset and a length; [`None`] extends to the end of the written bytes.
    FromStart(ByteOffset, Option<ByteLength>),
    /// The trailing bytes of the written address space.
    Suffix(ByteLength),
}

impl From<Range<u64>> for ByteRange {
    fn from(range: Range<u64>) -> Self {
        Self::FromStart(range.start, Some(range.end.saturating_sub(range.start)))
    }
}

impl From<RangeFrom<u64>> for ByteRange {
    fn from(range: RangeFrom<u64>) -> Self {
        Self::FromStart(range.start, None)
    }
}

impl ByteRange {
    /// Resolve the byte range against an address space with `size` written bytes.
    ///
    /// A range with an explicit length may extend past `size`: those bytes read as zero.
    ///
    /// # Errors
    /// Returns an [`InvalidByteRangeError`] if an open-ended range starts past `size` or a suffix is longer than `size`.
    pub fn resolve(self, size: u64) -> Result<Range<u64>, InvalidByteRangeError> {
        match self {
            Self::FromStart(offset, Some(length)) => Ok(offset..offset + length),
            Self::FromStart(offset, None) if offset <= size => Ok(offset..size),
            Self::Suffix(length) if length <= size => Ok(size - length..size),
            _ => Err(InvalidByteRangeError::new(self, size)),
        }
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromStart(offset, Some(length)) => write!(f, "{offset}..{}", offset + length),
            Self::FromStart(offset, None) => write!(f, "{offset}.."),
            Self::Suffix(length) => write!(f, "-{length}.."),
        }
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("byte range {0} cannot be resolved against {1} written bytes")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, size: u64) -> Self {
        Self(byte_range, size)
    }

    /// Return the offending byte range.
    #[must_use]
    pub const fn byte_range(&self) -> ByteRange {
        self.0
    }
}

/// A [`ByteRange`] iterator.
pub type ByteRangeIterator<'a> = Box<dyn Iterator<Item = ByteRange> + Send + 'a>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_resolve() {
        assert_eq!(ByteRange::from(4..10).resolve(6).unwrap(), 4..10);
        assert_eq!(ByteRange::from(2..).resolve(6).unwrap(), 2..6);
        assert_eq!(ByteRange::from(6..).resolve(6).unwrap(), 6..6);
        assert_eq!(ByteRange::Suffix(2).resolve(6).unwrap(), 4..6);
        assert!(ByteRange::from(7..).resolve(6).is_err());

        let err = ByteRange::Suffix(7).resolve(6).unwrap_err();
        assert_eq!(err.byte_range(), ByteRange::Suffix(7));
        assert_eq!(
            err.to_string(),
            "byte range -7.. cannot be resolved against 6 written bytes"
        );
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(ByteRange::FromStart(5, None).to_string(), "5..");
        assert_eq!(ByteRange::FromStart(5, Some(2)).to_string(), "5..7");
    }
}
