//! Row-major arithmetic and byte sequence utilities.
//!
//! A [`Sequence`] is a run of contiguous bytes at an offset.
//! Transfers between two independently selected byte spaces are expressed as a pair of sequence lists consumed in lock-step by [`vector_copy`] or [`for_each_segment`].

use std::num::NonZeroU64;

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::{ArrayIndices, ArrayShape};

/// A run of contiguous bytes at an offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    /// The byte offset.
    pub offset: u64,
    /// The byte length.
    pub len: u64,
}

impl Sequence {
    /// Create a new sequence.
    #[must_use]
    pub const fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// Return the exclusive end offset.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// A list of [`Sequence`]s with a resumable position.
///
/// Consuming part of the current sequence advances its offset and shrinks its length in place, so a cursor can be resumed after any number of bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceCursor {
    seqs: Vec<Sequence>,
    curr: usize,
}

impl SequenceCursor {
    /// Create a new cursor positioned at the first sequence.
    #[must_use]
    pub fn new(seqs: Vec<Sequence>) -> Self {
        Self { seqs, curr: 0 }
    }

    /// Create a cursor over a single sequence.
    #[must_use]
    pub fn single(offset: u64, len: u64) -> Self {
        Self::new(vec![Sequence::new(offset, len)])
    }

    /// Return the current (partially consumed) sequence, skipping empty sequences.
    #[must_use]
    pub fn current(&mut self) -> Option<Sequence> {
        while let Some(seq) = self.seqs.get(self.curr) {
            if seq.len > 0 {
                return Some(*seq);
            }
            self.curr += 1;
        }
        None
    }

    /// Consume `len` bytes of the current sequence.
    ///
    /// # Panics
    /// Panics if `len` exceeds the remaining length of the current sequence.
    pub fn advance(&mut self, len: u64) {
        let seq = &mut self.seqs[self.curr];
        assert!(len <= seq.len);
        seq.offset += len;
        seq.len -= len;
        if seq.len == 0 {
            self.curr += 1;
        }
    }

    /// Return the index of the current sequence.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.curr
    }

    /// Return the number of sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Returns true if the cursor holds no sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Returns true if every sequence has been consumed.
    #[must_use]
    pub fn is_exhausted(&mut self) -> bool {
        self.current().is_none()
    }

    /// Return the number of bytes remaining.
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 {
        self.seqs.iter().skip(self.curr).map(|seq| seq.len).sum()
    }

    /// Return the sequences.
    #[must_use]
    pub fn sequences(&self) -> &[Sequence] {
        &self.seqs
    }
}

/// Walk two sequence lists in lock-step, calling `op(dst_offset, src_offset, len)` for each maximal common segment.
///
/// Both cursors are advanced past the bytes handed to `op`, stopping as soon as either is exhausted.
/// Returns the total number of bytes handed to `op`.
///
/// # Errors
/// Returns the first error returned by `op`; the cursors then remain positioned at the failing segment.
pub fn for_each_segment<E>(
    dst: &mut SequenceCursor,
    src: &mut SequenceCursor,
    mut op: impl FnMut(u64, u64, u64) -> Result<(), E>,
) -> Result<u64, E> {
    let mut total = 0;
    while let (Some(d), Some(s)) = (dst.current(), src.current()) {
        let len = std::cmp::min(d.len, s.len);
        op(d.offset, s.offset, len)?;
        dst.advance(len);
        src.advance(len);
        total += len;
    }
    Ok(total)
}

/// Copy bytes from `src` to `dst` as described by two sequence lists.
///
/// This is the vector form of `memcpy`: the destination and source sequences may be shaped differently but are consumed in order.
/// Returns the number of bytes copied.
///
/// # Panics
/// Panics if a sequence lies outside its buffer.
pub fn vector_copy(
    dst: &mut [u8],
    dst_cursor: &mut SequenceCursor,
    src: &[u8],
    src_cursor: &mut SequenceCursor,
) -> u64 {
    let copied: Result<u64, std::convert::Infallible> =
        for_each_segment(dst_cursor, src_cursor, |dst_offset, src_offset, len| {
            let dst_offset = usize::try_from(dst_offset).unwrap();
            let src_offset = usize::try_from(src_offset).unwrap();
            let len = usize::try_from(len).unwrap();
            dst[dst_offset..dst_offset + len].copy_from_slice(&src[src_offset..src_offset + len]);
            Ok(())
        });
    match copied {
        Ok(copied) => copied,
        Err(never) => match never {},
    }
}

/// Return the row-major strides (in elements) of an array of shape `shape`.
///
/// These are the "down sizes" used to linearise indices: the last dimension has stride 1.
#[must_use]
pub fn row_major_strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Ravel (linearise) indices with row-major strides.
#[must_use]
pub fn ravel_with_strides(indices: &[u64], strides: &[u64]) -> u64 {
    std::iter::zip(indices, strides).map(|(i, s)| i * s).sum()
}

/// Ravel (linearise) indices in an array of shape `shape`.
///
/// Returns [`None`] if the indices are out of bounds or the dimensionality differs.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> Option<u64> {
    if indices.len() != shape.len() || std::iter::zip(indices, shape).any(|(i, s)| i >= s) {
        return None;
    }
    Some(ravel_with_strides(indices, &row_major_strides(shape)))
}

/// Unravel a linearised index to indices in an array of shape `shape`.
///
/// Returns [`None`] if the index is out of bounds.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> Option<ArrayIndices> {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        if dim == 0 {
            return None;
        }
        *indices_i = index % dim;
        index /= dim;
    }
    (index == 0).then_some(indices)
}

/// Return the shape of a regular chunk grid covering `array_shape`.
///
/// Each dimension has `ceil(array_shape[i] / chunk_shape[i])` chunks.
#[must_use]
pub fn grid_shape(array_shape: &[u64], chunk_shape: &[NonZeroU64]) -> ArrayShape {
    std::iter::zip(array_shape, chunk_shape)
        .map(|(&a, &c)| a.div_ceil(c.get()))
        .collect()
}

/// Return the chunk grid indices of the chunk containing the element at `indices`.
#[must_use]
pub fn chunk_grid_indices(indices: &[u64], chunk_shape: &[NonZeroU64]) -> ArrayIndices {
    std::iter::zip(indices, chunk_shape)
        .map(|(&i, &c)| i / c.get())
        .collect()
}

/// Return the linear chunk index of the chunk at `chunk_indices` given the grid down sizes.
#[must_use]
pub fn chunk_index(chunk_indices: &[u64], down_sizes: &[u64]) -> u64 {
    ravel_with_strides(chunk_indices, down_sizes)
}

/// Return the indices of an element relative to the start of the chunk containing it.
#[must_use]
pub fn chunk_local_indices(indices: &[u64], chunk_shape: &[NonZeroU64]) -> ArrayIndices {
    izip!(indices, chunk_shape)
        .map(|(&i, &c)| i % c.get())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_and_ravel() {
        assert_eq!(row_major_strides(&[4, 3, 2]), vec![6, 2, 1]);
        assert_eq!(row_major_strides(&[]), Vec::<u64>::new());
        assert_eq!(ravel_indices(&[1, 2], &[4, 3]), Some(5));
        assert_eq!(ravel_indices(&[4, 0], &[4, 3]), None);
        assert_eq!(unravel_index(5, &[4, 3]), Some(vec![1, 2]));
        assert_eq!(unravel_index(12, &[4, 3]), None);
        assert_eq!(unravel_index(0, &[]), Some(vec![]));
    }

    #[test]
    fn chunk_arithmetic() {
        let chunk_shape = [NonZeroU64::new(10).unwrap(), NonZeroU64::new(3).unwrap()];
        assert_eq!(grid_shape(&[100, 10], &chunk_shape), vec![10, 4]);
        let scaled = chunk_grid_indices(&[57, 7], &chunk_shape);
        assert_eq!(scaled, vec![5, 2]);
        let down_sizes = row_major_strides(&grid_shape(&[100, 10], &chunk_shape));
        assert_eq!(chunk_index(&scaled, &down_sizes), 22);
        assert_eq!(chunk_local_indices(&[57, 7], &chunk_shape), vec![7, 1]);
    }

    #[test]
    fn vector_copy_mismatched_sequences() {
        let src: Vec<u8> = (0..10).collect();
        let mut dst = vec![0u8; 10];
        let mut src_cursor =
            SequenceCursor::new(vec![Sequence::new(0, 3), Sequence::new(5, 4)]);
        let mut dst_cursor = SequenceCursor::new(vec![
            Sequence::new(1, 2),
            Sequence::new(4, 0),
            Sequence::new(6, 4),
        ]);
        let copied = vector_copy(&mut dst, &mut dst_cursor, &src, &mut src_cursor);
        assert_eq!(copied, 6);
        assert_eq!(dst, vec![0, 0, 1, 0, 0, 0, 2, 5, 6, 7]);
        assert!(dst_cursor.is_exhausted());
        assert_eq!(src_cursor.current(), Some(Sequence::new(8, 1)));
        assert_eq!(src_cursor.remaining_bytes(), 1);
    }

    #[test]
    fn for_each_segment_error() {
        let mut dst = SequenceCursor::single(0, 8);
        let mut src = SequenceCursor::new(vec![Sequence::new(0, 4), Sequence::new(10, 4)]);
        let mut calls = 0;
        let result = for_each_segment(&mut dst, &mut src, |_, src_offset, _| {
            calls += 1;
            if src_offset == 10 { Err("fail") } else { Ok(()) }
        });
        assert_eq!(result, Err("fail"));
        assert_eq!(calls, 2);
        assert_eq!(dst.current(), Some(Sequence::new(4, 4)));
    }
}
