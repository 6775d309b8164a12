//! Array subset iterators.
//!
//! The iterators are:
//!  - [`Indices`]: iterate over the multidimensional indices of the elements in the subset.
//!  - [`Chunks`]: iterate over the regular chunks overlapping the subset.
//!
//! Both iterate over the last dimension fastest (i.e. C-contiguous order).

use std::{iter::FusedIterator, num::NonZeroU64};

use itertools::izip;

use crate::{ArrayIndices, IncompatibleDimensionalityError};

use super::ArraySubset;

/// An iterator over the indices of elements within an array subset.
///
/// For example, the subset `[1..3, 1..3]` produces `[1, 1]`, `[1, 2]`, `[2, 1]`, `[2, 2]`.
#[derive(Clone, Debug)]
pub struct Indices {
    subset: ArraySubset,
    next: Option<ArrayIndices>,
    remaining: u64,
}

impl Indices {
    /// Create a new indices iterator.
    #[must_use]
    pub fn new(subset: ArraySubset) -> Self {
        let remaining = subset.num_elements();
        let next = (remaining > 0).then(|| subset.start().to_vec());
        Self {
            subset,
            next,
            remaining,
        }
    }

    /// Return the number of indices remaining.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn increment(&self, indices: &mut [u64]) -> bool {
        for (index, &start, &shape) in
            izip!(indices.iter_mut(), self.subset.start(), self.subset.shape()).rev()
        {
            *index += 1;
            if *index < start + shape {
                return true;
            }
            *index = start;
        }
        false
    }
}

impl Iterator for Indices {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut next = current.clone();
        if self.increment(&mut next) {
            self.next = Some(next);
        }
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl FusedIterator for Indices {}

/// Iterates over the regular sized chunks overlapping an array subset.
///
/// All chunks have the same size, and may extend over the bounds of the array subset since the start of the first chunk is aligned to the chunk size.
///
/// The iterator item is a ([`ArrayIndices`], [`ArraySubset`]) tuple corresponding to the chunk grid indices and the chunk's array subset.
///
/// For example, consider a 4x3 array with element indices
/// ```text
/// (0, 0)  (0, 1)  (0, 2)
/// (1, 0)  (1, 1)  (1, 2)
/// (2, 0)  (2, 1)  (2, 2)
/// (3, 0)  (3, 1)  (3, 2)
/// ```
/// A 2x2 chunks iterator with an array subset covering the entire array will produce
/// ```rust,ignore
/// [
///     ((0, 0), ArraySubset{offset: (0,0), shape: (2, 2)}),
///     ((0, 1), ArraySubset{offset: (0,2), shape: (2, 2)}),
///     ((1, 0), ArraySubset{offset: (2,0), shape: (2, 2)}),
///     ((1, 1), ArraySubset{offset: (2,2), shape: (2, 2)}),
/// ]
/// ```
#[derive(Clone, Debug)]
pub struct Chunks {
    indices: Indices,
    chunk_shape: Vec<u64>,
}

impl Chunks {
    /// Create a new chunks iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` does not match the dimensionality of `subset`.
    pub fn new(
        subset: &ArraySubset,
        chunk_shape: &[NonZeroU64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                subset.dimensionality(),
            ));
        }
        let chunk_shape: Vec<u64> = chunk_shape.iter().map(|c| c.get()).collect();
        let grid_subset = match subset.end_inc() {
            Some(end) => {
                let chunk_start: ArrayIndices = std::iter::zip(subset.start(), &chunk_shape)
                    .map(|(s, c)| s / c)
                    .collect();
                let shape: ArrayIndices = izip!(end, &chunk_shape, &chunk_start)
                    .map(|(e, &c, &s)| (e / c).saturating_sub(s) + 1)
                    .collect();
                ArraySubset::new_with_start_shape(chunk_start, shape)?
            }
            None => ArraySubset::new_empty(subset.dimensionality()),
        };
        Ok(Self {
            indices: grid_subset.indices(),
            chunk_shape,
        })
    }

    /// Return the number of chunks remaining.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.indices.remaining()
    }

    /// Returns true if there are no chunks remaining.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for Chunks {
    type Item = (ArrayIndices, ArraySubset);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk_indices = self.indices.next()?;
        let ranges =
            std::iter::zip(&chunk_indices, &self.chunk_shape).map(|(i, c)| (i * c)..(i * c) + c);
        let chunk_subset = ArraySubset::from(ranges);
        Some((chunk_indices, chunk_subset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl FusedIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset_iter_indices() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let mut iter = subset.indices();
        assert_eq!(iter.size_hint(), (4, Some(4)));
        assert_eq!(iter.next(), Some(vec![1, 1]));
        assert_eq!(iter.next(), Some(vec![1, 2]));
        assert_eq!(iter.next(), Some(vec![2, 1]));
        assert_eq!(iter.next(), Some(vec![2, 2]));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);

        assert_eq!(ArraySubset::new_with_ranges(&[1..1, 0..3]).indices().count(), 0);
        assert_eq!(
            ArraySubset::new_with_shape(vec![]).indices().collect::<Vec<_>>(),
            vec![Vec::<u64>::new()]
        );
    }

    #[test]
    fn array_subset_iter_chunks() {
        let subset = ArraySubset::new_with_ranges(&[1..5, 1..5]);
        let chunk_shape = [NonZeroU64::new(2).unwrap(), NonZeroU64::new(2).unwrap()];
        let chunks = subset.chunks(&chunk_shape).unwrap();
        assert_eq!(chunks.len(), 9);
        let chunks = chunks.collect::<Vec<_>>();
        assert_eq!(chunks[0], (vec![0, 0], ArraySubset::new_with_ranges(&[0..2, 0..2])));
        assert_eq!(chunks[1], (vec![0, 1], ArraySubset::new_with_ranges(&[0..2, 2..4])));
        assert_eq!(chunks[8], (vec![2, 2], ArraySubset::new_with_ranges(&[4..6, 4..6])));

        let subset = ArraySubset::new_with_ranges(&[5..15, 5..15]);
        let chunk_shape = [NonZeroU64::new(10).unwrap(), NonZeroU64::new(10).unwrap()];
        let indices: Vec<_> = subset.chunks(&chunk_shape).unwrap().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        assert!(ArraySubset::new_empty(2).chunks(&chunk_shape).unwrap().is_empty());
        assert!(subset.chunks(&chunk_shape[..1]).is_err());
    }
}
