//! Array subsets.
//!
//! An [`ArraySubset`] is a box in the index space of a dataspace: a start and a shape per dimension.
//! Subsets describe the bounding boxes of selections and the cells of a regular chunk grid.

pub mod iterators;

use std::{num::NonZeroU64, ops::Range};

use itertools::izip;

use crate::{ArrayIndices, ArrayShape, IncompatibleDimensionalityError};

use iterators::{Chunks, Indices};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ArraySubset {
    start: ArrayIndices,
    shape: ArrayShape,
}

impl<T: IntoIterator<Item = Range<u64>>> From<T> for ArraySubset {
    fn from(ranges: T) -> Self {
        let (start, shape) = ranges
            .into_iter()
            .map(|range| (range.start, range.end.saturating_sub(range.start)))
            .unzip();
        Self { start, shape }
    }
}

impl ArraySubset {
    /// Create an array subset of rank `rank` with no elements.
    #[must_use]
    pub fn new_empty(rank: usize) -> Self {
        Self {
            start: vec![0; rank],
            shape: vec![0; rank],
        }
    }

    /// Create an array subset covering `ranges`.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        Self::from(ranges.iter().cloned())
    }

    /// Create an array subset covering a whole extent of `shape`.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create an array subset from a start and a shape.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `start` and `shape` differ in length.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(start.len(), shape.len()))
        }
    }

    /// The start of the subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// The shape of the subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// The subset as one half-open range per dimension.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        std::iter::zip(&self.start, &self.shape)
            .map(|(&start, &size)| start..start + size)
            .collect()
    }

    /// Returns true if any dimension has zero size.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// The last indices inside the subset, or [`None`] for an empty subset.
    #[must_use]
    pub fn end_inc(&self) -> Option<ArrayIndices> {
        (!self.is_empty()).then(|| {
            std::iter::zip(&self.start, &self.shape)
                .map(|(start, size)| start + size - 1)
                .collect()
        })
    }

    /// The number of elements in the subset.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns true if `indices` lies in the subset.
    #[must_use]
    pub fn contains(&self, indices: &[u64]) -> bool {
        indices.len() == self.dimensionality()
            && izip!(indices, &self.start, &self.shape)
                .all(|(&index, &start, &size)| index >= start && index - start < size)
    }

    /// An iterator over the indices of the subset in row-major order.
    #[must_use]
    pub fn indices(&self) -> Indices {
        Indices::new(self.clone())
    }

    /// An iterator over the cells of a regular grid of `chunk_shape` that touch the subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` does not match the dimensionality of the subset.
    pub fn chunks(
        &self,
        chunk_shape: &[NonZeroU64],
    ) -> Result<Chunks, IncompatibleDimensionalityError> {
        Chunks::new(self, chunk_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset() {
        assert!(ArraySubset::new_with_start_shape(vec![2, 3], vec![4, 4]).is_ok());
        assert_eq!(
            ArraySubset::new_with_start_shape(vec![2, 3], vec![4]).unwrap_err(),
            IncompatibleDimensionalityError::new(2, 1)
        );

        let subset = ArraySubset::new_with_ranges(&[5..15, 5..15]);
        assert_eq!(subset.start(), &[5, 5]);
        assert_eq!(subset.shape(), &[10, 10]);
        assert_eq!(subset.end_inc(), Some(vec![14, 14]));
        assert_eq!(subset.num_elements(), 100);
        assert!(subset.contains(&[14, 5]));
        assert!(!subset.contains(&[15, 5]));
        assert!(!subset.contains(&[4, 5]));
        assert!(!subset.contains(&[5]));
        assert_eq!(subset.to_ranges(), vec![5..15, 5..15]);

        assert!(ArraySubset::new_with_ranges(&[3..3, 0..4]).is_empty());
        assert_eq!(ArraySubset::new_empty(2).end_inc(), None);
        assert_eq!(ArraySubset::new_with_shape(vec![]).num_elements(), 1);
    }
}
