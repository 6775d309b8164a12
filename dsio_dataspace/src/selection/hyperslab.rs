use std::ops::Range;

use itertools::{izip, Itertools};

use crate::{ArraySubset, IncompatibleDimensionalityError};

use super::SelectionError;

/// A hyperslab selection.
///
/// A hyperslab is stored as a sorted list of disjoint, non-adjacent, non-empty intervals per dimension.
/// The selected elements are the Cartesian product of those lists, so any regular `(start, stride, count, block)` hyperslab is represented exactly,
/// and intersecting with a rectangular region or translating keeps the same form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Hyperslab {
    intervals: Vec<Vec<Range<u64>>>,
}

impl Hyperslab {
    /// Create a regular hyperslab.
    ///
    /// Dimension `i` selects `count[i]` blocks of `block[i]` elements, starting at `start[i]` and spaced `stride[i]` apart.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the arguments differ in length or blocks overlap (`stride < block` with more than one block).
    pub fn new_regular(
        start: &[u64],
        stride: &[u64],
        count: &[u64],
        block: &[u64],
    ) -> Result<Self, SelectionError> {
        let rank = start.len();
        for len in [stride.len(), count.len(), block.len()] {
            if len != rank {
                return Err(IncompatibleDimensionalityError::new(len, rank).into());
            }
        }
        let mut intervals = Vec::with_capacity(rank);
        let dims = izip!(start, stride, count, block).enumerate();
        for (dim, (&start, &stride, &count, &block)) in dims {
            if count > 1 && stride < block {
                return Err(SelectionError::OverlappingBlocks { dim, stride, block });
            }
            let dim_intervals = (0..count)
                .map(|i| {
                    let block_start = start + i * stride;
                    block_start..block_start + block
                })
                .collect();
            intervals.push(dim_intervals);
        }
        Ok(Self::from_intervals(intervals))
    }

    /// Create a hyperslab selecting a single rectangular block.
    #[must_use]
    pub fn from_subset(subset: &ArraySubset) -> Self {
        Self::from_intervals(subset.to_ranges().into_iter().map(|r| vec![r]).collect())
    }

    /// Create a hyperslab from arbitrary per-dimension intervals.
    ///
    /// Intervals are sorted, and overlapping or adjacent intervals are merged.
    #[must_use]
    pub fn from_intervals(intervals: Vec<Vec<Range<u64>>>) -> Self {
        let intervals = intervals
            .into_iter()
            .map(|mut dim| {
                dim.retain(|r| r.start < r.end);
                dim.sort_by_key(|r| r.start);
                dim.into_iter()
                    .coalesce(|a, b| {
                        if b.start <= a.end {
                            Ok(a.start..std::cmp::max(a.end, b.end))
                        } else {
                            Err((a, b))
                        }
                    })
                    .collect()
            })
            .collect();
        Self { intervals }
    }

    /// Return the dimensionality.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.intervals.len()
    }

    /// Return the intervals of each dimension.
    #[must_use]
    pub fn intervals(&self) -> &[Vec<Range<u64>>] {
        &self.intervals
    }

    /// Return the number of selected elements in dimension `dim`.
    #[must_use]
    pub fn dim_len(&self, dim: usize) -> u64 {
        self.intervals[dim].iter().map(|r| r.end - r.start).sum()
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        (0..self.rank()).map(|dim| self.dim_len(dim)).product()
    }

    /// Returns true if no elements are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.iter().any(Vec::is_empty)
    }

    /// Returns true if the hyperslab is a single rectangular block (or empty).
    #[must_use]
    pub fn is_single_block(&self) -> bool {
        self.intervals.iter().all(|dim| dim.len() <= 1)
    }

    /// Returns true if the hyperslab contains `indices`.
    #[must_use]
    pub fn contains(&self, indices: &[u64]) -> bool {
        indices.len() == self.rank()
            && std::iter::zip(&self.intervals, indices)
                .all(|(dim, &i)| dim.iter().any(|r| r.contains(&i)))
    }

    /// Return the bounding box, or [`None`] if the hyperslab is empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<ArraySubset> {
        if self.is_empty() {
            return None;
        }
        Some(ArraySubset::from(self.intervals.iter().map(|dim| {
            let first = dim.first().map_or(0, |r| r.start);
            let last = dim.last().map_or(0, |r| r.end);
            first..last
        })))
    }

    /// Return the intersection with the rectangular region `subset`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `subset` has a different dimensionality.
    pub fn intersect_subset(
        &self,
        subset: &ArraySubset,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != self.rank() {
            return Err(IncompatibleDimensionalityError::new(
                subset.dimensionality(),
                self.rank(),
            ));
        }
        let intervals = std::iter::zip(&self.intervals, subset.to_ranges())
            .map(|(dim, bound)| {
                dim.iter()
                    .filter_map(|r| {
                        let start = std::cmp::max(r.start, bound.start);
                        let end = std::cmp::min(r.end, bound.end);
                        (start < end).then_some(start..end)
                    })
                    .collect()
            })
            .collect();
        Ok(Self { intervals })
    }

    /// Return the hyperslab translated by `delta`, or [`None`] if a coordinate would become negative or overflow.
    #[must_use]
    pub fn translate(&self, delta: &[i64]) -> Option<Self> {
        if delta.len() != self.rank() {
            return None;
        }
        let intervals = std::iter::zip(&self.intervals, delta)
            .map(|(dim, &d)| {
                dim.iter()
                    .map(|r| Some(r.start.checked_add_signed(d)?..r.end.checked_add_signed(d)?))
                    .collect::<Option<Vec<_>>>()
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { intervals })
    }

    /// Return the hyperslab relative to `origin` (i.e. translated by `-origin`).
    ///
    /// Returns [`None`] if a coordinate would become negative.
    #[must_use]
    pub fn relative_to(&self, origin: &[u64]) -> Option<Self> {
        let delta = origin
            .iter()
            .map(|&o| i64::try_from(o).ok().map(|o| -o))
            .collect::<Option<Vec<_>>>()?;
        self.translate(&delta)
    }

    /// If `other` selects the same pattern of elements up to a translation, return the translation from `self` to `other`.
    ///
    /// When the shapes are the same, the n-th element of `self` in row-major order corresponds to the n-th element of `other`.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> Option<Vec<i64>> {
        if self.rank() != other.rank() || self.is_empty() || other.is_empty() {
            return None;
        }
        std::iter::zip(&self.intervals, &other.intervals)
            .map(|(a, b)| {
                if a.len() != b.len() {
                    return None;
                }
                let delta = i64::try_from(b[0].start).ok()? - i64::try_from(a[0].start).ok()?;
                std::iter::zip(a, b)
                    .all(|(ra, rb)| {
                        rb.start.checked_add_signed(-delta) == Some(ra.start)
                            && rb.end - rb.start == ra.end - ra.start
                    })
                    .then_some(delta)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperslab_regular() {
        let slab = Hyperslab::new_regular(&[1, 0], &[4, 1], &[3, 5], &[2, 1]).unwrap();
        assert_eq!(slab.intervals()[0], vec![1..3, 5..7, 9..11]);
        // stride == block merges into one interval
        assert_eq!(slab.intervals()[1], vec![0..5]);
        assert_eq!(slab.num_elements(), 30);
        assert!(!slab.is_single_block());
        assert!(slab.contains(&[6, 4]));
        assert!(!slab.contains(&[7, 4]));
        assert_eq!(
            slab.bounding_box(),
            Some(ArraySubset::new_with_ranges(&[1..11, 0..5]))
        );

        assert!(matches!(
            Hyperslab::new_regular(&[0], &[1], &[2], &[2]),
            Err(SelectionError::OverlappingBlocks { dim: 0, .. })
        ));
        assert!(Hyperslab::new_regular(&[0], &[1], &[2], &[1, 1]).is_err());
        let empty = Hyperslab::new_regular(&[0, 0], &[1, 1], &[0, 4], &[1, 1]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.num_elements(), 0);
        assert_eq!(empty.bounding_box(), None);
    }

    #[test]
    fn hyperslab_intersect_translate() {
        let slab = Hyperslab::from_subset(&ArraySubset::new_with_ranges(&[5..15, 5..15]));
        let chunk = ArraySubset::new_with_ranges(&[10..20, 0..10]);
        let part = slab.intersect_subset(&chunk).unwrap();
        assert_eq!(part.num_elements(), 25);
        let local = part.relative_to(chunk.start()).unwrap();
        assert_eq!(
            local.bounding_box(),
            Some(ArraySubset::new_with_ranges(&[0..5, 5..10]))
        );
        assert!(part.relative_to(&[11, 0]).is_none());
        assert!(slab.intersect_subset(&ArraySubset::new_empty(1)).is_err());
    }

    #[test]
    fn hyperslab_same_shape() {
        let a = Hyperslab::new_regular(&[0, 0], &[3, 1], &[2, 1], &[1, 4]).unwrap();
        let b = Hyperslab::new_regular(&[10, 2], &[3, 1], &[2, 1], &[1, 4]).unwrap();
        assert_eq!(a.same_shape(&b), Some(vec![10, 2]));
        assert_eq!(b.same_shape(&a), Some(vec![-10, -2]));
        let c = Hyperslab::new_regular(&[10, 2], &[4, 1], &[2, 1], &[1, 4]).unwrap();
        assert_eq!(a.same_shape(&c), None);
        let d = Hyperslab::from_subset(&ArraySubset::new_with_ranges(&[0..8]));
        assert_eq!(a.same_shape(&d), None);
    }

    #[test]
    fn hyperslab_from_intervals_merges() {
        let slab = Hyperslab::from_intervals(vec![vec![4..6, 0..2, 1..3, 7..7, 6..8]]);
        assert_eq!(slab.intervals()[0], vec![0..3, 4..8]);
    }
}
