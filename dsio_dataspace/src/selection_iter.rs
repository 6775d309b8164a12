use std::borrow::Cow;

use crate::{
    selection::{Hyperslab, PointList, Selection},
    sequence::row_major_strides,
    ArrayIndices, ArraySubset, Dataspace, Sequence,
};

/// Flags for [`SelectionIter::get_seq_list`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeqListFlags(u8);

impl SeqListFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Sequences must be produced in increasing offset order.
    ///
    /// A point selection stops early (rather than reordering) before a point whose offset is below the previous sequence.
    pub const SORTED: Self = Self(1);

    /// Returns true if all of the flags in `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SeqListFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug)]
enum IterState<'a> {
    Done,
    Points {
        points: &'a PointList,
        next: usize,
    },
    Hyperslab {
        hyperslab: Cow<'a, Hyperslab>,
        coords: ArrayIndices,
        intervals: Vec<usize>,
    },
}

/// A resumable iterator over the selected elements of a [`Dataspace`].
///
/// Byte offsets are row-major over the dataspace extent, with the selection offset applied, multiplied by the element size.
/// The iterator can be consumed as byte [`Sequence`]s with [`get_seq_list`](SelectionIter::get_seq_list) or element-by-element as coordinates with [`Iterator::next`].
#[derive(Debug)]
pub struct SelectionIter<'a> {
    element_size: u64,
    strides: Vec<u64>,
    offset: Vec<i64>,
    state: IterState<'a>,
    elements_left: u64,
}

impl<'a> SelectionIter<'a> {
    /// Create a new selection iterator for elements of `element_size` bytes.
    #[must_use]
    pub fn new(space: &'a Dataspace, element_size: usize) -> Self {
        let element_size = element_size as u64;
        let elements_left = space.num_selected();
        if space.rank() == 0 {
            // a scalar is a single element at offset zero
            let hyperslab = Hyperslab::from_subset(&ArraySubset::new_with_shape(vec![1]));
            let state = if elements_left > 0 {
                Self::hyperslab_state(Cow::Owned(hyperslab))
            } else {
                IterState::Done
            };
            return Self {
                element_size,
                strides: vec![1],
                offset: vec![0],
                state,
                elements_left,
            };
        }

        let strides = row_major_strides(space.dims());
        let offset = if matches!(space.selection(), Selection::All) {
            vec![0; space.rank()]
        } else {
            space.offset().to_vec()
        };
        let state = match space.selection() {
            _ if elements_left == 0 => IterState::Done,
            Selection::None => IterState::Done,
            Selection::Points(points) => IterState::Points { points, next: 0 },
            Selection::All | Selection::Hyperslab(_) => space
                .as_hyperslab()
                .map_or(IterState::Done, Self::hyperslab_state),
        };
        Self {
            element_size,
            strides,
            offset,
            state,
            elements_left,
        }
    }

    fn hyperslab_state(hyperslab: Cow<'a, Hyperslab>) -> IterState<'a> {
        if hyperslab.is_empty() {
            return IterState::Done;
        }
        let coords = hyperslab
            .intervals()
            .iter()
            .map(|dim| dim[0].start)
            .collect();
        let intervals = vec![0; hyperslab.rank()];
        IterState::Hyperslab {
            hyperslab,
            coords,
            intervals,
        }
    }

    /// Return the element size in bytes.
    #[must_use]
    pub const fn element_size(&self) -> u64 {
        self.element_size
    }

    /// Return the number of elements not yet consumed.
    #[must_use]
    pub const fn elements_left(&self) -> u64 {
        self.elements_left
    }

    fn effective_coords(&self, coords: &[u64]) -> ArrayIndices {
        std::iter::zip(coords, &self.offset)
            .map(|(&c, &o)| c.wrapping_add_signed(o))
            .collect()
    }

    fn byte_offset(strides: &[u64], offset: &[i64], element_size: u64, coords: &[u64]) -> u64 {
        let linear: u64 = std::iter::zip(coords, std::iter::zip(offset, strides))
            .map(|(&c, (&o, &s))| c.wrapping_add_signed(o) * s)
            .sum();
        linear * element_size
    }

    /// Append a run to `seqs`, coalescing with the previous sequence when it abuts.
    ///
    /// Returns false if the run cannot be added without exceeding `max_sequences` or breaking the sorted order.
    fn push_run(
        seqs: &mut Vec<Sequence>,
        offset: u64,
        len: u64,
        max_sequences: usize,
        sorted: bool,
    ) -> bool {
        if let Some(last) = seqs.last_mut() {
            if last.end() == offset {
                last.len += len;
                return true;
            }
            if sorted && offset < last.offset {
                return false;
            }
        }
        if seqs.len() >= max_sequences {
            return false;
        }
        seqs.push(Sequence::new(offset, len));
        true
    }

    /// Advance a hyperslab position by `n` elements along the last dimension.
    ///
    /// `n` never crosses the end of the current last-dimension interval.
    /// Returns false when the hyperslab is exhausted.
    fn advance_hyperslab(
        hyperslab: &Hyperslab,
        coords: &mut [u64],
        intervals: &mut [usize],
        n: u64,
    ) -> bool {
        let mut dim = coords.len() - 1;
        coords[dim] += n;
        loop {
            let dim_intervals = &hyperslab.intervals()[dim];
            if coords[dim] < dim_intervals[intervals[dim]].end {
                return true;
            }
            intervals[dim] += 1;
            if intervals[dim] < dim_intervals.len() {
                coords[dim] = dim_intervals[intervals[dim]].start;
                return true;
            }
            intervals[dim] = 0;
            coords[dim] = dim_intervals[0].start;
            if dim == 0 {
                return false;
            }
            dim -= 1;
            coords[dim] += 1;
        }
    }

    /// Produce up to `max_sequences` byte sequences covering up to `max_elements` of the remaining elements.
    ///
    /// Abutting runs are coalesced into one sequence.
    /// The iterator advances by exactly the returned element count, so the next call resumes where this one stopped.
    /// With [`SeqListFlags::SORTED`], a point selection stops before any point whose offset is below the previous sequence.
    ///
    /// Calling this with no elements left is a logic error.
    pub fn get_seq_list(
        &mut self,
        flags: SeqListFlags,
        max_sequences: usize,
        max_elements: u64,
    ) -> (Vec<Sequence>, u64) {
        debug_assert!(self.elements_left > 0);
        let sorted = flags.contains(SeqListFlags::SORTED);
        let mut seqs = Vec::new();
        let mut consumed = 0;
        let Self {
            element_size,
            strides,
            offset,
            state,
            elements_left,
        } = self;
        let element_size = *element_size;

        while consumed < max_elements {
            match &mut *state {
                IterState::Done => break,
                IterState::Points { points, next } => {
                    let point = points.get(*next);
                    let byte_offset = Self::byte_offset(strides, offset, element_size, point);
                    let pushed = Self::push_run(
                        &mut seqs,
                        byte_offset,
                        element_size,
                        max_sequences,
                        sorted,
                    );
                    if !pushed {
                        break;
                    }
                    *next += 1;
                    consumed += 1;
                    if *next == points.len() {
                        *state = IterState::Done;
                    }
                }
                IterState::Hyperslab {
                    hyperslab,
                    coords,
                    intervals,
                } => {
                    let last = coords.len() - 1;
                    let end = hyperslab.intervals()[last][intervals[last]].end;
                    let run = std::cmp::min(end - coords[last], max_elements - consumed);
                    let byte_offset = Self::byte_offset(strides, offset, element_size, coords);
                    if !Self::push_run(
                        &mut seqs,
                        byte_offset,
                        run * element_size,
                        max_sequences,
                        sorted,
                    ) {
                        break;
                    }
                    consumed += run;
                    if !Self::advance_hyperslab(hyperslab, coords, intervals, run) {
                        *state = IterState::Done;
                    }
                }
            }
        }
        *elements_left -= consumed;
        (seqs, consumed)
    }
}

impl Iterator for SelectionIter<'_> {
    type Item = ArrayIndices;

    /// Return the coordinates (with the selection offset applied) of the next element.
    fn next(&mut self) -> Option<Self::Item> {
        let coords = match &mut self.state {
            IterState::Done => return None,
            IterState::Points { points, next } => {
                let coords = points.get(*next).to_vec();
                *next += 1;
                if *next == points.len() {
                    self.state = IterState::Done;
                }
                coords
            }
            IterState::Hyperslab {
                hyperslab,
                coords,
                intervals,
            } => {
                let current = coords.clone();
                if !Self::advance_hyperslab(hyperslab, coords, intervals, 1) {
                    self.state = IterState::Done;
                }
                current
            }
        };
        self.elements_left -= 1;
        Some(self.effective_coords(&coords))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.elements_left).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_iter_all() {
        let space = Dataspace::new_simple(vec![4, 4]);
        let mut iter = space.iter(1);
        assert_eq!(iter.elements_left(), 16);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 10, 5);
        assert_eq!((seqs, n), (vec![Sequence::new(0, 5)], 5));
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 10, 100);
        assert_eq!((seqs, n), (vec![Sequence::new(5, 11)], 11));
        assert_eq!(iter.elements_left(), 0);
    }

    #[test]
    fn selection_iter_hyperslab() {
        let mut space = Dataspace::new_simple(vec![4, 4]);
        space
            .select_subset(&ArraySubset::new_with_ranges(&[1..3, 1..3]))
            .unwrap();
        let mut iter = space.iter(2);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::SORTED, 1, 100);
        assert_eq!((seqs, n), (vec![Sequence::new(10, 4)], 2));
        let (seqs, n) = iter.get_seq_list(SeqListFlags::SORTED, 1, 100);
        assert_eq!((seqs, n), (vec![Sequence::new(18, 4)], 2));
        assert_eq!(iter.elements_left(), 0);

        // the element budget splits an interval
        let mut iter = space.iter(1);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 8, 3);
        assert_eq!((seqs, n), (vec![Sequence::new(5, 2), Sequence::new(9, 1)], 3));
        assert_eq!(iter.next(), Some(vec![2, 2]));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn selection_iter_hyperslab_strided_with_offset() {
        let mut space = Dataspace::new_simple(vec![6, 6]);
        space
            .select_hyperslab(&[0, 0], &[3, 2], &[2, 2], &[1, 1])
            .unwrap();
        space.set_offset(vec![1, 1]).unwrap();
        let coords: Vec<_> = space.iter(4).collect();
        assert_eq!(coords, vec![vec![1, 1], vec![1, 3], vec![4, 1], vec![4, 3]]);
        let mut iter = space.iter(4);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 16, 16);
        assert_eq!(n, 4);
        assert_eq!(
            seqs,
            vec![
                Sequence::new(28, 4),
                Sequence::new(36, 4),
                Sequence::new(100, 4),
                Sequence::new(108, 4)
            ]
        );
    }

    #[test]
    fn selection_iter_points_coalesce() {
        let mut space = Dataspace::new_simple(vec![4, 4]);
        space.select_points([[0, 1], [0, 2], [0, 0], [3, 3]]).unwrap();
        let mut iter = space.iter(1);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 8, 8);
        assert_eq!(n, 4);
        assert_eq!(
            seqs,
            vec![Sequence::new(1, 2), Sequence::new(0, 1), Sequence::new(15, 1)]
        );
    }

    #[test]
    fn selection_iter_points_sorted_stops_early() {
        let mut space = Dataspace::new_simple(vec![4, 4]);
        space.select_points([[0, 1], [0, 2], [0, 0], [3, 3]]).unwrap();
        let mut iter = space.iter(1);
        // boundary behaviour: no reordering, the walk stops before the decreasing offset
        let (seqs, n) = iter.get_seq_list(SeqListFlags::SORTED, 8, 8);
        assert_eq!((seqs, n), (vec![Sequence::new(1, 2)], 2));
        assert_eq!(iter.elements_left(), 2);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::SORTED, 8, 8);
        assert_eq!(
            (seqs, n),
            (vec![Sequence::new(0, 1), Sequence::new(15, 1)], 2)
        );
        assert_eq!(iter.elements_left(), 0);
    }

    #[test]
    fn selection_iter_points_max_sequences() {
        let mut space = Dataspace::new_simple(vec![10]);
        space.select_points([[9], [0], [5], [6], [2]]).unwrap();
        let mut iter = space.iter(8);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 2, 100);
        assert_eq!((seqs, n), (vec![Sequence::new(72, 8), Sequence::new(0, 8)], 2));
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 2, 100);
        assert_eq!((seqs, n), (vec![Sequence::new(40, 16), Sequence::new(16, 8)], 3));
    }

    #[test]
    fn selection_iter_scalar_and_empty() {
        let space = Dataspace::new_scalar();
        let mut iter = space.iter(8);
        assert_eq!(iter.elements_left(), 1);
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, 1, 1);
        assert_eq!((seqs, n), (vec![Sequence::new(0, 8)], 1));

        let mut space = Dataspace::new_simple(vec![4]);
        space.select_none();
        let mut iter = space.iter(1);
        assert_eq!(iter.elements_left(), 0);
        assert_eq!(iter.next(), None);
    }
}
