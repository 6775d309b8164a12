use std::{
    borrow::Cow,
    ops::{Deref, DerefMut},
};

use crate::{
    selection::{Hyperslab, PointList, Selection, SelectionError},
    ArrayIndices, ArrayShape, ArraySubset, Extent, IncompatibleDimensionalityError,
    SelectionIter,
};

/// A dataspace: an [`Extent`], a [`Selection`] of its elements, and a signed selection offset.
///
/// The offset shifts every selected coordinate when the selection is iterated, so one selection can be reused at different positions.
/// An [`Selection::All`] selection ignores the offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataspace {
    extent: Extent,
    selection: Selection,
    offset: Vec<i64>,
}

impl Dataspace {
    /// Create a dataspace selecting all of `extent`.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        let offset = vec![0; extent.rank()];
        Self {
            extent,
            selection: Selection::All,
            offset,
        }
    }

    /// Create a simple dataspace with fixed dimensions `dims`, selecting all elements.
    #[must_use]
    pub fn new_simple(dims: ArrayShape) -> Self {
        Self::new(Extent::new_simple(dims))
    }

    /// Create a scalar dataspace.
    #[must_use]
    pub fn new_scalar() -> Self {
        Self::new(Extent::scalar())
    }

    /// Create a dataspace without an extent.
    #[must_use]
    pub fn new_null() -> Self {
        Self {
            extent: Extent::null(),
            selection: Selection::None,
            offset: Vec::new(),
        }
    }

    /// Return the extent.
    #[must_use]
    pub const fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Return the rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.extent.rank()
    }

    /// Return the size of each dimension.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        self.extent.dims()
    }

    /// Return the selection.
    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Return the selection offset.
    #[must_use]
    pub fn offset(&self) -> &[i64] {
        &self.offset
    }

    /// Returns true if the selection offset is non-zero.
    #[must_use]
    pub fn has_offset(&self) -> bool {
        self.offset.iter().any(|&o| o != 0)
    }

    /// Replace the extent, resetting the selection to all elements and clearing the offset.
    pub fn set_extent(&mut self, extent: Extent) {
        *self = Self::new(extent);
    }

    /// Select every element.
    pub fn select_all(&mut self) {
        self.selection = Selection::All;
    }

    /// Select no elements.
    pub fn select_none(&mut self) {
        self.selection = Selection::None;
    }

    /// Select an ordered list of points.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if a point does not match the dataspace rank.
    pub fn select_points<P: AsRef<[u64]>>(
        &mut self,
        points: impl IntoIterator<Item = P>,
    ) -> Result<(), SelectionError> {
        self.selection = Selection::Points(PointList::from_points(self.rank(), points)?);
        Ok(())
    }

    /// Select a regular hyperslab.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the arguments do not match the dataspace rank or blocks overlap.
    pub fn select_hyperslab(
        &mut self,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
        block: &[u64],
    ) -> Result<(), SelectionError> {
        let hyperslab = Hyperslab::new_regular(start, stride, count, block)?;
        self.set_selection(Selection::Hyperslab(hyperslab))
    }

    /// Select a single rectangular region.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if `subset` does not match the dataspace rank.
    pub fn select_subset(&mut self, subset: &ArraySubset) -> Result<(), SelectionError> {
        self.set_selection(Selection::Hyperslab(Hyperslab::from_subset(subset)))
    }

    /// Replace the selection.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the selection does not match the dataspace rank.
    pub fn set_selection(&mut self, selection: Selection) -> Result<(), SelectionError> {
        if let Some(rank) = selection.rank() {
            if rank != self.rank() {
                return Err(IncompatibleDimensionalityError::new(rank, self.rank()).into());
            }
        }
        self.selection = selection;
        Ok(())
    }

    /// Set the selection offset.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if `offset` does not match the dataspace rank.
    pub fn set_offset(&mut self, offset: Vec<i64>) -> Result<(), SelectionError> {
        if offset.len() != self.rank() {
            return Err(IncompatibleDimensionalityError::new(offset.len(), self.rank()).into());
        }
        self.offset = offset;
        Ok(())
    }

    /// Return the number of selected elements.
    #[must_use]
    pub fn num_selected(&self) -> u64 {
        match &self.selection {
            Selection::None => 0,
            Selection::All => self.extent.num_elements(),
            Selection::Points(points) => points.len() as u64,
            Selection::Hyperslab(hyperslab) => hyperslab.num_elements(),
        }
    }

    /// Returns true if every selected coordinate, after applying the selection offset, lies within the extent.
    ///
    /// This is not checked on every access: read and write entry points call it explicitly.
    #[must_use]
    pub fn selection_valid(&self) -> bool {
        if !self.extent.is_set() {
            return false;
        }
        let in_extent = |point: &[u64]| {
            point.len() == self.rank()
                && std::iter::zip(point, std::iter::zip(&self.offset, self.dims())).all(
                    |(&coord, (&offset, &dim))| {
                        coord.checked_add_signed(offset).is_some_and(|c| c < dim)
                    },
                )
        };
        match &self.selection {
            Selection::None | Selection::All => true,
            Selection::Points(points) => points.iter().all(in_extent),
            Selection::Hyperslab(hyperslab) => {
                hyperslab.rank() == self.rank()
                    && hyperslab.bounding_box().is_none_or(|bbox| {
                        bbox.end_inc()
                            .is_none_or(|end| in_extent(bbox.start()) && in_extent(&end))
                    })
            }
        }
    }

    /// Return the bounding box of the selection with the offset applied.
    ///
    /// Returns [`None`] if nothing is selected or the offset moves the selection to negative coordinates.
    #[must_use]
    pub fn selection_bounds(&self) -> Option<ArraySubset> {
        let bbox = self.selection.bounding_box(self.dims())?;
        if matches!(self.selection, Selection::All) || !self.has_offset() {
            return Some(bbox);
        }
        let start = std::iter::zip(bbox.start(), &self.offset)
            .map(|(&s, &o)| s.checked_add_signed(o))
            .collect::<Option<ArrayIndices>>()?;
        ArraySubset::new_with_start_shape(start, bbox.shape().to_vec()).ok()
    }

    /// Return the selection as a hyperslab, converting [`Selection::All`] to a block covering the extent.
    ///
    /// Returns [`None`] for point selections and [`Selection::None`].
    #[must_use]
    pub fn as_hyperslab(&self) -> Option<Cow<'_, Hyperslab>> {
        match &self.selection {
            Selection::All => Some(Cow::Owned(Hyperslab::from_subset(
                &ArraySubset::new_with_shape(self.dims().to_vec()),
            ))),
            Selection::Hyperslab(hyperslab) => Some(Cow::Borrowed(hyperslab)),
            Selection::None | Selection::Points(_) => None,
        }
    }

    /// If the selections of `self` and `other` correspond element-by-element through a translation, return the translation.
    ///
    /// The translation maps selection coordinates of `self` to selection coordinates of `other`, ignoring both offsets.
    /// Point selections never have the same shape.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> Option<Vec<i64>> {
        let a = self.as_hyperslab()?;
        let b = other.as_hyperslab()?;
        a.same_shape(&b)
    }

    /// Return an iterator over the selection for elements of `element_size` bytes.
    #[must_use]
    pub fn iter(&self, element_size: usize) -> SelectionIter<'_> {
        SelectionIter::new(self, element_size)
    }

    /// Fold the selection offset into the selection coordinates.
    ///
    /// The returned guard dereferences to the normalised dataspace, whose offset is zero.
    /// When the guard is dropped the original selection and offset are restored, on every exit path.
    ///
    /// # Errors
    /// Returns [`SelectionError::InvalidOffset`] if the offset moves a coordinate below zero.
    pub fn normalize_offset(&mut self) -> Result<OffsetGuard<'_>, SelectionError> {
        if !self.has_offset() {
            return Ok(OffsetGuard {
                space: self,
                original: None,
            });
        }
        let normalized = self
            .selection
            .translate(&self.offset)
            .ok_or_else(|| SelectionError::InvalidOffset(self.offset.clone()))?;
        let selection = std::mem::replace(&mut self.selection, normalized);
        let offset = std::mem::replace(&mut self.offset, vec![0; self.extent.rank()]);
        Ok(OffsetGuard {
            space: self,
            original: Some((selection, offset)),
        })
    }
}

/// A scoped guard over a dataspace whose selection offset has been normalised.
///
/// See [`Dataspace::normalize_offset`].
#[derive(Debug)]
pub struct OffsetGuard<'a> {
    space: &'a mut Dataspace,
    original: Option<(Selection, Vec<i64>)>,
}

impl OffsetGuard<'_> {
    /// Return the offset that was folded into the selection.
    #[must_use]
    pub fn original_offset(&self) -> Option<&[i64]> {
        self.original.as_ref().map(|(_, offset)| offset.as_slice())
    }
}

impl Deref for OffsetGuard<'_> {
    type Target = Dataspace;

    fn deref(&self) -> &Self::Target {
        self.space
    }
}

impl DerefMut for OffsetGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.space
    }
}

impl Drop for OffsetGuard<'_> {
    fn drop(&mut self) {
        if let Some((selection, offset)) = self.original.take() {
            self.space.selection = selection;
            self.space.offset = offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataspace_selection_counts() {
        let mut space = Dataspace::new_simple(vec![100, 100]);
        assert_eq!(space.num_selected(), 10_000);
        space
            .select_hyperslab(&[5, 5], &[1, 1], &[1, 1], &[10, 10])
            .unwrap();
        assert_eq!(space.num_selected(), 100);
        space.select_points([[0, 0], [99, 99]]).unwrap();
        assert_eq!(space.num_selected(), 2);
        assert!(space.select_points([[0u64, 0, 0]]).is_err());
        space.select_none();
        assert_eq!(space.num_selected(), 0);
        assert_eq!(Dataspace::new_scalar().num_selected(), 1);
        assert_eq!(Dataspace::new_null().num_selected(), 0);
    }

    #[test]
    fn dataspace_selection_valid() {
        let mut space = Dataspace::new_simple(vec![10, 10]);
        space.select_subset(&ArraySubset::new_with_ranges(&[5..10, 0..3])).unwrap();
        assert!(space.selection_valid());
        space.set_offset(vec![1, 0]).unwrap();
        assert!(!space.selection_valid());
        space.set_offset(vec![-5, 7]).unwrap();
        assert!(space.selection_valid());
        assert_eq!(
            space.selection_bounds(),
            Some(ArraySubset::new_with_ranges(&[0..5, 7..10]))
        );
        space.set_offset(vec![-6, 0]).unwrap();
        assert!(!space.selection_valid());
        assert!(space.set_offset(vec![0]).is_err());

        space.set_offset(vec![0, 0]).unwrap();
        space.select_points([[9, 9], [10, 0]]).unwrap();
        assert!(!space.selection_valid());
        assert!(!Dataspace::new_null().selection_valid());
    }

    #[test]
    fn dataspace_offset_guard() {
        let mut space = Dataspace::new_simple(vec![10, 10]);
        space.select_subset(&ArraySubset::new_with_ranges(&[2..4, 2..4])).unwrap();
        space.set_offset(vec![3, -2]).unwrap();
        let original = space.clone();
        {
            let guard = space.normalize_offset().unwrap();
            assert_eq!(guard.original_offset(), Some([3i64, -2].as_slice()));
            assert!(!guard.has_offset());
            assert_eq!(
                guard.selection_bounds(),
                Some(ArraySubset::new_with_ranges(&[5..7, 0..2]))
            );
        }
        assert_eq!(space, original);

        space.set_offset(vec![-3, 0]).unwrap();
        assert!(matches!(
            space.normalize_offset(),
            Err(SelectionError::InvalidOffset(_))
        ));
        assert_eq!(space.offset(), &[-3, 0]);
    }

    #[test]
    fn dataspace_same_shape() {
        let mut a = Dataspace::new_simple(vec![100, 100]);
        a.select_subset(&ArraySubset::new_with_ranges(&[5..15, 5..15])).unwrap();
        let mut b = Dataspace::new_simple(vec![10, 10]);
        assert_eq!(a.same_shape(&b), Some(vec![-5, -5]));
        b.select_points([[0, 0]]).unwrap();
        assert_eq!(a.same_shape(&b), None);
        let c = Dataspace::new_simple(vec![100]);
        assert_eq!(a.same_shape(&c), None);
    }
}
