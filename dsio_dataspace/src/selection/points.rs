use itertools::Itertools;

use crate::{ArrayIndices, ArraySubset, IncompatibleDimensionalityError};

/// An ordered list of N-D points.
///
/// Points are stored flattened, `rank` coordinates per point.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PointList {
    rank: usize,
    len: usize,
    coords: Vec<u64>,
}

impl PointList {
    /// Create an empty point list of dimensionality `rank`.
    #[must_use]
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            len: 0,
            coords: Vec::new(),
        }
    }

    /// Create a point list from an iterator of points.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if a point does not have `rank` coordinates.
    pub fn from_points<P: AsRef<[u64]>>(
        rank: usize,
        points: impl IntoIterator<Item = P>,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        let mut list = Self::new(rank);
        for point in points {
            list.push(point.as_ref())?;
        }
        Ok(list)
    }

    /// Append a point.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `point` does not have `rank` coordinates.
    pub fn push(&mut self, point: &[u64]) -> Result<(), IncompatibleDimensionalityError> {
        if point.len() != self.rank {
            return Err(IncompatibleDimensionalityError::new(point.len(), self.rank));
        }
        self.coords.extend_from_slice(point);
        self.len += 1;
        Ok(())
    }

    /// Return the dimensionality of the points.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    /// Return the number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the point at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> &[u64] {
        assert!(index < self.len);
        &self.coords[index * self.rank..(index + 1) * self.rank]
    }

    /// Iterate over the points in list order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u64]> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    /// Return the bounding box of the points, or [`None`] if there are none.
    #[must_use]
    pub fn bounding_box(&self) -> Option<ArraySubset> {
        if self.is_empty() {
            return None;
        }
        let ranges = (0..self.rank).map(|dim| {
            let (min, max) = self
                .iter()
                .map(|point| point[dim])
                .minmax()
                .into_option()
                .unwrap_or_default();
            min..max + 1
        });
        Some(ArraySubset::from(ranges))
    }

    /// Return the points translated by `delta`, or [`None`] if a coordinate would become negative or overflow.
    #[must_use]
    pub fn translate(&self, delta: &[i64]) -> Option<Self> {
        if delta.len() != self.rank {
            return None;
        }
        let coords = self
            .coords
            .iter()
            .zip(delta.iter().cycle())
            .map(|(&c, &d)| c.checked_add_signed(d))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            rank: self.rank,
            len: self.len,
            coords,
        })
    }

    /// Collect the points into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ArrayIndices> {
        self.iter().map(<[u64]>::to_vec).collect()
    }
}
