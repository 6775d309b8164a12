//! Selections.
//!
//! A [`Selection`] picks the elements of a dataspace that take part in a transfer:
//!  - [`Selection::None`]: no elements,
//!  - [`Selection::All`]: every element of the extent,
//!  - [`Selection::Points`]: an ordered [`PointList`] of coordinates, and
//!  - [`Selection::Hyperslab`]: a [`Hyperslab`], a union of rectangular blocks that is the Cartesian product of per-dimension interval lists.
//!
//! Points are transferred in list order. Every other selection is transferred in row-major order.

mod hyperslab;
mod points;

pub use hyperslab::Hyperslab;
pub use points::PointList;

use thiserror::Error;

use crate::{ArraySubset, IncompatibleDimensionalityError};

/// A dataspace selection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Selection {
    /// No elements.
    None,
    /// Every element of the extent.
    #[default]
    All,
    /// An ordered list of points.
    Points(PointList),
    /// A hyperslab.
    Hyperslab(Hyperslab),
}

impl Selection {
    /// Return the selection dimensionality, if it is fixed by the selection itself.
    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        match self {
            Self::None | Self::All => None,
            Self::Points(points) => Some(points.rank()),
            Self::Hyperslab(hyperslab) => Some(hyperslab.rank()),
        }
    }

    /// Return the selection translated by `delta`, or [`None`] if a coordinate would become negative or overflow.
    #[must_use]
    pub fn translate(&self, delta: &[i64]) -> Option<Self> {
        match self {
            Self::None | Self::All => Some(self.clone()),
            Self::Points(points) => points.translate(delta).map(Self::Points),
            Self::Hyperslab(hyperslab) => hyperslab.translate(delta).map(Self::Hyperslab),
        }
    }

    /// Return the bounding box of the selected coordinates within an extent of shape `dims`.
    ///
    /// Returns [`None`] if nothing is selected.
    #[must_use]
    pub fn bounding_box(&self, dims: &[u64]) -> Option<ArraySubset> {
        match self {
            Self::None => None,
            Self::All => {
                let subset = ArraySubset::new_with_shape(dims.to_vec());
                (!subset.is_empty()).then_some(subset)
            }
            Self::Points(points) => points.bounding_box(),
            Self::Hyperslab(hyperslab) => hyperslab.bounding_box(),
        }
    }
}

/// A selection error.
#[derive(Clone, Debug, Error)]
pub enum SelectionError {
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// Regular hyperslab blocks overlap.
    #[error("hyperslab blocks of size {block} overlap with stride {stride} in dimension {dim}")]
    OverlappingBlocks {
        /// The dimension.
        dim: usize,
        /// The stride.
        stride: u64,
        /// The block size.
        block: u64,
    },
    /// A selection offset moves a coordinate outside the representable range.
    #[error("selection offset {0:?} moves the selection outside the extent")]
    InvalidOffset(Vec<i64>),
    /// The selection lies outside the extent.
    #[error("selection lies outside the extent {0:?}")]
    OutOfBounds(Vec<u64>),
    /// The dataspace extent is not set.
    #[error("the dataspace extent is not set")]
    ExtentNotSet,
    /// The operation does not support this selection.
    #[error("unsupported selection: {0}")]
    Unsupported(String),
}
