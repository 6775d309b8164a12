//! Dataspaces, selections and selection iterators for the [`dsio`](https://docs.rs/dsio/latest/dsio/index.html) crate.
//!
//! A [`Dataspace`] pairs an [`Extent`] (the rank and size of a logical N-D array) with a [`Selection`] of its elements and a signed selection offset.
//! A [`SelectionIter`] walks a selection and produces ordered byte [`Sequence`]s against a row-major layout of the extent.
//!
//! The crate also includes the geometric utilities used when a selection is intersected with a regular chunk grid:
//!  - [`ArraySubset`]: a rectangular region (start and shape),
//!  - [`Chunks`](array_subset::iterators::Chunks): the chunks of a regular grid overlapping a region, and
//!  - the row-major stride and vector copy helpers in [`sequence`].
//!
//! ## Licence
//! `dsio_dataspace` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

pub mod array_subset;
mod dataspace;
mod extent;
pub mod selection;
mod selection_iter;
pub mod sequence;

pub use array_subset::ArraySubset;
pub use dataspace::{Dataspace, OffsetGuard};
pub use extent::{Extent, ExtentClass, ExtentError};
pub use selection::{Hyperslab, PointList, Selection, SelectionError};
pub use selection_iter::{SelectionIter, SeqListFlags};
pub use sequence::{Sequence, SequenceCursor};

use thiserror::Error;

/// The indices of an element in an N-D array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an N-D array.
pub type ArrayShape = Vec<u64>;

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}
