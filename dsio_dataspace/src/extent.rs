use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ArrayShape, IncompatibleDimensionalityError};

/// The class of an [`Extent`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtentClass {
    /// No extent has been set. A null extent has no elements and cannot take part in a transfer.
    Null,
    /// A scalar extent of exactly one element and rank zero.
    Scalar,
    /// A simple N-D extent.
    Simple,
}

/// The extent of a dataspace: a rank and a size per dimension, with optional maximum sizes.
///
/// A maximum size of [`None`] is unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    class: ExtentClass,
    dims: ArrayShape,
    max_dims: Vec<Option<u64>>,
}

/// An extent error.
#[derive(Clone, Debug, Error)]
pub enum ExtentError {
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// A dimension exceeds its maximum size.
    #[error("dimension {dim} of size {size} exceeds its maximum size {max}")]
    ExceedsMaximum {
        /// The dimension.
        dim: usize,
        /// The requested size.
        size: u64,
        /// The maximum size.
        max: u64,
    },
    /// The extent class does not support the operation.
    #[error("a {0:?} extent cannot be resized")]
    NotResizable(ExtentClass),
}

impl Extent {
    /// Create a null extent.
    #[must_use]
    pub fn null() -> Self {
        Self {
            class: ExtentClass::Null,
            dims: Vec::new(),
            max_dims: Vec::new(),
        }
    }

    /// Create a scalar extent.
    #[must_use]
    pub fn scalar() -> Self {
        Self {
            class: ExtentClass::Scalar,
            dims: Vec::new(),
            max_dims: Vec::new(),
        }
    }

    /// Create a simple extent with fixed dimensions.
    ///
    /// An empty `dims` creates a scalar extent.
    #[must_use]
    pub fn new_simple(dims: ArrayShape) -> Self {
        if dims.is_empty() {
            return Self::scalar();
        }
        let max_dims = dims.iter().copied().map(Some).collect();
        Self {
            class: ExtentClass::Simple,
            dims,
            max_dims,
        }
    }

    /// Create a simple extent with maximum dimensions.
    ///
    /// # Errors
    /// Returns an [`ExtentError`] if `max_dims` differs in length from `dims` or a dimension exceeds its maximum.
    pub fn new_with_max(dims: ArrayShape, max_dims: Vec<Option<u64>>) -> Result<Self, ExtentError> {
        if dims.len() != max_dims.len() {
            return Err(IncompatibleDimensionalityError::new(max_dims.len(), dims.len()).into());
        }
        Self::check_max(&dims, &max_dims)?;
        if dims.is_empty() {
            return Ok(Self::scalar());
        }
        Ok(Self {
            class: ExtentClass::Simple,
            dims,
            max_dims,
        })
    }

    fn check_max(dims: &[u64], max_dims: &[Option<u64>]) -> Result<(), ExtentError> {
        for (dim, (&size, max)) in std::iter::zip(dims, max_dims).enumerate() {
            if let Some(max) = *max {
                if size > max {
                    return Err(ExtentError::ExceedsMaximum { dim, size, max });
                }
            }
        }
        Ok(())
    }

    /// Return the extent class.
    #[must_use]
    pub const fn class(&self) -> ExtentClass {
        self.class
    }

    /// Returns true unless the extent is null.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.class != ExtentClass::Null
    }

    /// Returns true if the extent is scalar.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.class == ExtentClass::Scalar
    }

    /// Return the rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Return the size of each dimension.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Return the maximum size of each dimension.
    #[must_use]
    pub fn max_dims(&self) -> &[Option<u64>] {
        &self.max_dims
    }

    /// Return the number of elements in the extent.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        match self.class {
            ExtentClass::Null => 0,
            ExtentClass::Scalar => 1,
            ExtentClass::Simple => self.dims.iter().product(),
        }
    }

    /// Returns true if any dimension may grow beyond its current size.
    #[must_use]
    pub fn is_extendible(&self) -> bool {
        std::iter::zip(&self.dims, &self.max_dims)
            .any(|(&size, max)| max.is_none_or(|max| max > size))
    }

    /// Change the size of each dimension, within the maximum dimensions.
    ///
    /// # Errors
    /// Returns an [`ExtentError`] if the extent is not simple, the rank differs, or a dimension exceeds its maximum.
    pub fn set_dims(&mut self, dims: ArrayShape) -> Result<(), ExtentError> {
        if self.class != ExtentClass::Simple {
            return Err(ExtentError::NotResizable(self.class));
        }
        if dims.len() != self.rank() {
            return Err(IncompatibleDimensionalityError::new(dims.len(), self.rank()).into());
        }
        Self::check_max(&dims, &self.max_dims)?;
        self.dims = dims;
        Ok(())
    }
}
