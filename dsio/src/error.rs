use dsio_dataspace::{ExtentError, IncompatibleDimensionalityError, SelectionError};
use dsio_storage::StorageError;
use thiserror::Error;

use crate::{
    datatype::{ConversionError, InvalidDataTypeError},
    parallel::CommunicatorError,
};

/// A dataset creation error.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DatasetCreateError {
    /// A dataset with the same name already exists.
    #[error("a dataset named `{0}` already exists")]
    Exists(String),
    /// Invalid data type.
    #[error(transparent)]
    InvalidDataType(#[from] InvalidDataTypeError),
    /// Invalid extent.
    #[error(transparent)]
    InvalidExtent(#[from] ExtentError),
    /// Invalid chunk shape.
    #[error("invalid chunk shape {0:?}")]
    InvalidChunkShape(Vec<u64>),
    /// Invalid fill value.
    #[error("fill value of {got} bytes does not match the element size {expected}")]
    InvalidFillValue {
        /// The element size.
        expected: usize,
        /// The fill value size.
        got: usize,
    },
    /// The layout cannot store the dataset.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    /// An underlying dataset error.
    #[error(transparent)]
    DatasetError(#[from] DatasetError),
}

impl From<StorageError> for DatasetCreateError {
    fn from(err: StorageError) -> Self {
        Self::DatasetError(err.into())
    }
}

/// A dataset I/O error.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    /// An invalid argument: mismatched element counts, an unset extent, a missing buffer, or an unknown dataset.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// A selection error, such as a selection outside the extent.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// An allocation failure for scratch buffers or file space.
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// A gather, scatter, or vector copy moved fewer elements or bytes than requested.
    #[error("short transfer: expected {expected}, transferred {actual}")]
    ShortTransfer {
        /// The requested count.
        expected: u64,
        /// The transferred count.
        actual: u64,
    },
    /// A type conversion error.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// The collective consensus vote failed.
    #[error("parallel consensus failed: {0}")]
    ParallelConsensus(#[from] CommunicatorError),
    /// The chunk map could not be built.
    #[error("cannot initialize chunk map: {0}")]
    CantInitialize(String),
    /// An extent error.
    #[error(transparent)]
    Extent(#[from] ExtentError),
    /// Dataset metadata could not be encoded or decoded.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Unsupported operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl From<IncompatibleDimensionalityError> for DatasetError {
    fn from(err: IncompatibleDimensionalityError) -> Self {
        Self::Argument(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for DatasetError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::Allocation(err.to_string())
    }
}
