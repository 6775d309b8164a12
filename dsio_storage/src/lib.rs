//! The storage API for the [`dsio`](https://docs.rs/dsio/latest/dsio/index.html) crate.
//!
//! A dataset file is a single flat byte address space.
//! Raw data of contiguous datasets, chunks of chunked datasets, and external raw files are all addressed by byte offsets within such a space.
//! The storage traits in this crate read and write byte ranges of that space, and the [`SpaceAllocatorTraits`] hand out fresh regions of it.
//!
//! This crate includes an in-memory store implementation and a [`PerformanceMetricsStorageAdapter`](storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter) for testing.
//! See [`dsio_filesystem`](https://docs.rs/dsio_filesystem) for a local file store.
//!
//! ## Licence
//! `dsio_storage` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod byte_range;
mod space_allocator;
pub mod storage_adapter;
mod storage_sync;
pub mod store;


use std::sync::Arc;

use thiserror::Error;

use byte_range::{ByteOffset, InvalidByteRangeError};

pub use self::space_allocator::{EndOfFileAllocator, SpaceAllocatorTraits};
pub use self::storage_sync::{
    store_read_many_into, ReadableStorageTraits, ReadableWritableStorageTraits,
    WritableStorageTraits,
};

/// [`Arc`] wrapped readable and writable storage.
pub type ReadableWritableStorage = Arc<dyn ReadableWritableStorageTraits>;

/// Bytes returned by storage get methods.
pub type Bytes = bytes::Bytes;

/// An iterator of [`Bytes`].
pub type BytesIterator<'a> = Box<dyn Iterator<Item = Result<Bytes, StorageError>> + 'a>;

/// An iterator of byte slices to write at byte offsets.
pub type OffsetBytesIterator<'a> = Box<dyn Iterator<Item = (ByteOffset, &'a [u8])> + Send + 'a>;

/// A storage error.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A write was attempted on a read only store.
    #[error("a write was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// A byte range that cannot be resolved.
    #[error(transparent)]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// The address space cannot hold a new region.
    #[error("cannot allocate {0} bytes at end of allocation {1}")]
    AddressSpaceExhausted(u64, u64),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}
