//! File space allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use auto_impl::auto_impl;

use crate::{byte_range::ByteOffset, StorageError};

/// Traits for allocating fresh regions of a file address space.
#[auto_impl(Arc, &)]
pub trait SpaceAllocatorTraits: Send + Sync {
    /// Allocate `size` bytes and return the offset of the new region.
    ///
    /// # Errors
    /// Returns [`StorageError::AddressSpaceExhausted`] if the address space cannot hold the region.
    fn allocate(&self, size: u64) -> Result<ByteOffset, StorageError>;

    /// Return the offset one past the last allocated byte.
    fn end_of_allocation(&self) -> ByteOffset;
}

/// A bump allocator that appends every region at the end of the address space.
///
/// Freed space is never reclaimed.
#[derive(Debug, Default)]
pub struct EndOfFileAllocator {
    end: AtomicU64,
}

impl EndOfFileAllocator {
    /// Create a new allocator whose first region starts at `start`.
    #[must_use]
    pub fn new(start: ByteOffset) -> Self {
        Self {
            end: AtomicU64::new(start),
        }
    }
}

impl SpaceAllocatorTraits for EndOfFileAllocator {
    fn allocate(&self, size: u64) -> Result<ByteOffset, StorageError> {
        self.end
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |end| {
                end.checked_add(size)
            })
            .map_err(|end| StorageError::AddressSpaceExhausted(size, end))
    }

    fn end_of_allocation(&self) -> ByteOffset {
        self.end.load(Ordering::Acquire)
    }
}
