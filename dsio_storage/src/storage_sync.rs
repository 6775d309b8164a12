use std::sync::Arc;

use auto_impl::auto_impl;

use super::{
    byte_range::{ByteOffset, ByteRange, ByteRangeIterator},
    Bytes, BytesIterator, OffsetBytesIterator, StorageError,
};

/// Readable storage traits.
#[auto_impl(Arc)]
pub trait ReadableStorageTraits: Send + Sync {
    /// Read `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Bytes beyond the end of the address space read as zero, matching the behaviour of a sparse file.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn read_into(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Retrieve partial bytes from a list of byte ranges.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    /// The iterator items are a [`StorageError::InvalidByteRangeError`] for ranges that cannot be resolved against the current size.
    ///
    /// # Panics
    /// Panics if a byte range length exceeds [`usize::MAX`].
    fn get_partial_many<'a>(
        &'a self,
        byte_ranges: ByteRangeIterator<'a>,
    ) -> Result<BytesIterator<'a>, StorageError> {
        let size = self.size()?;
        Ok(Box::new(byte_ranges.map(move |byte_range| {
            let range = byte_range.resolve(size)?;
            let mut bytes = vec![0; usize::try_from(range.end - range.start).unwrap()];
            self.read_into(range.start, &mut bytes)?;
            Ok(Bytes::from(bytes))
        })))
    }

    /// Retrieve partial bytes from a single byte range.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn get_partial(&self, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        let mut bytes = self.get_partial_many(Box::new([byte_range].into_iter()))?;
        bytes
            .next()
            .unwrap_or_else(|| Err(StorageError::Other("missing byte range".to_string())))
    }

    /// Return the size in bytes of the written portion of the address space.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn size(&self) -> Result<u64, StorageError>;
}

/// Writable storage traits.
#[auto_impl(Arc)]
pub trait WritableStorageTraits: Send + Sync {
    /// Write each value at its byte offset, growing the address space as required.
    ///
    /// # Errors
    /// Returns a [`StorageError`] on failure to store.
    fn set_partial_many(&self, offset_values: OffsetBytesIterator) -> Result<(), StorageError>;

    /// Write `value` at `offset`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] on failure to store.
    fn set_partial(&self, offset: ByteOffset, value: &[u8]) -> Result<(), StorageError> {
        self.set_partial_many(Box::new(std::iter::once((offset, value))))
    }

    /// Truncate or extend (with zeros) the address space to `size` bytes.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn truncate(&self, size: u64) -> Result<(), StorageError>;

    /// Flush any buffered writes to the underlying medium.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A supertrait of [`ReadableStorageTraits`] and [`WritableStorageTraits`].
pub trait ReadableWritableStorageTraits: ReadableStorageTraits + WritableStorageTraits {
    /// Return a readable version of the store.
    fn readable(self: Arc<Self>) -> Arc<dyn ReadableStorageTraits>;

    /// Return a writable version of the store.
    fn writable(self: Arc<Self>) -> Arc<dyn WritableStorageTraits>;
}

impl<T> ReadableWritableStorageTraits for T
where
    T: ReadableStorageTraits + WritableStorageTraits + 'static,
{
    fn readable(self: Arc<Self>) -> Arc<dyn ReadableStorageTraits> {
        self.clone()
    }

    fn writable(self: Arc<Self>) -> Arc<dyn WritableStorageTraits> {
        self.clone()
    }
}

/// Read many `(offset, buffer)` requests from a store, in order.
///
/// Each request is served by [`ReadableStorageTraits::read_into`].
/// Requests that abut in both the address space and the output are not merged; stores that benefit from coalescing should do so internally.
///
/// # Errors
/// Returns a [`StorageError`] if any read fails; earlier buffers may already be populated.
pub fn store_read_many_into<'a, TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    requests: impl IntoIterator<Item = (ByteOffset, &'a mut [u8])>,
) -> Result<(), StorageError> {
    requests
        .into_iter()
        .try_for_each(|(offset, buf)| storage.read_into(offset, buf))
}
