//! A storage adapter which counts requests and bytes.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    byte_range::ByteOffset, OffsetBytesIterator, ReadableStorageTraits, StorageError,
    WritableStorageTraits,
};

#[derive(Debug, Default)]
struct Counter {
    requests: AtomicUsize,
    bytes: AtomicUsize,
}

impl Counter {
    fn record(&self, requests: usize, bytes: usize) {
        self.requests.fetch_add(requests, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

/// Wraps a store and counts the read and write requests that reach it.
///
/// Tests use it to check how many physical accesses a dataset operation performs, e.g. that fill values are synthesised without reading storage.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use dsio_storage::store::MemoryStore;
/// # use dsio_storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;
/// # use dsio_storage::{ReadableStorageTraits, WritableStorageTraits};
/// let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
/// store.set_partial(0, &[1, 2, 3, 4])?;
/// let mut buf = [0u8; 2];
/// store.read_into(1, &mut buf)?;
/// assert_eq!(buf, [2, 3]);
/// assert_eq!((store.reads(), store.bytes_read()), (1, 2));
/// assert_eq!((store.writes(), store.bytes_written()), (1, 4));
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct PerformanceMetricsStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    read: Counter,
    written: Counter,
}

impl<TStorage: ?Sized> PerformanceMetricsStorageAdapter<TStorage> {
    /// Wrap `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            read: Counter::default(),
            written: Counter::default(),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.read.reset();
        self.written.reset();
    }

    /// The number of bytes read.
    pub fn bytes_read(&self) -> usize {
        self.read.bytes.load(Ordering::Relaxed)
    }

    /// The number of bytes written.
    pub fn bytes_written(&self) -> usize {
        self.written.bytes.load(Ordering::Relaxed)
    }

    /// The number of [`read_into`](ReadableStorageTraits::read_into) requests.
    pub fn reads(&self) -> usize {
        self.read.requests.load(Ordering::Relaxed)
    }

    /// The number of regions written; a [`set_partial_many`](WritableStorageTraits::set_partial_many) call counts each region.
    pub fn writes(&self) -> usize {
        self.written.requests.load(Ordering::Relaxed)
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn read_into(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), StorageError> {
        self.storage.read_into(offset, buf)?;
        self.read.record(1, buf.len());
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        self.storage.size()
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn set_partial_many(&self, offset_values: OffsetBytesIterator) -> Result<(), StorageError> {
        let offset_values: Vec<_> = offset_values.collect();
        let regions = offset_values.len();
        let bytes = offset_values.iter().map(|(_, value)| value.len()).sum();
        self.storage
            .set_partial_many(Box::new(offset_values.into_iter()))?;
        self.written.record(regions, bytes);
        Ok(())
    }

    fn truncate(&self, size: u64) -> Result<(), StorageError> {
        self.storage.truncate(size)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.storage.flush()
    }
}
