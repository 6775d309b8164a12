//! A synchronous in-memory store.

use bytes::BytesMut;
use parking_lot::RwLock;

use crate::byte_range::ByteOffset;
use crate::{OffsetBytesIterator, ReadableStorageTraits, StorageError, WritableStorageTraits};

/// A synchronous in-memory store.
///
/// The store is a single growable byte buffer standing in for a file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BytesMut>,
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::default(),
        }
    }

    /// Create a new memory store with initial contents.
    #[must_use]
    pub fn new_with_bytes(bytes: &[u8]) -> Self {
        Self {
            data: RwLock::new(BytesMut::from(bytes)),
        }
    }

    /// Return a copy of the entire contents of the store.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().to_vec()
    }

    fn set_impl(data: &mut BytesMut, value: &[u8], offset: ByteOffset) {
        let offset = usize::try_from(offset).unwrap();
        let end = offset + value.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(value);
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn read_into(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), StorageError> {
        let data = self.data.read();
        let len = data.len() as u64;
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }
        let start = usize::try_from(offset).unwrap();
        let available = std::cmp::min(buf.len(), data.len() - start);
        buf[..available].copy_from_slice(&data[start..start + available]);
        buf[available..].fill(0);
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.data.read().len() as u64)
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set_partial_many(&self, offset_values: OffsetBytesIterator) -> Result<(), StorageError> {
        let mut data = self.data.write();
        for (offset, value) in offset_values {
            Self::set_impl(&mut data, value, offset);
        }
        Ok(())
    }

    fn truncate(&self, size: u64) -> Result<(), StorageError> {
        let size = usize::try_from(size)
            .map_err(|_| StorageError::Other(format!("cannot truncate to {size} bytes")))?;
        self.data.write().resize(size, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_range::ByteRange;

    #[test]
    fn memory_store_sparse_reads() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        store.set_partial(4, &[1, 2, 3])?;
        assert_eq!(store.size()?, 7);
        assert_eq!(store.to_vec(), vec![0, 0, 0, 0, 1, 2, 3]);

        let mut buf = [9u8; 5];
        store.read_into(5, &mut buf)?;
        assert_eq!(buf, [2, 3, 0, 0, 0]);

        let mut buf = [9u8; 2];
        store.read_into(100, &mut buf)?;
        assert_eq!(buf, [0, 0]);
        Ok(())
    }

    #[test]
    fn memory_store_byte_ranges() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new_with_bytes(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(store.get_partial(ByteRange::Suffix(2))?.as_ref(), &[4, 5]);
        assert_eq!(store.get_partial(ByteRange::FromStart(3, None))?.as_ref(), &[3, 4, 5]);
        assert!(store.get_partial(ByteRange::Suffix(7)).is_err());
        assert!(store.get_partial(ByteRange::FromStart(7, None)).is_err());

        store.truncate(3)?;
        assert_eq!(store.to_vec(), vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn memory_store_semantics() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        crate::store_test::store_write(&store)?;
        crate::store_test::store_read(&store)?;
        Ok(())
    }
}
