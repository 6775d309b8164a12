//! A write-back LRU cache of raw chunk bytes.

use std::num::NonZeroUsize;

use dsio_dataspace::ArrayIndices;
use dsio_storage::{
    byte_range::ByteOffset, ReadableWritableStorageTraits, SpaceAllocatorTraits, StorageError,
};
use lru::LruCache;

use crate::chunk_index::ChunkIndexTraits;

/// The storage a chunk cache loads from and writes back to.
pub(crate) struct ChunkBacking<'a> {
    pub(crate) storage: &'a dyn ReadableWritableStorageTraits,
    pub(crate) allocator: &'a dyn SpaceAllocatorTraits,
    pub(crate) index: &'a dyn ChunkIndexTraits,
    pub(crate) chunk_bytes: usize,
}

impl ChunkBacking<'_> {
    /// Read the raw bytes of an allocated chunk.
    pub(crate) fn load(&self, address: ByteOffset) -> Result<Vec<u8>, StorageError> {
        let mut data = vec![0; self.chunk_bytes];
        self.storage.read_into(address, &mut data)?;
        Ok(data)
    }

    /// Write a chunk, allocating it first if it has no address.
    pub(crate) fn write_back(&self, scaled: &[u64], data: &[u8]) -> Result<(), StorageError> {
        let address = match self.index.get(scaled)? {
            Some(address) => address,
            None => {
                let address = self.allocator.allocate(self.chunk_bytes as u64)?;
                self.index.insert(scaled, address)?;
                address
            }
        };
        log::debug!("writing back chunk {scaled:?} at {address}");
        self.storage.set_partial(address, data)
    }
}

#[derive(Debug)]
pub(crate) struct CachedChunk {
    pub(crate) data: Vec<u8>,
    pub(crate) dirty: bool,
}

/// An LRU chunk cache bounded by a byte budget and a slot count.
#[derive(Debug)]
pub(crate) struct ChunkCache {
    entries: LruCache<ArrayIndices, CachedChunk>,
    nbytes: usize,
    max_bytes: usize,
}

impl ChunkCache {
    pub(crate) fn new(max_bytes: usize, slots: usize) -> Self {
        let slots = NonZeroUsize::new(slots).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(slots),
            nbytes: 0,
            max_bytes,
        }
    }

    /// Returns true if a chunk of `chunk_bytes` fits in the cache.
    pub(crate) fn caches(&self, chunk_bytes: usize) -> bool {
        chunk_bytes > 0 && chunk_bytes <= self.max_bytes
    }

    pub(crate) fn contains(&self, scaled: &[u64]) -> bool {
        self.entries.contains(scaled)
    }

    #[cfg(test)]
    pub(crate) fn nbytes(&self) -> usize {
        self.nbytes
    }

    /// Return the cached chunk at `scaled`, inserting the bytes returned by `load` if it is not cached.
    ///
    /// Dirty chunks evicted to make room are written back through `backing`.
    pub(crate) fn get_or_insert_with(
        &mut self,
        scaled: &[u64],
        backing: &ChunkBacking,
        load: impl FnOnce() -> Result<Vec<u8>, StorageError>,
    ) -> Result<&mut CachedChunk, StorageError> {
        if !self.entries.contains(scaled) {
            let data = load()?;
            while self.nbytes + data.len() > self.max_bytes {
                let Some((evicted_scaled, evicted)) = self.entries.pop_lru() else {
                    break;
                };
                self.evicted(&evicted_scaled, &evicted, backing)?;
            }
            self.nbytes += data.len();
            if let Some((evicted_scaled, evicted)) = self
                .entries
                .push(scaled.to_vec(), CachedChunk { data, dirty: false })
            {
                self.evicted(&evicted_scaled, &evicted, backing)?;
            }
        }
        self.entries
            .get_mut(scaled)
            .ok_or_else(|| StorageError::Other(format!("chunk {scaled:?} missing from cache")))
    }

    fn evicted(
        &mut self,
        scaled: &[u64],
        chunk: &CachedChunk,
        backing: &ChunkBacking,
    ) -> Result<(), StorageError> {
        self.nbytes -= chunk.data.len();
        if chunk.dirty {
            backing.write_back(scaled, &chunk.data)?;
        }
        Ok(())
    }

    /// Write back every dirty chunk, keeping them cached.
    pub(crate) fn flush(&mut self, backing: &ChunkBacking) -> Result<(), StorageError> {
        for (scaled, chunk) in self.entries.iter_mut() {
            if chunk.dirty {
                backing.write_back(scaled, &chunk.data)?;
                chunk.dirty = false;
            }
        }
        Ok(())
    }

    /// Iterate over the cached chunks without changing their recency.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&ArrayIndices, &mut CachedChunk)> {
        self.entries.iter_mut()
    }

    /// Drop the cached chunks for which `discard` returns true without writing them back.
    pub(crate) fn discard(&mut self, mut discard: impl FnMut(&[u64]) -> bool) {
        let keys: Vec<ArrayIndices> = self
            .entries
            .iter()
            .filter(|(scaled, _)| discard(scaled))
            .map(|(scaled, _)| scaled.clone())
            .collect();
        for scaled in keys {
            if let Some(chunk) = self.entries.pop(&scaled) {
                self.nbytes -= chunk.data.len();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dsio_storage::{store::MemoryStore, EndOfFileAllocator, ReadableStorageTraits};

    use crate::chunk_index::BTreeChunkIndex;

    use super::*;

    #[test]
    fn chunk_cache_evicts_and_writes_back() {
        let store = MemoryStore::new();
        let allocator = EndOfFileAllocator::new(0);
        let index = BTreeChunkIndex::new();
        let backing = ChunkBacking {
            storage: &store,
            allocator: &allocator,
            index: &index,
            chunk_bytes: 4,
        };
        let mut cache = ChunkCache::new(8, 16);
        assert!(cache.caches(8));
        assert!(!cache.caches(9));

        let chunk = cache
            .get_or_insert_with(&[0], &backing, || Ok(vec![0; 4]))
            .unwrap();
        chunk.data.copy_from_slice(&[1, 2, 3, 4]);
        chunk.dirty = true;
        cache
            .get_or_insert_with(&[1], &backing, || Ok(vec![5; 4]))
            .unwrap();
        assert_eq!(cache.nbytes(), 8);
        assert_eq!(index.num_chunks().unwrap(), 0);

        // A third chunk evicts the least recently used dirty chunk [0]
        cache
            .get_or_insert_with(&[2], &backing, || Ok(vec![0; 4]))
            .unwrap();
        assert!(!cache.contains(&[0]));
        assert_eq!(index.get(&[0]).unwrap(), Some(0));
        let mut bytes = [0; 4];
        store.read_into(0, &mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4]);

        // Clean chunks are not written back
        cache.flush(&backing).unwrap();
        assert_eq!(index.num_chunks().unwrap(), 1);

        cache.discard(|scaled| scaled[0] >= 2);
        assert!(!cache.contains(&[2]));
        assert_eq!(cache.nbytes(), 4);
    }
}
