//! Chunk indices.
//!
//! A chunk index maps the scaled coordinates of a chunk (its position in the chunk grid) to the file address of its raw data.
//! The persistent format of a chunk index is outside the scope of this crate; the [`ChunkIndexTraits`] are its narrow interface.

use std::collections::BTreeMap;

use dsio_dataspace::ArrayIndices;
use dsio_storage::{byte_range::ByteOffset, StorageError};
use parking_lot::RwLock;

/// Traits for a chunk index.
pub trait ChunkIndexTraits: Send + Sync + std::fmt::Debug {
    /// Return the address of the chunk at scaled coordinates `scaled`, or [`None`] if it is not allocated.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the index cannot be read.
    fn get(&self, scaled: &[u64]) -> Result<Option<ByteOffset>, StorageError>;

    /// Record that the chunk at `scaled` is stored at `address`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the index cannot be updated.
    fn insert(&self, scaled: &[u64], address: ByteOffset) -> Result<(), StorageError>;

    /// Remove the chunk at `scaled` from the index, returning its address if it was allocated.
    ///
    /// The raw data of a removed chunk is not reclaimed.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the index cannot be updated.
    fn remove(&self, scaled: &[u64]) -> Result<Option<ByteOffset>, StorageError>;

    /// Return the number of allocated chunks.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the index cannot be read.
    fn num_chunks(&self) -> Result<usize, StorageError>;

    /// Return every allocated chunk in ascending order of scaled coordinates.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the index cannot be read.
    fn entries(&self) -> Result<Vec<(ArrayIndices, ByteOffset)>, StorageError>;
}

/// An in-memory chunk index ordered by scaled coordinates.
#[derive(Debug, Default)]
pub struct BTreeChunkIndex {
    chunks: RwLock<BTreeMap<ArrayIndices, ByteOffset>>,
}

impl BTreeChunkIndex {
    /// Create an empty chunk index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkIndexTraits for BTreeChunkIndex {
    fn get(&self, scaled: &[u64]) -> Result<Option<ByteOffset>, StorageError> {
        Ok(self.chunks.read().get(scaled).copied())
    }

    fn insert(&self, scaled: &[u64], address: ByteOffset) -> Result<(), StorageError> {
        let mut chunks = self.chunks.write();
        match chunks.get(scaled) {
            Some(&previous) if previous != address => Err(StorageError::Other(format!(
                "chunk {scaled:?} is already stored at {previous}"
            ))),
            _ => {
                chunks.insert(scaled.to_vec(), address);
                Ok(())
            }
        }
    }

    fn remove(&self, scaled: &[u64]) -> Result<Option<ByteOffset>, StorageError> {
        Ok(self.chunks.write().remove(scaled))
    }

    fn num_chunks(&self) -> Result<usize, StorageError> {
        Ok(self.chunks.read().len())
    }

    fn entries(&self) -> Result<Vec<(ArrayIndices, ByteOffset)>, StorageError> {
        Ok(self
            .chunks
            .read()
            .iter()
            .map(|(scaled, address)| (scaled.clone(), *address))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btree_chunk_index() {
        let index = BTreeChunkIndex::new();
        assert_eq!(index.get(&[0, 1]).unwrap(), None);
        index.insert(&[1, 0], 200).unwrap();
        index.insert(&[0, 1], 100).unwrap();
        index.insert(&[0, 1], 100).unwrap();
        assert!(index.insert(&[0, 1], 300).is_err());
        assert_eq!(index.get(&[0, 1]).unwrap(), Some(100));
        assert_eq!(index.num_chunks().unwrap(), 2);
        assert_eq!(index.remove(&[1, 0]).unwrap(), Some(200));
        assert_eq!(index.remove(&[1, 0]).unwrap(), None);
        index.insert(&[1, 0], 200).unwrap();
        assert_eq!(
            index.entries().unwrap(),
            vec![(vec![0, 1], 100), (vec![1, 0], 200)]
        );
    }
}
