//! Dataset files.
//!
//! A [`File`] owns the flat byte address space that holds the raw data of its datasets, the allocator that hands out regions of it, and the table of dataset metadata records.
//! The persistent format of the metadata table is outside the scope of this crate: it can be exported with [`File::objects`] and restored with [`FileBuilder::objects`].

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Weak},
};

use dsio_storage::{
    byte_range::ByteOffset, EndOfFileAllocator, ReadableWritableStorage, SpaceAllocatorTraits,
};
use parking_lot::Mutex;

use crate::{
    chunk_index::{BTreeChunkIndex, ChunkIndexTraits},
    dataset::{Dataset, DatasetMetadata, DatasetShared},
    layout::{ExternalFileResolver, MemoryExternalFiles},
    parallel::{Communicator, SingleProcess},
    DatasetError,
};

/// A [`File`] builder.
///
/// By default a file uses a [`SingleProcess`] communicator, [in-memory external files](MemoryExternalFiles), allocates raw data from address zero, and has no datasets.
/// Chunk indices that are not supplied with [`FileBuilder::chunk_index`] are created empty in memory on first use.
pub struct FileBuilder {
    storage: ReadableWritableStorage,
    communicator: Arc<dyn Communicator>,
    external_files: Arc<dyn ExternalFileResolver>,
    base_address: ByteOffset,
    objects: BTreeMap<String, String>,
    chunk_indices: HashMap<ByteOffset, Arc<dyn ChunkIndexTraits>>,
}

impl FileBuilder {
    /// Create a new file builder over `storage`.
    #[must_use]
    pub fn new(storage: ReadableWritableStorage) -> Self {
        Self {
            storage,
            communicator: Arc::new(SingleProcess),
            external_files: Arc::new(MemoryExternalFiles::new()),
            base_address: 0,
            objects: BTreeMap::new(),
            chunk_indices: HashMap::new(),
        }
    }

    /// Set the communicator of the process group sharing the file.
    pub fn communicator(&mut self, communicator: Arc<dyn Communicator>) -> &mut Self {
        self.communicator = communicator;
        self
    }

    /// Set the resolver of external raw data files.
    pub fn external_files(&mut self, external_files: Arc<dyn ExternalFileResolver>) -> &mut Self {
        self.external_files = external_files;
        self
    }

    /// Set the address of the first raw data allocation.
    ///
    /// Reopening a file requires a base address at or past the [end of allocation](File::end_of_allocation) of the previous session.
    pub fn base_address(&mut self, base_address: ByteOffset) -> &mut Self {
        self.base_address = base_address;
        self
    }

    /// Set the dataset metadata table, as returned by [`File::objects`].
    pub fn objects(&mut self, objects: BTreeMap<String, String>) -> &mut Self {
        self.objects = objects;
        self
    }

    /// Set the chunk index stored at `address`, as returned by [`File::chunk_index`].
    pub fn chunk_index(
        &mut self,
        address: ByteOffset,
        index: Arc<dyn ChunkIndexTraits>,
    ) -> &mut Self {
        self.chunk_indices.insert(address, index);
        self
    }

    /// Build the file.
    #[must_use]
    pub fn build(&self) -> File {
        File {
            inner: Arc::new(FileInner {
                storage: self.storage.clone(),
                allocator: EndOfFileAllocator::new(self.base_address),
                communicator: self.communicator.clone(),
                external_files: self.external_files.clone(),
                objects: Mutex::new(self.objects.clone()),
                open_datasets: Mutex::default(),
                chunk_indices: Mutex::new(self.chunk_indices.clone()),
            }),
        }
    }
}

pub(crate) struct FileInner {
    pub(crate) storage: ReadableWritableStorage,
    pub(crate) allocator: EndOfFileAllocator,
    pub(crate) communicator: Arc<dyn Communicator>,
    pub(crate) external_files: Arc<dyn ExternalFileResolver>,
    objects: Mutex<BTreeMap<String, String>>,
    open_datasets: Mutex<HashMap<String, Weak<DatasetShared>>>,
    chunk_indices: Mutex<HashMap<ByteOffset, Arc<dyn ChunkIndexTraits>>>,
}

impl std::fmt::Debug for FileInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("end_of_allocation", &self.allocator.end_of_allocation())
            .field("communicator", &self.communicator)
            .field("objects", &self.objects.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FileInner {
    pub(crate) fn contains_object(&self, name: &str) -> bool {
        self.objects.lock().contains_key(name)
    }

    pub(crate) fn store_metadata(
        &self,
        name: &str,
        metadata: &DatasetMetadata,
    ) -> Result<(), DatasetError> {
        let json = serde_json::to_string(metadata)
            .map_err(|err| DatasetError::InvalidMetadata(err.to_string()))?;
        self.objects.lock().insert(name.to_string(), json);
        Ok(())
    }

    pub(crate) fn register(&self, name: &str, shared: &Arc<DatasetShared>) {
        self.open_datasets
            .lock()
            .insert(name.to_string(), Arc::downgrade(shared));
    }

    /// Return the chunk index at `address`, creating an empty index if there is none.
    pub(crate) fn chunk_index(&self, address: ByteOffset) -> Arc<dyn ChunkIndexTraits> {
        self.chunk_indices
            .lock()
            .entry(address)
            .or_insert_with(|| Arc::new(BTreeChunkIndex::new()))
            .clone()
    }
}

/// A dataset file.
///
/// Cloning a file is cheap: clones share the same address space, metadata table and open datasets.
#[derive(Clone, Debug)]
pub struct File {
    inner: Arc<FileInner>,
}

impl File {
    /// Create a single process file over `storage` with default options.
    ///
    /// See [`FileBuilder`] for other options.
    #[must_use]
    pub fn new(storage: ReadableWritableStorage) -> Self {
        FileBuilder::new(storage).build()
    }

    pub(crate) fn inner(&self) -> &Arc<FileInner> {
        &self.inner
    }

    /// Return the underlying storage.
    #[must_use]
    pub fn storage(&self) -> &ReadableWritableStorage {
        &self.inner.storage
    }

    /// Return the communicator of the process group sharing the file.
    #[must_use]
    pub fn communicator(&self) -> &dyn Communicator {
        self.inner.communicator.as_ref()
    }

    /// Return the address one past the last allocated raw data byte.
    #[must_use]
    pub fn end_of_allocation(&self) -> ByteOffset {
        self.inner.allocator.end_of_allocation()
    }

    /// Return the names of the datasets in the file.
    #[must_use]
    pub fn dataset_names(&self) -> Vec<String> {
        self.inner.objects.lock().keys().cloned().collect()
    }

    /// Return the chunk index stored at `address`.
    ///
    /// The address of the chunk index of a dataset is recorded in its [layout](crate::layout::LayoutRecord::Chunked).
    #[must_use]
    pub fn chunk_index(&self, address: ByteOffset) -> Arc<dyn ChunkIndexTraits> {
        self.inner.chunk_index(address)
    }

    /// Return the dataset metadata table.
    ///
    /// The metadata of open datasets is current as of their last [flush](Dataset::flush).
    #[must_use]
    pub fn objects(&self) -> BTreeMap<String, String> {
        self.inner.objects.lock().clone()
    }

    /// Return the metadata record of the dataset `name`.
    ///
    /// # Errors
    /// Returns [`DatasetError::Argument`] if there is no such dataset, or [`DatasetError::InvalidMetadata`] if its record cannot be decoded.
    pub fn metadata(&self, name: &str) -> Result<DatasetMetadata, DatasetError> {
        let objects = self.inner.objects.lock();
        let json = objects
            .get(name)
            .ok_or_else(|| DatasetError::Argument(format!("no dataset named `{name}`")))?;
        serde_json::from_str(json).map_err(|err| DatasetError::InvalidMetadata(err.to_string()))
    }

    /// Open the dataset `name`.
    ///
    /// Opening a dataset that is already open returns a handle to the same shared dataset.
    /// If the dataset requests early allocation but its raw data has not been allocated, it is allocated.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if there is no such dataset, its metadata is invalid, or allocation fails.
    pub fn open_dataset(&self, name: &str) -> Result<Dataset, DatasetError> {
        if let Some(shared) = self
            .inner
            .open_datasets
            .lock()
            .get(name)
            .and_then(Weak::upgrade)
        {
            return Ok(Dataset::from_shared(shared));
        }
        let metadata = self.metadata(name)?;
        let shared = Arc::new(DatasetShared::open(self.inner.clone(), name, metadata)?);
        shared.allocate_early()?;
        self.inner.register(name, &shared);
        Ok(Dataset::from_shared(shared))
    }

    /// Flush every open dataset.
    ///
    /// # Errors
    /// Returns the first [`DatasetError`] encountered.
    pub fn flush(&self) -> Result<(), DatasetError> {
        let open: Vec<Arc<DatasetShared>> = self
            .inner
            .open_datasets
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for shared in open {
            shared.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dsio_storage::store::MemoryStore;

    use super::*;

    #[test]
    fn file_chunk_indices_are_shared_by_address() {
        let file = File::new(Arc::new(MemoryStore::new()));
        let index = file.chunk_index(8);
        index.insert(&[0], 64).unwrap();
        assert_eq!(file.chunk_index(8).get(&[0]).unwrap(), Some(64));
        assert_eq!(file.chunk_index(16).num_chunks().unwrap(), 0);

        let reopened = FileBuilder::new(file.storage().clone())
            .chunk_index(8, index)
            .build();
        assert_eq!(reopened.chunk_index(8).get(&[0]).unwrap(), Some(64));
        assert!(file.dataset_names().is_empty());
        assert!(matches!(
            file.open_dataset("missing"),
            Err(DatasetError::Argument(_))
        ));
    }
}
