use std::{collections::HashMap, sync::Arc};

use dsio_dataspace::{sequence::for_each_segment, SequenceCursor};
use dsio_storage::{
    store::MemoryStore, ReadableStorageTraits, ReadableWritableStorage, StorageError,
    WritableStorageTraits,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    transfer::{IoInfo, StorageLocation},
    DatasetError,
};

use super::LayoutIoTraits;

/// One segment of the raw data of an external dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalFileEntry {
    /// The name of the external file.
    pub name: String,
    /// The byte offset of the segment in the external file.
    pub offset: u64,
    /// The size of the segment in bytes.
    pub size: u64,
}

/// An ordered list of external file segments holding the raw data of a dataset.
///
/// The raw data is the concatenation of the segments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalFileList {
    entries: Vec<ExternalFileEntry>,
}

impl ExternalFileList {
    /// Create an empty external file list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment of `size` bytes at `offset` of the file `name`.
    pub fn push(&mut self, name: impl Into<String>, offset: u64, size: u64) -> &mut Self {
        self.entries.push(ExternalFileEntry {
            name: name.into(),
            offset,
            size,
        });
        self
    }

    /// Return the segments.
    #[must_use]
    pub fn entries(&self) -> &[ExternalFileEntry] {
        &self.entries
    }

    /// Return the total size in bytes of all segments.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size).sum()
    }

    /// Split `len` bytes at `offset` of the raw data into `(entry, file offset, length)` pieces.
    ///
    /// # Errors
    /// Returns [`DatasetError::Argument`] if the range extends past the last segment.
    pub fn segments(
        &self,
        offset: u64,
        len: u64,
    ) -> Result<Vec<(&ExternalFileEntry, u64, u64)>, DatasetError> {
        let mut pieces = Vec::new();
        let (mut offset, mut len) = (offset, len);
        let mut start = 0;
        for entry in &self.entries {
            if len == 0 {
                break;
            }
            let end = start + entry.size;
            if offset < end {
                let n = std::cmp::min(len, end - offset);
                pieces.push((entry, entry.offset + (offset - start), n));
                offset += n;
                len -= n;
            }
            start = end;
        }
        if len == 0 {
            Ok(pieces)
        } else {
            Err(DatasetError::Argument(format!(
                "{len} bytes at {offset} lie beyond the external files ({} bytes)",
                self.total_size()
            )))
        }
    }
}

/// Resolves external file names to storage.
pub trait ExternalFileResolver: Send + Sync + std::fmt::Debug {
    /// Return the storage of the external file `name`, creating it if it does not exist.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the file cannot be opened.
    fn resolve(&self, name: &str) -> Result<ReadableWritableStorage, StorageError>;
}

/// External files held in memory.
#[derive(Debug, Default)]
pub struct MemoryExternalFiles {
    files: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryExternalFiles {
    /// Create an empty set of in-memory external files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the in-memory file `name`, if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.files.lock().get(name).cloned()
    }

    /// Insert (or replace) the in-memory file `name`.
    pub fn insert(&self, name: impl Into<String>, store: Arc<MemoryStore>) {
        self.files.lock().insert(name.into(), store);
    }
}

impl ExternalFileResolver for MemoryExternalFiles {
    fn resolve(&self, name: &str) -> Result<ReadableWritableStorage, StorageError> {
        Ok(self
            .files
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone())
    }
}

/// External files on the local filesystem, relative to a base directory.
#[cfg(feature = "filesystem")]
#[derive(Debug)]
pub struct FilesystemExternalFiles {
    base_path: std::path::PathBuf,
    files: Mutex<HashMap<String, Arc<dsio_filesystem::FilesystemStore>>>,
}

#[cfg(feature = "filesystem")]
impl FilesystemExternalFiles {
    /// Resolve external file names relative to `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            files: Mutex::default(),
        }
    }
}

#[cfg(feature = "filesystem")]
impl ExternalFileResolver for FilesystemExternalFiles {
    fn resolve(&self, name: &str) -> Result<ReadableWritableStorage, StorageError> {
        let mut files = self.files.lock();
        if let Some(store) = files.get(name) {
            return Ok(store.clone());
        }
        let store = Arc::new(
            dsio_filesystem::FilesystemStore::new(self.base_path.join(name))
                .map_err(|err| StorageError::Other(err.to_string()))?,
        );
        files.insert(name.to_string(), store.clone());
        Ok(store)
    }
}

/// The I/O operations of an external layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalIo;

fn external_files<'a>(io: &'a IoInfo) -> Result<&'a ExternalFileList, DatasetError> {
    match io.location() {
        StorageLocation::External(efl) => Ok(efl),
        location => Err(DatasetError::Unsupported(format!(
            "external I/O at {location:?}"
        ))),
    }
}

impl LayoutIoTraits for ExternalIo {
    fn readvv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &mut [u8],
    ) -> Result<u64, DatasetError> {
        let efl = external_files(io)?;
        let resolver = io.dataset().external_files();
        for_each_segment(dst, src, |mem_offset, file_offset, len| {
            let mut mem_offset = usize::try_from(mem_offset).unwrap();
            for (entry, offset, n) in efl.segments(file_offset, len)? {
                let n = usize::try_from(n).unwrap();
                resolver
                    .resolve(&entry.name)?
                    .read_into(offset, &mut buf[mem_offset..mem_offset + n])?;
                mem_offset += n;
            }
            Ok::<_, DatasetError>(())
        })
    }

    fn writevv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &[u8],
    ) -> Result<u64, DatasetError> {
        let efl = external_files(io)?;
        let resolver = io.dataset().external_files();
        for_each_segment(dst, src, |file_offset, mem_offset, len| {
            let mut mem_offset = usize::try_from(mem_offset).unwrap();
            for (entry, offset, n) in efl.segments(file_offset, len)? {
                let n = usize::try_from(n).unwrap();
                resolver
                    .resolve(&entry.name)?
                    .set_partial(offset, &buf[mem_offset..mem_offset + n])?;
                mem_offset += n;
            }
            Ok::<_, DatasetError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use dsio_storage::ReadableStorageTraits;

    use super::*;

    #[test]
    fn external_file_list_segments() {
        let mut efl = ExternalFileList::new();
        efl.push("a.raw", 100, 8).push("b.raw", 0, 8);
        assert_eq!(efl.total_size(), 16);
        let pieces: Vec<(&str, u64, u64)> = efl
            .segments(6, 4)
            .unwrap()
            .into_iter()
            .map(|(entry, offset, n)| (entry.name.as_str(), offset, n))
            .collect();
        assert_eq!(pieces, [("a.raw", 106, 2), ("b.raw", 0, 2)]);
        assert!(efl.segments(15, 2).is_err());
    }

    #[test]
    fn memory_external_files() {
        let files = MemoryExternalFiles::new();
        assert!(files.get("x").is_none());
        files.resolve("x").unwrap().set_partial(2, &[1, 2]).unwrap();
        let mut bytes = [9u8; 4];
        files.get("x").unwrap().read_into(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0, 0, 1, 2]);
    }
}
