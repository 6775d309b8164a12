//! Dataset storage layouts.
//!
//! Every dataset stores its raw data in one of four physical layouts:
//!  - [contiguous](ContiguousIo): one extent of the file address space, accessed through a sieve buffer,
//!  - [chunked](ChunkedIo): fixed-shape chunks located through a [chunk index](crate::chunk_index::ChunkIndexTraits),
//!  - [compact](CompactIo): a small buffer stored with the dataset metadata, and
//!  - [external](ExternalIo): raw files outside the dataset file, described by an [`ExternalFileList`].
//!
//! Each layout implements the [`LayoutIoTraits`] used by the [transfer engine](crate::transfer).

mod chunked;
mod compact;
mod contiguous;
mod external;

use std::num::NonZeroU64;

use dsio_dataspace::{ArrayShape, Dataspace, SeqListFlags, SequenceCursor};
use dsio_storage::byte_range::ByteOffset;
use serde::{Deserialize, Serialize};

pub use chunked::ChunkedIo;
pub use compact::CompactIo;
pub use contiguous::ContiguousIo;
pub(crate) use contiguous::SieveBuffer;
#[cfg(feature = "filesystem")]
pub use external::FilesystemExternalFiles;
pub use external::{
    ExternalFileEntry, ExternalFileList, ExternalFileResolver, ExternalIo, MemoryExternalFiles,
};

use crate::{transfer::IoInfo, DatasetError};

/// The maximum size in bytes of the raw data of a compact dataset.
pub const COMPACT_MAX_SIZE: usize = 65520;

/// The storage layout requested when creating a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageLayout {
    /// One contiguous extent of the file.
    #[default]
    Contiguous,
    /// Chunks of the given shape.
    Chunked(ArrayShape),
    /// A buffer stored with the dataset metadata.
    Compact,
    /// External raw files.
    External(ExternalFileList),
}

/// The persisted layout record of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum LayoutRecord {
    /// A contiguous layout.
    Contiguous {
        /// The address of the raw data, if allocated.
        address: Option<ByteOffset>,
        /// The size of the raw data in bytes.
        size: u64,
    },
    /// A chunked layout.
    Chunked {
        /// The chunk shape followed by the element size in bytes.
        dims: Vec<u64>,
        /// The address of the chunk index.
        index_address: ByteOffset,
    },
    /// A compact layout.
    Compact {
        /// The raw data.
        data: Vec<u8>,
    },
    /// An external layout.
    External {
        /// The external file list.
        efl: ExternalFileList,
    },
}

/// The in-memory layout of an open dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// A contiguous layout.
    Contiguous {
        /// The address of the raw data, if allocated.
        address: Option<ByteOffset>,
        /// The size of the raw data in bytes.
        size: u64,
    },
    /// A chunked layout.
    Chunked {
        /// The chunk shape followed by the element size in bytes.
        dims: Vec<u64>,
        /// The address of the chunk index.
        index_address: ByteOffset,
    },
    /// A compact layout.
    Compact {
        /// The raw data.
        buf: Vec<u8>,
        /// Whether `buf` differs from the persisted record.
        dirty: bool,
    },
    /// An external layout.
    External {
        /// The external file list.
        efl: ExternalFileList,
    },
}

impl From<LayoutRecord> for Layout {
    fn from(record: LayoutRecord) -> Self {
        match record {
            LayoutRecord::Contiguous { address, size } => Self::Contiguous { address, size },
            LayoutRecord::Chunked {
                dims,
                index_address,
            } => Self::Chunked {
                dims,
                index_address,
            },
            LayoutRecord::Compact { data } => Self::Compact {
                buf: data,
                dirty: false,
            },
            LayoutRecord::External { efl } => Self::External { efl },
        }
    }
}

impl Layout {
    /// Return the persisted record of the layout.
    #[must_use]
    pub fn record(&self) -> LayoutRecord {
        match self {
            Self::Contiguous { address, size } => LayoutRecord::Contiguous {
                address: *address,
                size: *size,
            },
            Self::Chunked {
                dims,
                index_address,
            } => LayoutRecord::Chunked {
                dims: dims.clone(),
                index_address: *index_address,
            },
            Self::Compact { buf, .. } => LayoutRecord::Compact { data: buf.clone() },
            Self::External { efl } => LayoutRecord::External { efl: efl.clone() },
        }
    }

    /// Return the name of the layout class.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Contiguous { .. } => "contiguous",
            Self::Chunked { .. } => "chunked",
            Self::Compact { .. } => "compact",
            Self::External { .. } => "external",
        }
    }

    /// Return the chunk shape of a chunked layout.
    ///
    /// The trailing element size entry of the layout dims is not part of the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> Option<Vec<NonZeroU64>> {
        match self {
            Self::Chunked { dims, .. } => dims
                .split_last()
                .map(|(_, shape)| shape.iter().filter_map(|&d| NonZeroU64::new(d)).collect()),
            _ => None,
        }
    }
}

/// Traits for the raw data I/O of a storage layout.
///
/// The vectorised operations move bytes between a memory buffer and the layout's storage as described by two sequence lists.
/// File sequences are byte offsets relative to the start of the dataset (or chunk) raw data.
/// The direct [`read`](LayoutIoTraits::read) and [`write`](LayoutIoTraits::write) operations transfer a whole selection without type conversion.
pub trait LayoutIoTraits: Send + Sync {
    /// Read the `nelmts` elements selected in `file_space` into the positions selected in `mem_space` of `buf`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if a vectorised read fails or transfers fewer bytes than selected.
    fn read(
        &self,
        io: &IoInfo,
        element_size: usize,
        nelmts: u64,
        file_space: &Dataspace,
        mem_space: &Dataspace,
        buf: &mut [u8],
    ) -> Result<(), DatasetError> {
        select_read(self, io, element_size, nelmts, file_space, mem_space, buf)
    }

    /// Write the `nelmts` elements selected in `mem_space` of `buf` to the positions selected in `file_space`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if a vectorised write fails or transfers fewer bytes than selected.
    fn write(
        &self,
        io: &IoInfo,
        element_size: usize,
        nelmts: u64,
        file_space: &Dataspace,
        mem_space: &Dataspace,
        buf: &[u8],
    ) -> Result<(), DatasetError> {
        select_write(self, io, element_size, nelmts, file_space, mem_space, buf)
    }

    /// Read bytes from the file sequences `src` into the memory sequences `dst` of `buf`.
    ///
    /// Returns the number of bytes transferred, which stops when either cursor is exhausted.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the storage cannot be read.
    fn readvv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &mut [u8],
    ) -> Result<u64, DatasetError>;

    /// Write bytes from the memory sequences `src` of `buf` to the file sequences `dst`.
    ///
    /// Returns the number of bytes transferred, which stops when either cursor is exhausted.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the storage cannot be written.
    fn writevv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &[u8],
    ) -> Result<u64, DatasetError>;
}

/// Refill an exhausted cursor with the next sequences of `iter`.
fn refill(
    iter: &mut dsio_dataspace::SelectionIter,
    cursor: &mut SequenceCursor,
    fetched: &mut u64,
    nelmts: u64,
    max_sequences: usize,
) -> Result<(), DatasetError> {
    if cursor.is_exhausted() {
        if *fetched >= nelmts || iter.elements_left() == 0 {
            return Err(DatasetError::ShortTransfer {
                expected: nelmts,
                actual: *fetched,
            });
        }
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, max_sequences, nelmts - *fetched);
        *fetched += n;
        *cursor = SequenceCursor::new(seqs);
    }
    Ok(())
}

/// Read a selection without type conversion by walking the file and memory sequence lists in lock-step.
///
/// # Errors
/// Returns a [`DatasetError`] if `ops` fails or either selection holds fewer than `nelmts` elements.
pub fn select_read<L: LayoutIoTraits + ?Sized>(
    ops: &L,
    io: &IoInfo,
    element_size: usize,
    nelmts: u64,
    file_space: &Dataspace,
    mem_space: &Dataspace,
    buf: &mut [u8],
) -> Result<(), DatasetError> {
    let max_sequences = io.props().max_sequences();
    let mut file_iter = file_space.iter(element_size);
    let mut mem_iter = mem_space.iter(element_size);
    let mut file_cursor = SequenceCursor::default();
    let mut mem_cursor = SequenceCursor::default();
    let (mut file_fetched, mut mem_fetched) = (0, 0);
    let expected = nelmts * element_size as u64;
    let mut transferred = 0;
    while transferred < expected {
        refill(&mut file_iter, &mut file_cursor, &mut file_fetched, nelmts, max_sequences)?;
        refill(&mut mem_iter, &mut mem_cursor, &mut mem_fetched, nelmts, max_sequences)?;
        let bytes = ops.readvv(io, &mut mem_cursor, &mut file_cursor, buf)?;
        if bytes == 0 {
            break;
        }
        transferred += bytes;
    }
    if transferred == expected {
        Ok(())
    } else {
        Err(DatasetError::ShortTransfer {
            expected,
            actual: transferred,
        })
    }
}

/// Write a selection without type conversion by walking the memory and file sequence lists in lock-step.
///
/// # Errors
/// Returns a [`DatasetError`] if `ops` fails or either selection holds fewer than `nelmts` elements.
pub fn select_write<L: LayoutIoTraits + ?Sized>(
    ops: &L,
    io: &IoInfo,
    element_size: usize,
    nelmts: u64,
    file_space: &Dataspace,
    mem_space: &Dataspace,
    buf: &[u8],
) -> Result<(), DatasetError> {
    let max_sequences = io.props().max_sequences();
    let mut file_iter = file_space.iter(element_size);
    let mut mem_iter = mem_space.iter(element_size);
    let mut file_cursor = SequenceCursor::default();
    let mut mem_cursor = SequenceCursor::default();
    let (mut file_fetched, mut mem_fetched) = (0, 0);
    let expected = nelmts * element_size as u64;
    let mut transferred = 0;
    while transferred < expected {
        refill(&mut file_iter, &mut file_cursor, &mut file_fetched, nelmts, max_sequences)?;
        refill(&mut mem_iter, &mut mem_cursor, &mut mem_fetched, nelmts, max_sequences)?;
        let bytes = ops.writevv(io, &mut file_cursor, &mut mem_cursor, buf)?;
        if bytes == 0 {
            break;
        }
        transferred += bytes;
    }
    if transferred == expected {
        Ok(())
    } else {
        Err(DatasetError::ShortTransfer {
            expected,
            actual: transferred,
        })
    }
}
