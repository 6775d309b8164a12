//! Datasets.
//!
//! A [`Dataset`] is an N-dimensional array of elements of one [`DataType`] stored in a [`File`](crate::file::File) with one of the [storage layouts](crate::layout).
//! Datasets are created with a [`DatasetBuilder`] and reopened with [`File::open_dataset`](crate::file::File::open_dataset).
//!
//! Every open dataset has one shared descriptor per file.
//! [`Dataset`] handles are cheap to clone; when the last handle is dropped the shared descriptor flushes its sieve buffer, compact buffer and chunk cache.
//! Errors during that implicit flush can only be logged, so [`Dataset::close`] or [`Dataset::flush`] should be preferred where errors matter.

mod dataset_builder;

use std::{borrow::Cow, ops::Range, sync::Arc};

use dsio_dataspace::{
    sequence::grid_shape, ArrayShape, ArraySubset, Dataspace, Extent, SelectionError,
};
use dsio_storage::{byte_range::ByteOffset, ReadableWritableStorageTraits, SpaceAllocatorTraits};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub use dataset_builder::DatasetBuilder;

use crate::{
    chunk_cache::{ChunkBacking, ChunkCache},
    chunk_index::ChunkIndexTraits,
    config::global_config,
    datatype::DataType,
    file::FileInner,
    fill_value::{AllocTime, FillValueRecord},
    layout::{ExternalFileResolver, Layout, LayoutRecord, SieveBuffer},
    parallel::{Communicator, ModeSummary},
    properties::{TransferProperties, TransferScratch},
    transfer, DatasetError,
};

/// The persisted metadata record of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// The data type of the elements in the file.
    pub data_type: DataType,
    /// The extent.
    pub extent: Extent,
    /// The storage layout.
    pub layout: LayoutRecord,
    /// The fill value and allocation policy.
    pub fill_value: FillValueRecord,
}

/// A dataspace argument of a read or write call.
#[derive(Clone, Copy, Debug)]
pub enum SpaceArg<'a> {
    /// The whole extent of the dataset.
    ///
    /// As a memory dataspace, this is a copy of the resolved file dataspace, selection included.
    All,
    /// An explicit dataspace.
    Space(&'a Dataspace),
}

impl<'a> From<&'a Dataspace> for SpaceArg<'a> {
    fn from(space: &'a Dataspace) -> Self {
        Self::Space(space)
    }
}

fn allocation_error(err: impl std::fmt::Display) -> DatasetError {
    DatasetError::Allocation(err.to_string())
}

/// Byte ranges of the chunk at `scaled` that hold elements outside an extent of `dims`, in ascending order.
fn outside_extent_runs(
    scaled: &[u64],
    chunk_shape: &[u64],
    dims: &[u64],
    element_size: usize,
) -> Vec<Range<usize>> {
    let origin: Vec<u64> = std::iter::zip(scaled, chunk_shape)
        .map(|(s, c)| s * c)
        .collect();
    let edge = std::iter::zip(std::iter::zip(&origin, chunk_shape), dims)
        .any(|((o, c), d)| o + c > *d);
    let (Some((&row_len, outer_shape)), true) = (chunk_shape.split_last(), edge) else {
        return Vec::new();
    };
    let rank = chunk_shape.len();
    let row_inside = dims[rank - 1].saturating_sub(origin[rank - 1]).min(row_len);
    let row_len = usize::try_from(row_len).unwrap();
    let row_inside = usize::try_from(row_inside).unwrap();

    let mut runs: Vec<Range<usize>> = Vec::new();
    for (row, local) in ArraySubset::new_with_shape(outer_shape.to_vec())
        .indices()
        .enumerate()
    {
        let row_outside = std::iter::zip(std::iter::zip(&local, &origin), dims)
            .any(|((l, o), d)| l + o >= *d);
        let first = if row_outside { 0 } else { row_inside };
        if first == row_len {
            continue;
        }
        let start = (row * row_len + first) * element_size;
        let end = (row + 1) * row_len * element_size;
        match runs.last_mut() {
            Some(run) if run.end == start => run.end = end,
            _ => runs.push(start..end),
        }
    }
    runs
}

/// The shared descriptor of an open dataset.
pub(crate) struct DatasetShared {
    file: Arc<FileInner>,
    name: String,
    data_type: DataType,
    fill_value: FillValueRecord,
    extent: RwLock<Extent>,
    pub(crate) layout: Mutex<Layout>,
    pub(crate) sieve: Mutex<SieveBuffer>,
    pub(crate) chunk_cache: Mutex<ChunkCache>,
    chunk_index: Option<Arc<dyn ChunkIndexTraits>>,
    chunk_bytes: Option<usize>,
    chunk_cache_enabled: bool,
    late_allocated: Mutex<bool>,
}

impl std::fmt::Debug for DatasetShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetShared")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("extent", &*self.extent.read())
            .field("layout", &self.layout.lock().class())
            .finish_non_exhaustive()
    }
}

impl DatasetShared {
    pub(crate) fn open(
        file: Arc<FileInner>,
        name: &str,
        metadata: DatasetMetadata,
    ) -> Result<Self, DatasetError> {
        metadata
            .data_type
            .validate()
            .map_err(|err| DatasetError::InvalidMetadata(err.to_string()))?;
        let layout = Layout::from(metadata.layout);
        let (chunk_index, chunk_bytes) = match &layout {
            Layout::Chunked {
                dims,
                index_address,
            } => {
                if dims.len() != metadata.extent.rank() + 1
                    || dims.contains(&0)
                    || dims.last().copied() != Some(metadata.data_type.size() as u64)
                {
                    return Err(DatasetError::InvalidMetadata(format!(
                        "chunk dims {dims:?} do not match a rank {} extent of {} byte elements",
                        metadata.extent.rank(),
                        metadata.data_type.size()
                    )));
                }
                let chunk_bytes = usize::try_from(dims.iter().product::<u64>())
                    .map_err(allocation_error)?;
                (Some(file.chunk_index(*index_address)), Some(chunk_bytes))
            }
            _ => (None, None),
        };

        // Raw data caches and allocators are private to a process.
        // In a shared file the caches are disabled and every member allocates all storage
        // up front, in the same order.
        let single_process = file.communicator.size() == 1;
        let mut fill_value = metadata.fill_value;
        if !single_process && fill_value.alloc_time != AllocTime::Early {
            log::debug!("dataset `{name}` is shared, using early allocation");
            fill_value.alloc_time = AllocTime::Early;
        }

        let config = global_config();
        let chunk_cache = ChunkCache::new(config.chunk_cache_size(), config.chunk_cache_slots());
        let chunk_cache_enabled = single_process
            && chunk_bytes.is_some_and(|chunk_bytes| chunk_cache.caches(chunk_bytes));
        let sieve = SieveBuffer::new(if single_process {
            config.sieve_buffer_size()
        } else {
            0
        });
        drop(config);

        log::debug!(
            "opened {} dataset `{name}` with extent {:?}",
            layout.class(),
            metadata.extent.dims()
        );
        Ok(Self {
            file,
            name: name.to_string(),
            data_type: metadata.data_type,
            fill_value,
            extent: RwLock::new(metadata.extent),
            layout: Mutex::new(layout),
            sieve: Mutex::new(sieve),
            chunk_cache: Mutex::new(chunk_cache),
            chunk_index,
            chunk_bytes,
            chunk_cache_enabled,
            late_allocated: Mutex::new(false),
        })
    }

    pub(crate) fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub(crate) fn fill_value(&self) -> &FillValueRecord {
        &self.fill_value
    }

    pub(crate) fn communicator(&self) -> &dyn Communicator {
        self.file.communicator.as_ref()
    }

    pub(crate) fn storage(&self) -> &dyn ReadableWritableStorageTraits {
        self.file.storage.as_ref()
    }

    pub(crate) fn external_files(&self) -> &dyn ExternalFileResolver {
        self.file.external_files.as_ref()
    }

    pub(crate) fn dims(&self) -> ArrayShape {
        self.extent.read().dims().to_vec()
    }

    pub(crate) fn num_elements(&self) -> u64 {
        self.extent.read().num_elements()
    }

    pub(crate) fn chunk_cache_enabled(&self) -> bool {
        self.chunk_cache_enabled
    }

    fn chunk_index(&self) -> Result<&dyn ChunkIndexTraits, DatasetError> {
        self.chunk_index.as_deref().ok_or_else(|| {
            DatasetError::Unsupported(format!("dataset `{}` is not chunked", self.name))
        })
    }

    pub(crate) fn chunk_backing(&self) -> Result<ChunkBacking<'_>, DatasetError> {
        Ok(ChunkBacking {
            storage: self.storage(),
            allocator: &self.file.allocator,
            index: self.chunk_index()?,
            chunk_bytes: self.chunk_bytes.unwrap_or_default(),
        })
    }

    /// Returns true if the chunk at `scaled` has storage, either in the file or in the chunk cache.
    pub(crate) fn chunk_allocated(&self, scaled: &[u64]) -> Result<bool, DatasetError> {
        Ok(self.chunk_index()?.get(scaled)?.is_some() || self.chunk_cache.lock().contains(scaled))
    }

    pub(crate) fn chunk_address(&self, scaled: &[u64]) -> Result<Option<ByteOffset>, DatasetError> {
        Ok(self.chunk_index()?.get(scaled)?)
    }

    /// Return the initial contents of a chunk that is not allocated.
    pub(crate) fn fill_chunk(&self, full_overwrite: bool) -> Vec<u8> {
        let chunk_bytes = self.chunk_bytes.unwrap_or_default();
        let element_size = self.data_type.size();
        if !full_overwrite && self.fill_value.writes_fill() {
            self.fill_value
                .fill_bytes(element_size, chunk_bytes / element_size)
        } else {
            vec![0; chunk_bytes]
        }
    }

    /// Returns true if newly allocated storage of this dataset must be filled.
    fn needs_fill(&self, full_overwrite: bool) -> bool {
        self.fill_value.writes_fill() && (!full_overwrite || self.data_type.is_variable_length())
    }

    /// Write fill values to `nbytes` bytes of raw data at `address`.
    fn write_fill(&self, address: ByteOffset, nbytes: u64) -> Result<(), DatasetError> {
        let element_size = self.data_type.size();
        let piece_elements = std::cmp::max(1, global_config().tconv_buffer_size() / element_size);
        let piece = self.fill_value.fill_bytes(element_size, piece_elements);
        let mut offset = 0;
        while offset < nbytes {
            let n = std::cmp::min(piece.len() as u64, nbytes - offset);
            self.storage()
                .set_partial(address + offset, &piece[..usize::try_from(n).unwrap()])?;
            offset += n;
        }
        Ok(())
    }

    /// Allocate the raw data of a contiguous dataset, if not already allocated.
    pub(crate) fn allocate_contiguous(
        &self,
        full_overwrite: bool,
    ) -> Result<ByteOffset, DatasetError> {
        let mut layout = self.layout.lock();
        let Layout::Contiguous { address, size } = &mut *layout else {
            return Err(DatasetError::Unsupported(format!(
                "dataset `{}` is not contiguous",
                self.name
            )));
        };
        if let Some(address) = address {
            return Ok(*address);
        }
        let new_address = self
            .file
            .allocator
            .allocate(*size)
            .map_err(allocation_error)?;
        log::debug!(
            "allocated {size} bytes at {new_address} for dataset `{}`",
            self.name
        );
        if self.needs_fill(full_overwrite) {
            self.write_fill(new_address, *size)?;
        }
        *address = Some(new_address);
        Ok(new_address)
    }

    /// Allocate the chunk at `scaled`, if not already allocated.
    pub(crate) fn allocate_chunk(
        &self,
        scaled: &[u64],
        full_overwrite: bool,
    ) -> Result<ByteOffset, DatasetError> {
        let index = self.chunk_index()?;
        if let Some(address) = index.get(scaled)? {
            return Ok(address);
        }
        let chunk_bytes = self.chunk_bytes.unwrap_or_default() as u64;
        let address = self
            .file
            .allocator
            .allocate(chunk_bytes)
            .map_err(allocation_error)?;
        if self.needs_fill(full_overwrite) {
            self.write_fill(address, chunk_bytes)?;
        }
        index.insert(scaled, address)?;
        Ok(address)
    }

    /// Allocate all raw data if the dataset requests early allocation.
    pub(crate) fn allocate_early(&self) -> Result<(), DatasetError> {
        if self.fill_value.alloc_time == AllocTime::Early {
            self.allocate_all()?;
        }
        Ok(())
    }

    /// Allocate all raw data before the first write if the dataset requests late allocation.
    pub(crate) fn allocate_late(&self) -> Result<(), DatasetError> {
        if self.fill_value.alloc_time == AllocTime::Late {
            let mut allocated = self.late_allocated.lock();
            if !*allocated {
                self.allocate_all()?;
                *allocated = true;
            }
        }
        Ok(())
    }

    /// Allocate the raw data, or every chunk of the grid that is not held by the chunk cache.
    fn allocate_all(&self) -> Result<(), DatasetError> {
        let (contiguous, chunk_shape) = {
            let layout = self.layout.lock();
            (
                matches!(*layout, Layout::Contiguous { .. }),
                layout.chunk_shape(),
            )
        };
        if contiguous {
            self.allocate_contiguous(false)?;
        } else if let Some(chunk_shape) = chunk_shape {
            let grid = grid_shape(&self.dims(), &chunk_shape);
            for scaled in ArraySubset::new_with_shape(grid).indices() {
                if !self.chunk_cache.lock().contains(&scaled) {
                    self.allocate_chunk(&scaled, false)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn metadata(&self) -> DatasetMetadata {
        DatasetMetadata {
            data_type: self.data_type.clone(),
            extent: self.extent.read().clone(),
            layout: self.layout.lock().record(),
            fill_value: self.fill_value.clone(),
        }
    }

    pub(crate) fn store_metadata(&self) -> Result<(), DatasetError> {
        self.file.store_metadata(&self.name, &self.metadata())
    }

    /// Write back the sieve buffer, chunk cache and compact buffer, and store the metadata record.
    pub(crate) fn flush(&self) -> Result<(), DatasetError> {
        self.sieve.lock().flush(self.storage())?;
        if self.chunk_index.is_some() {
            let backing = self.chunk_backing()?;
            self.chunk_cache.lock().flush(&backing)?;
        }
        if let Layout::Compact { dirty, .. } = &mut *self.layout.lock() {
            *dirty = false;
        }
        self.store_metadata()?;
        self.storage().flush()?;
        Ok(())
    }

    pub(crate) fn set_extent(&self, dims: ArrayShape) -> Result<(), DatasetError> {
        let chunk_shape = self.layout.lock().chunk_shape();
        let Some(chunk_shape) = chunk_shape else {
            if dims == self.dims() {
                return Ok(());
            }
            return Err(DatasetError::Unsupported(format!(
                "the extent of {} dataset `{}` cannot change",
                self.layout.lock().class(),
                self.name
            )));
        };

        let shrunk = {
            let mut extent = self.extent.write();
            let shrunk = std::iter::zip(extent.dims(), &dims).any(|(old, new)| new < old);
            extent.set_dims(dims.clone())?;
            shrunk
        };
        if shrunk {
            let outside = |scaled: &[u64]| {
                std::iter::zip(scaled, std::iter::zip(&chunk_shape, &dims))
                    .any(|(&s, (c, &d))| s * c.get() >= d)
            };
            let index = self.chunk_index()?;
            let mut cache = self.chunk_cache.lock();
            cache.discard(outside);
            for (scaled, _) in index.entries()? {
                if outside(scaled.as_slice()) {
                    index.remove(&scaled)?;
                }
            }

            // Elements of edge chunks beyond the new extent revert to the fill value
            let chunk_shape: Vec<u64> = chunk_shape.iter().map(|c| c.get()).collect();
            let element_size = self.data_type.size();
            let fill = |run: &Range<usize>| {
                self.fill_value
                    .fill_bytes(element_size, run.len() / element_size)
            };
            for (scaled, chunk) in cache.iter_mut() {
                for run in outside_extent_runs(scaled, &chunk_shape, &dims, element_size) {
                    chunk.data[run.clone()].copy_from_slice(&fill(&run));
                    chunk.dirty = true;
                }
            }
            for (scaled, address) in index.entries()? {
                if cache.contains(&scaled) {
                    continue;
                }
                for run in outside_extent_runs(&scaled, &chunk_shape, &dims, element_size) {
                    self.storage()
                        .set_partial(address + run.start as u64, &fill(&run))?;
                }
            }
        }
        log::debug!("dataset `{}` extent set to {dims:?}", self.name);
        *self.late_allocated.lock() = false;
        self.allocate_early()?;
        self.store_metadata()
    }
}

impl Drop for DatasetShared {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("failed to flush dataset `{}` on drop: {err}", self.name);
        }
    }
}

/// A handle to an open dataset.
#[derive(Clone, Debug)]
pub struct Dataset {
    shared: Arc<DatasetShared>,
}

impl Dataset {
    pub(crate) fn from_shared(shared: Arc<DatasetShared>) -> Self {
        Self { shared }
    }

    /// Return the name of the dataset.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Return the data type of the elements in the file.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.shared.data_type
    }

    /// Return the fill value record.
    #[must_use]
    pub fn fill_value(&self) -> &FillValueRecord {
        &self.shared.fill_value
    }

    /// Return the current extent.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.shared.extent.read().clone()
    }

    /// Return the current dimensions.
    #[must_use]
    pub fn dims(&self) -> ArrayShape {
        self.shared.dims()
    }

    /// Return a dataspace of the current extent selecting all elements.
    #[must_use]
    pub fn space(&self) -> Dataspace {
        Dataspace::new(self.extent())
    }

    /// Return the current layout.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.shared.layout.lock().clone()
    }

    /// Return the current metadata record.
    #[must_use]
    pub fn metadata(&self) -> DatasetMetadata {
        self.shared.metadata()
    }

    /// Returns true if `other` is a handle to the same open dataset.
    #[must_use]
    pub fn shares_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Resolve and validate the dataspaces of a transfer, returning the file and memory dataspaces and the element count.
    fn resolve_spaces<'a>(
        &self,
        mem_type: &DataType,
        mem_space: SpaceArg<'a>,
        file_space: SpaceArg<'a>,
        buf_len: usize,
    ) -> Result<(Cow<'a, Dataspace>, Cow<'a, Dataspace>, u64), DatasetError> {
        mem_type
            .validate()
            .map_err(|err| DatasetError::Argument(err.to_string()))?;
        let extent = self.extent();
        let file_space = match file_space {
            SpaceArg::All => Cow::Owned(Dataspace::new(extent.clone())),
            SpaceArg::Space(space) => Cow::Borrowed(space),
        };
        if !file_space.extent().is_set() {
            return Err(DatasetError::Argument(
                "the file dataspace extent is not set".to_string(),
            ));
        }
        if file_space.dims() != extent.dims() {
            return Err(DatasetError::Argument(format!(
                "file dataspace {:?} does not match the dataset extent {:?}",
                file_space.dims(),
                extent.dims()
            )));
        }
        let mem_space = match mem_space {
            SpaceArg::All => Cow::Owned(file_space.as_ref().clone()),
            SpaceArg::Space(space) => Cow::Borrowed(space),
        };
        if !mem_space.extent().is_set() {
            return Err(DatasetError::Argument(
                "the memory dataspace extent is not set".to_string(),
            ));
        }

        let nelmts = file_space.num_selected();
        if nelmts != mem_space.num_selected() {
            return Err(DatasetError::Argument(format!(
                "file selection of {nelmts} elements does not match memory selection of {} elements",
                mem_space.num_selected()
            )));
        }
        if !file_space.selection_valid() {
            return Err(SelectionError::OutOfBounds(file_space.dims().to_vec()).into());
        }
        if !mem_space.selection_valid() {
            return Err(SelectionError::OutOfBounds(mem_space.dims().to_vec()).into());
        }
        if nelmts > 0 {
            if buf_len == 0 {
                return Err(DatasetError::Argument(
                    "no buffer supplied for a non-empty selection".to_string(),
                ));
            }
            let required = mem_space.extent().num_elements() * mem_type.size() as u64;
            if (buf_len as u64) < required {
                return Err(DatasetError::Argument(format!(
                    "buffer of {buf_len} bytes is smaller than the memory extent of {required} bytes"
                )));
            }
        }
        Ok((file_space, mem_space, nelmts))
    }

    /// Read the elements selected in `file_space` into the positions selected in `mem_space` of `buf`, converting them to `mem_type`.
    ///
    /// `buf` must hold the whole memory extent in elements of `mem_type`.
    /// Elements of storage that has not been allocated are set to the fill value, or left untouched if the fill time is [`Never`](crate::fill_value::FillTime::Never).
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if
    ///  - the selections hold different element counts, an extent is not set, or `buf` is too small ([`DatasetError::Argument`]),
    ///  - a selection lies outside its extent ([`DatasetError::Selection`]),
    ///  - there is no conversion between the data types ([`DatasetError::Conversion`]), or
    ///  - the transfer fails.
    pub fn read(
        &self,
        mem_type: &DataType,
        mem_space: SpaceArg<'_>,
        file_space: SpaceArg<'_>,
        props: &TransferProperties,
        buf: &mut [u8],
    ) -> Result<(), DatasetError> {
        self.read_with_scratch(
            mem_type,
            mem_space,
            file_space,
            props,
            buf,
            &mut TransferScratch::default(),
        )
        .map(|_| ())
    }

    /// Read as [`read`](Dataset::read), reusing the conversion buffers of `scratch`.
    ///
    /// Returns a summary of the parallel transfer modes used.
    ///
    /// # Errors
    /// See [`read`](Dataset::read).
    pub fn read_with_scratch(
        &self,
        mem_type: &DataType,
        mem_space: SpaceArg<'_>,
        file_space: SpaceArg<'_>,
        props: &TransferProperties,
        buf: &mut [u8],
        scratch: &mut TransferScratch,
    ) -> Result<ModeSummary, DatasetError> {
        let (file_space, mem_space, nelmts) =
            self.resolve_spaces(mem_type, mem_space, file_space, buf.len())?;
        transfer::read(
            &self.shared,
            mem_type,
            props,
            nelmts,
            file_space,
            &mem_space,
            buf,
            scratch,
        )
    }

    /// Write the elements selected in `mem_space` of `buf`, of type `mem_type`, to the positions selected in `file_space`.
    ///
    /// Storage is allocated on the first write if it was not allocated earlier.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] under the same conditions as [`read`](Dataset::read), or if storage cannot be allocated.
    pub fn write(
        &self,
        mem_type: &DataType,
        mem_space: SpaceArg<'_>,
        file_space: SpaceArg<'_>,
        props: &TransferProperties,
        buf: &[u8],
    ) -> Result<(), DatasetError> {
        self.write_with_scratch(
            mem_type,
            mem_space,
            file_space,
            props,
            buf,
            &mut TransferScratch::default(),
        )
        .map(|_| ())
    }

    /// Write as [`write`](Dataset::write), reusing the conversion buffers of `scratch`.
    ///
    /// Returns a summary of the parallel transfer modes used.
    ///
    /// # Errors
    /// See [`write`](Dataset::write).
    pub fn write_with_scratch(
        &self,
        mem_type: &DataType,
        mem_space: SpaceArg<'_>,
        file_space: SpaceArg<'_>,
        props: &TransferProperties,
        buf: &[u8],
        scratch: &mut TransferScratch,
    ) -> Result<ModeSummary, DatasetError> {
        let (file_space, mem_space, nelmts) =
            self.resolve_spaces(mem_type, mem_space, file_space, buf.len())?;
        transfer::write(
            &self.shared,
            mem_type,
            props,
            nelmts,
            file_space,
            &mem_space,
            buf,
            scratch,
        )
    }

    fn selected_elements(&self, file_space: SpaceArg<'_>) -> u64 {
        match file_space {
            SpaceArg::All => self.shared.num_elements(),
            SpaceArg::Space(space) => space.num_selected(),
        }
    }

    fn check_element_size<T>(mem_type: &DataType) -> Result<(), DatasetError> {
        if size_of::<T>() == mem_type.size() {
            Ok(())
        } else {
            Err(DatasetError::Argument(format!(
                "element size {} does not match the memory data type size {}",
                size_of::<T>(),
                mem_type.size()
            )))
        }
    }

    /// Read the elements selected in `file_space` as a vector of `T` in selection order.
    ///
    /// # Errors
    /// Returns [`DatasetError::Argument`] if the size of `T` does not match `mem_type`, or any error of [`read`](Dataset::read).
    ///
    /// # Panics
    /// Panics if the number of selected elements exceeds [`usize::MAX`].
    pub fn read_elements<T: bytemuck::Pod>(
        &self,
        mem_type: &DataType,
        file_space: SpaceArg<'_>,
    ) -> Result<Vec<T>, DatasetError> {
        Self::check_element_size::<T>(mem_type)?;
        let nelmts = self.selected_elements(file_space);
        let mem_space = Dataspace::new_simple(vec![nelmts]);
        let mut elements = bytemuck::zeroed_vec::<T>(usize::try_from(nelmts).unwrap());
        self.read(
            mem_type,
            SpaceArg::Space(&mem_space),
            file_space,
            &TransferProperties::default(),
            bytemuck::cast_slice_mut(&mut elements),
        )?;
        Ok(elements)
    }

    /// Write `elements` to the positions selected in `file_space`, in selection order.
    ///
    /// # Errors
    /// Returns [`DatasetError::Argument`] if the size of `T` does not match `mem_type` or the number of elements does not match the selection, or any error of [`write`](Dataset::write).
    pub fn write_elements<T: bytemuck::Pod>(
        &self,
        mem_type: &DataType,
        file_space: SpaceArg<'_>,
        elements: &[T],
    ) -> Result<(), DatasetError> {
        Self::check_element_size::<T>(mem_type)?;
        let nelmts = self.selected_elements(file_space);
        if elements.len() as u64 != nelmts {
            return Err(DatasetError::Argument(format!(
                "{} elements supplied for a selection of {nelmts} elements",
                elements.len()
            )));
        }
        let mem_space = Dataspace::new_simple(vec![nelmts]);
        self.write(
            mem_type,
            SpaceArg::Space(&mem_space),
            file_space,
            &TransferProperties::default(),
            bytemuck::cast_slice(elements),
        )
    }

    /// Change the extent of a chunked dataset to `dims`.
    ///
    /// Chunks entirely outside a reduced extent are discarded.
    /// With early allocation, chunks of an enlarged extent are allocated and filled.
    ///
    /// # Errors
    /// Returns [`DatasetError::Extent`] if `dims` exceeds the maximum dimensions or has the wrong rank, and [`DatasetError::Unsupported`] if the dataset is not chunked.
    pub fn set_extent(&self, dims: impl Into<ArrayShape>) -> Result<(), DatasetError> {
        self.shared.set_extent(dims.into())
    }

    /// Write back cached raw data and store the metadata record.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the storage cannot be written.
    pub fn flush(&self) -> Result<(), DatasetError> {
        self.shared.flush()
    }

    /// Flush and close this handle.
    ///
    /// The shared dataset stays open while other handles exist.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the flush fails.
    pub fn close(self) -> Result<(), DatasetError> {
        self.shared.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_extent_runs_edge_chunks() {
        assert_eq!(outside_extent_runs(&[1, 1], &[2, 3], &[3, 4], 1), [1..6]);
        assert_eq!(outside_extent_runs(&[0, 1], &[2, 3], &[3, 4], 1), [1..3, 4..6]);
        assert!(outside_extent_runs(&[0, 0], &[2, 3], &[3, 4], 1).is_empty());
        assert_eq!(outside_extent_runs(&[1], &[4], &[5], 4), [4..16]);
        assert_eq!(outside_extent_runs(&[1], &[4], &[4], 4), [0..16]);
    }
}
