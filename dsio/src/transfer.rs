//! The strip-mined, type-converting transfer engine.
//!
//! A transfer moves the elements selected in a file dataspace to or from the elements selected in a memory dataspace.
//! If the file and memory data types are identical, the selected elements are moved directly by the layout.
//! Otherwise the transfer is strip-mined through a type conversion buffer of at most [`TransferProperties::buffer_size`] bytes:
//!
//! ```text
//! read:  gather (file) -> [gather background (memory)] -> convert -> scatter (memory)
//! write: gather (memory) -> [gather background (file)] -> convert -> scatter (file)
//! ```
//!
//! Chunked datasets are transferred chunk by chunk in ascending chunk index order.

use std::{borrow::Cow, num::NonZeroU64};

use dsio_dataspace::{sequence::vector_copy, Dataspace, SelectionIter, SeqListFlags, SequenceCursor};
use dsio_storage::byte_range::ByteOffset;

use crate::{
    chunk_map::ChunkMap,
    dataset::DatasetShared,
    datatype::{ConversionPath, DataType},
    fill_value::FillValueRecord,
    layout::{
        ChunkedIo, CompactIo, ContiguousIo, ExternalFileList, ExternalIo, Layout, LayoutIoTraits,
    },
    parallel::{IoMode, ModeArbiter, ModeSummary},
    properties::{TransferProperties, TransferScratch},
    DatasetError,
};

/// Where the raw data of one transfer step is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageLocation {
    /// The allocated extent of a contiguous dataset.
    Contiguous {
        /// The address of the raw data.
        address: ByteOffset,
        /// The size of the raw data in bytes.
        size: u64,
    },
    /// One chunk of a chunked dataset.
    Chunk {
        /// The linear index of the chunk in the chunk grid.
        index: u64,
        /// The scaled coordinates of the chunk.
        scaled: Vec<u64>,
        /// The address of the chunk, or [`None`] if the chunk is accessed through the chunk cache.
        address: Option<ByteOffset>,
        /// Whether the transfer overwrites every element of the chunk.
        full_overwrite: bool,
    },
    /// The buffer of a compact dataset.
    Compact,
    /// The external files of an external dataset.
    External(ExternalFileList),
}

/// The state of one transfer step passed to the [`LayoutIoTraits`].
pub struct IoInfo<'a> {
    dataset: &'a DatasetShared,
    props: &'a TransferProperties,
    location: StorageLocation,
    ops: &'a dyn LayoutIoTraits,
    mode: IoMode,
}

impl<'a> IoInfo<'a> {
    pub(crate) fn new(
        dataset: &'a DatasetShared,
        props: &'a TransferProperties,
        location: StorageLocation,
        ops: &'a dyn LayoutIoTraits,
        mode: IoMode,
    ) -> Self {
        Self {
            dataset,
            props,
            location,
            ops,
            mode,
        }
    }

    pub(crate) fn dataset(&self) -> &'a DatasetShared {
        self.dataset
    }

    /// Return the transfer properties.
    #[must_use]
    pub fn props(&self) -> &TransferProperties {
        self.props
    }

    /// Return the storage location of this step.
    #[must_use]
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Return the layout operations of this step.
    #[must_use]
    pub fn ops(&self) -> &dyn LayoutIoTraits {
        self.ops
    }

    /// Return the parallel transfer mode of this step.
    #[must_use]
    pub fn mode(&self) -> IoMode {
        self.mode
    }
}

/// The resolved type conversion of a transfer.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    path: ConversionPath,
    src_type_size: usize,
    dst_type_size: usize,
    max_type_size: usize,
}

impl TypeInfo {
    /// Resolve the conversion from `src` to `dst`.
    ///
    /// # Errors
    /// Returns [`DatasetError::Conversion`] if there is no conversion path between the types.
    pub fn new(src: &DataType, dst: &DataType) -> Result<Self, DatasetError> {
        let path = ConversionPath::new(src, dst)?;
        let src_type_size = src.size();
        let dst_type_size = dst.size();
        Ok(Self {
            path,
            src_type_size,
            dst_type_size,
            max_type_size: std::cmp::max(src_type_size, dst_type_size),
        })
    }

    /// Returns true if the conversion does nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.path.is_noop()
    }

    /// Returns true if the conversion requires a background buffer.
    #[must_use]
    pub fn needs_background(&self) -> bool {
        self.path.needs_background()
    }

    /// Return the source element size in bytes.
    #[must_use]
    pub fn src_type_size(&self) -> usize {
        self.src_type_size
    }

    /// Return the destination element size in bytes.
    #[must_use]
    pub fn dst_type_size(&self) -> usize {
        self.dst_type_size
    }

    /// Return the larger of the source and destination element sizes.
    #[must_use]
    pub fn max_type_size(&self) -> usize {
        self.max_type_size
    }

    /// Return the number of elements converted per strip of a transfer of `nelmts` elements through a buffer of `buffer_size` bytes.
    ///
    /// At least one element is converted per strip, even if it does not fit in the buffer.
    #[must_use]
    pub fn request_nelmts(&self, buffer_size: usize, nelmts: u64) -> u64 {
        let fit = (buffer_size / self.max_type_size.max(1)).max(1) as u64;
        std::cmp::min(fit, nelmts)
    }
}

fn ensure_len(buf: &mut Vec<u8>, len: usize) -> Result<(), DatasetError> {
    if buf.len() < len {
        buf.clear();
        buf.try_reserve_exact(len)?;
        buf.resize(len, 0);
    }
    Ok(())
}

fn check_count(expected: u64, actual: u64) -> Result<(), DatasetError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DatasetError::ShortTransfer { expected, actual })
    }
}

/// Gather up to `nelmts` elements selected by `iter` from the file into the packed buffer `tconv`.
fn gather_file(
    io: &IoInfo,
    iter: &mut SelectionIter,
    nelmts: u64,
    tconv: &mut [u8],
) -> Result<u64, DatasetError> {
    let element_size = iter.element_size();
    let mut done = 0;
    while done < nelmts && iter.elements_left() > 0 {
        let (seqs, n) =
            iter.get_seq_list(SeqListFlags::NONE, io.props().max_sequences(), nelmts - done);
        let mut file_cursor = SequenceCursor::new(seqs);
        let mut mem_cursor = SequenceCursor::single(done * element_size, n * element_size);
        let bytes = io.ops().readvv(io, &mut mem_cursor, &mut file_cursor, tconv)?;
        check_count(n * element_size, bytes)?;
        done += n;
    }
    Ok(done)
}

/// Scatter up to `nelmts` packed elements of `tconv` to the file positions selected by `iter`.
fn scatter_file(
    io: &IoInfo,
    iter: &mut SelectionIter,
    nelmts: u64,
    tconv: &[u8],
) -> Result<u64, DatasetError> {
    let element_size = iter.element_size();
    let mut done = 0;
    while done < nelmts && iter.elements_left() > 0 {
        let (seqs, n) =
            iter.get_seq_list(SeqListFlags::NONE, io.props().max_sequences(), nelmts - done);
        let mut file_cursor = SequenceCursor::new(seqs);
        let mut mem_cursor = SequenceCursor::single(done * element_size, n * element_size);
        let bytes = io.ops().writevv(io, &mut file_cursor, &mut mem_cursor, tconv)?;
        check_count(n * element_size, bytes)?;
        done += n;
    }
    Ok(done)
}

/// Gather up to `nelmts` elements selected by `iter` from the memory buffer `buf` into the packed buffer `tconv`.
fn gather_mem(
    iter: &mut SelectionIter,
    nelmts: u64,
    max_sequences: usize,
    buf: &[u8],
    tconv: &mut [u8],
) -> Result<u64, DatasetError> {
    let element_size = iter.element_size();
    let mut done = 0;
    while done < nelmts && iter.elements_left() > 0 {
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, max_sequences, nelmts - done);
        let mut mem_cursor = SequenceCursor::new(seqs);
        let mut tconv_cursor = SequenceCursor::single(done * element_size, n * element_size);
        let bytes = vector_copy(tconv, &mut tconv_cursor, buf, &mut mem_cursor);
        check_count(n * element_size, bytes)?;
        done += n;
    }
    Ok(done)
}

/// Scatter up to `nelmts` packed elements of `tconv` to the positions of the memory buffer `buf` selected by `iter`.
fn scatter_mem(
    iter: &mut SelectionIter,
    nelmts: u64,
    max_sequences: usize,
    tconv: &[u8],
    buf: &mut [u8],
) -> Result<u64, DatasetError> {
    let element_size = iter.element_size();
    let mut done = 0;
    while done < nelmts && iter.elements_left() > 0 {
        let (seqs, n) = iter.get_seq_list(SeqListFlags::NONE, max_sequences, nelmts - done);
        let mut mem_cursor = SequenceCursor::new(seqs);
        let mut tconv_cursor = SequenceCursor::single(done * element_size, n * element_size);
        let bytes = vector_copy(buf, &mut mem_cursor, tconv, &mut tconv_cursor);
        check_count(n * element_size, bytes)?;
        done += n;
    }
    Ok(done)
}

/// Read `nelmts` elements from one storage location.
pub(crate) fn read_selection(
    io: &IoInfo,
    type_info: &TypeInfo,
    nelmts: u64,
    file_space: &Dataspace,
    mem_space: &Dataspace,
    buf: &mut [u8],
    scratch: &mut TransferScratch,
) -> Result<(), DatasetError> {
    if nelmts == 0 {
        return Ok(());
    }
    if type_info.is_noop() {
        return io.ops().read(
            io,
            type_info.src_type_size(),
            nelmts,
            file_space,
            mem_space,
            buf,
        );
    }

    let max_sequences = io.props().max_sequences();
    let request_nelmts = type_info.request_nelmts(io.props().buffer_size(), nelmts);
    let strip_len = usize::try_from(request_nelmts).unwrap() * type_info.max_type_size();
    ensure_len(&mut scratch.tconv, strip_len)?;
    if type_info.needs_background() {
        ensure_len(
            &mut scratch.bkg,
            usize::try_from(request_nelmts).unwrap() * type_info.dst_type_size(),
        )?;
    }
    log::debug!("strip-mined read of {nelmts} elements, {request_nelmts} per strip");

    let mut file_iter = file_space.iter(type_info.src_type_size());
    let mut mem_iter = mem_space.iter(type_info.dst_type_size());
    let mut bkg_iter = mem_space.iter(type_info.dst_type_size());
    let mut remaining = nelmts;
    while remaining > 0 {
        let n = std::cmp::min(request_nelmts, remaining);
        let tconv = &mut scratch.tconv[..strip_len];
        check_count(n, gather_file(io, &mut file_iter, n, tconv)?)?;
        let bkg = if type_info.needs_background() {
            let bkg = &mut scratch.bkg[..];
            check_count(n, gather_mem(&mut bkg_iter, n, max_sequences, buf, bkg)?)?;
            Some(&*bkg)
        } else {
            None
        };
        type_info
            .path
            .convert(usize::try_from(n).unwrap(), tconv, bkg)?;
        check_count(n, scatter_mem(&mut mem_iter, n, max_sequences, tconv, buf)?)?;
        remaining -= n;
    }
    Ok(())
}

/// Write `nelmts` elements to one storage location.
pub(crate) fn write_selection(
    io: &IoInfo,
    type_info: &TypeInfo,
    nelmts: u64,
    file_space: &Dataspace,
    mem_space: &Dataspace,
    buf: &[u8],
    scratch: &mut TransferScratch,
) -> Result<(), DatasetError> {
    if nelmts == 0 {
        return Ok(());
    }
    if type_info.is_noop() {
        return io.ops().write(
            io,
            type_info.src_type_size(),
            nelmts,
            file_space,
            mem_space,
            buf,
        );
    }

    let max_sequences = io.props().max_sequences();
    let request_nelmts = type_info.request_nelmts(io.props().buffer_size(), nelmts);
    let strip_len = usize::try_from(request_nelmts).unwrap() * type_info.max_type_size();
    ensure_len(&mut scratch.tconv, strip_len)?;
    if type_info.needs_background() {
        ensure_len(
            &mut scratch.bkg,
            usize::try_from(request_nelmts).unwrap() * type_info.dst_type_size(),
        )?;
    }
    log::debug!("strip-mined write of {nelmts} elements, {request_nelmts} per strip");

    let mut mem_iter = mem_space.iter(type_info.src_type_size());
    let mut file_iter = file_space.iter(type_info.dst_type_size());
    let mut bkg_iter = file_space.iter(type_info.dst_type_size());
    let mut remaining = nelmts;
    while remaining > 0 {
        let n = std::cmp::min(request_nelmts, remaining);
        let tconv = &mut scratch.tconv[..strip_len];
        check_count(n, gather_mem(&mut mem_iter, n, max_sequences, buf, tconv)?)?;
        let bkg = if type_info.needs_background() {
            let bkg = &mut scratch.bkg[..];
            check_count(n, gather_file(io, &mut bkg_iter, n, bkg)?)?;
            Some(&*bkg)
        } else {
            None
        };
        type_info
            .path
            .convert(usize::try_from(n).unwrap(), tconv, bkg)?;
        check_count(n, scatter_file(io, &mut file_iter, n, tconv)?)?;
        remaining -= n;
    }
    Ok(())
}

/// Write the fill value, converted from `file_type` to `mem_type`, to every element selected in `mem_space`.
///
/// The buffer is left untouched if the fill policy does not write fill values.
pub(crate) fn fill_selection(
    fill_value: &FillValueRecord,
    file_type: &DataType,
    mem_type: &DataType,
    mem_space: &Dataspace,
    max_sequences: usize,
    buf: &mut [u8],
) -> Result<(), DatasetError> {
    if !fill_value.writes_fill() || mem_space.num_selected() == 0 {
        return Ok(());
    }
    let path = ConversionPath::new(file_type, mem_type)?;
    let mem_size = mem_type.size();
    let mut element = fill_value.fill_bytes(file_type.size(), 1);
    element.resize(std::cmp::max(file_type.size(), mem_size), 0);
    let bkg = vec![0; mem_size];
    path.convert(1, &mut element, path.needs_background().then_some(&bkg[..]))?;
    element.truncate(mem_size);

    let mut iter = mem_space.iter(mem_size);
    while iter.elements_left() > 0 {
        let (seqs, _) = iter.get_seq_list(SeqListFlags::NONE, max_sequences, u64::MAX);
        for seq in seqs {
            let start = usize::try_from(seq.offset).unwrap();
            let end = usize::try_from(seq.end()).unwrap();
            for dst in buf[start..end].chunks_exact_mut(mem_size) {
                dst.copy_from_slice(&element);
            }
        }
    }
    Ok(())
}

/// The storage route of a transfer, resolved from the dataset layout.
enum Route {
    Contiguous {
        address: Option<ByteOffset>,
        size: u64,
    },
    Chunked(Vec<NonZeroU64>),
    Compact,
    External(ExternalFileList),
}

impl Route {
    fn of(layout: &Layout) -> Self {
        match layout {
            Layout::Contiguous { address, size } => Self::Contiguous {
                address: *address,
                size: *size,
            },
            Layout::Chunked { .. } => Self::Chunked(layout.chunk_shape().unwrap_or_default()),
            Layout::Compact { .. } => Self::Compact,
            Layout::External { efl } => Self::External(efl.clone()),
        }
    }
}

/// Read the `nelmts` elements selected in `file_space` of `dataset` into `buf`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read(
    dataset: &DatasetShared,
    mem_type: &DataType,
    props: &TransferProperties,
    nelmts: u64,
    file_space: Cow<'_, Dataspace>,
    mem_space: &Dataspace,
    buf: &mut [u8],
    scratch: &mut TransferScratch,
) -> Result<ModeSummary, DatasetError> {
    let type_info = TypeInfo::new(dataset.data_type(), mem_type)?;
    let mut arbiter = ModeArbiter::new(dataset.communicator(), props.transfer_mode());
    if nelmts == 0 && !arbiter.is_collective() {
        return Ok(arbiter.finish());
    }
    if type_info.is_noop() {
        log::debug!("read of {nelmts} elements without type conversion");
    }

    let route = Route::of(&dataset.layout.lock());
    let (ops, location): (&dyn LayoutIoTraits, StorageLocation) = match route {
        Route::Contiguous {
            address: None, ..
        } => {
            fill_selection(
                dataset.fill_value(),
                dataset.data_type(),
                mem_type,
                mem_space,
                props.max_sequences(),
                buf,
            )?;
            arbiter.collective_slot()?;
            return Ok(arbiter.finish());
        }
        Route::Contiguous {
            address: Some(address),
            size,
        } => (&ContiguousIo, StorageLocation::Contiguous { address, size }),
        Route::Compact => (&CompactIo, StorageLocation::Compact),
        Route::External(efl) => (&ExternalIo, StorageLocation::External(efl)),
        Route::Chunked(chunk_shape) => {
            return read_chunked(
                dataset,
                &type_info,
                props,
                &chunk_shape,
                file_space,
                mem_space,
                buf,
                scratch,
                arbiter,
            );
        }
    };
    let io = IoInfo::new(dataset, props, location, ops, arbiter.mode());
    read_selection(&io, &type_info, nelmts, &file_space, mem_space, buf, scratch)?;
    arbiter.collective_slot()?;
    Ok(arbiter.finish())
}

#[allow(clippy::too_many_arguments)]
fn read_chunked(
    dataset: &DatasetShared,
    type_info: &TypeInfo,
    props: &TransferProperties,
    chunk_shape: &[NonZeroU64],
    file_space: Cow<'_, Dataspace>,
    mem_space: &Dataspace,
    buf: &mut [u8],
    scratch: &mut TransferScratch,
    mut arbiter: ModeArbiter,
) -> Result<ModeSummary, DatasetError> {
    let dims = dataset.dims();
    let mut file_space = file_space.into_owned();
    let map = ChunkMap::build(&dims, chunk_shape, &mut file_space, mem_space)?;
    arbiter.vote(map.len() as u64)?;
    let cached = dataset.chunk_cache_enabled();
    for info in map.iter() {
        let mode = arbiter.begin_chunk(info.file_is_monotone());
        if dataset.chunk_allocated(info.scaled())? {
            let address = if cached {
                None
            } else {
                dataset.chunk_address(info.scaled())?
            };
            let location = StorageLocation::Chunk {
                index: info.index(),
                scaled: info.scaled().to_vec(),
                address,
                full_overwrite: false,
            };
            let io = IoInfo::new(dataset, props, location, &ChunkedIo, mode);
            read_selection(
                &io,
                type_info,
                info.num_points(),
                info.file_space(),
                info.mem_space(),
                buf,
                scratch,
            )?;
        } else {
            let mem_type = type_info.path.dst();
            fill_selection(
                dataset.fill_value(),
                dataset.data_type(),
                mem_type,
                info.mem_space(),
                props.max_sequences(),
                buf,
            )?;
        }
        arbiter.end_chunk()?;
    }
    Ok(arbiter.finish())
}

/// Write the `nelmts` elements selected in `mem_space` of `buf` to `file_space` of `dataset`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn write(
    dataset: &DatasetShared,
    mem_type: &DataType,
    props: &TransferProperties,
    nelmts: u64,
    file_space: Cow<'_, Dataspace>,
    mem_space: &Dataspace,
    buf: &[u8],
    scratch: &mut TransferScratch,
) -> Result<ModeSummary, DatasetError> {
    let type_info = TypeInfo::new(mem_type, dataset.data_type())?;
    let mut arbiter = ModeArbiter::new(dataset.communicator(), props.transfer_mode());
    if nelmts == 0 && !arbiter.is_collective() {
        return Ok(arbiter.finish());
    }
    if type_info.is_noop() {
        log::debug!("write of {nelmts} elements without type conversion");
    }

    let route = Route::of(&dataset.layout.lock());
    let (ops, location): (&dyn LayoutIoTraits, StorageLocation) = match route {
        Route::Contiguous { size, .. } => {
            let full_overwrite = !dataset.data_type().is_variable_length()
                && nelmts == dataset.num_elements();
            let address = if nelmts > 0 {
                dataset.allocate_contiguous(full_overwrite)?
            } else {
                0
            };
            (&ContiguousIo, StorageLocation::Contiguous { address, size })
        }
        Route::Compact => (&CompactIo, StorageLocation::Compact),
        Route::External(efl) => (&ExternalIo, StorageLocation::External(efl)),
        Route::Chunked(chunk_shape) => {
            return write_chunked(
                dataset,
                &type_info,
                props,
                &chunk_shape,
                file_space,
                mem_space,
                buf,
                scratch,
                arbiter,
            );
        }
    };
    let io = IoInfo::new(dataset, props, location, ops, arbiter.mode());
    write_selection(&io, &type_info, nelmts, &file_space, mem_space, buf, scratch)?;
    arbiter.collective_slot()?;
    Ok(arbiter.finish())
}

#[allow(clippy::too_many_arguments)]
fn write_chunked(
    dataset: &DatasetShared,
    type_info: &TypeInfo,
    props: &TransferProperties,
    chunk_shape: &[NonZeroU64],
    file_space: Cow<'_, Dataspace>,
    mem_space: &Dataspace,
    buf: &[u8],
    scratch: &mut TransferScratch,
    mut arbiter: ModeArbiter,
) -> Result<ModeSummary, DatasetError> {
    let dims = dataset.dims();
    let mut file_space = file_space.into_owned();
    let map = ChunkMap::build(&dims, chunk_shape, &mut file_space, mem_space)?;
    arbiter.vote(map.len() as u64)?;
    if !map.is_empty() {
        dataset.allocate_late()?;
    }
    let cached = dataset.chunk_cache_enabled();
    let chunk_elements: u64 = chunk_shape.iter().map(|c| c.get()).product();
    let vlen = dataset.data_type().is_variable_length();
    for info in map.iter() {
        let mode = arbiter.begin_chunk(info.file_is_monotone());
        let full_overwrite = !vlen && info.num_points() == chunk_elements;
        let address = if cached {
            None
        } else {
            Some(dataset.allocate_chunk(info.scaled(), full_overwrite)?)
        };
        let location = StorageLocation::Chunk {
            index: info.index(),
            scaled: info.scaled().to_vec(),
            address,
            full_overwrite,
        };
        let io = IoInfo::new(dataset, props, location, &ChunkedIo, mode);
        write_selection(
            &io,
            type_info,
            info.num_points(),
            info.file_space(),
            info.mem_space(),
            buf,
            scratch,
        )?;
        arbiter.end_chunk()?;
    }
    Ok(arbiter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_nelmts() {
        let type_info = TypeInfo::new(&DataType::int16(), &DataType::float64()).unwrap();
        assert!(!type_info.is_noop());
        assert_eq!(type_info.max_type_size(), 8);
        assert_eq!(type_info.request_nelmts(64, 100), 8);
        assert_eq!(type_info.request_nelmts(64, 5), 5);
        assert_eq!(type_info.request_nelmts(3, 100), 1);
        assert_eq!(type_info.request_nelmts(0, 100), 1);
    }

    #[test]
    fn fill_selection_converts_and_scatters() {
        let fill = FillValueRecord {
            value: Some(7i16.into()),
            ..Default::default()
        };
        let mut space = Dataspace::new_simple(vec![4]);
        space.select_points(&[[1u64], [3]]).unwrap();
        let mut buf = vec![0u8; 16];
        fill_selection(
            &fill,
            &DataType::int16(),
            &DataType::float32(),
            &space,
            8,
            &mut buf,
        )
        .unwrap();
        let values: Vec<f32> = buf
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(values, [0.0, 7.0, 0.0, 7.0]);

        // no fill is written when none is defined and the fill time is `IfSet`
        let mut buf = vec![1u8; 16];
        fill_selection(
            &FillValueRecord::default(),
            &DataType::int16(),
            &DataType::float32(),
            &space,
            8,
            &mut buf,
        )
        .unwrap();
        assert_eq!(buf, vec![1u8; 16]);
    }
}
