use dsio_dataspace::{sequence::for_each_segment, SequenceCursor};
use dsio_storage::{byte_range::ByteOffset, ReadableWritableStorageTraits, StorageError};

use crate::{
    transfer::{IoInfo, StorageLocation},
    DatasetError,
};

use super::LayoutIoTraits;

/// The I/O operations of a contiguous layout.
///
/// Small accesses go through the sieve buffer of the dataset, a window of the raw data that is read once and written back when it is replaced or flushed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContiguousIo;

fn contiguous_location(io: &IoInfo) -> Result<(ByteOffset, u64), DatasetError> {
    match io.location() {
        StorageLocation::Contiguous { address, size } => Ok((*address, *size)),
        location => Err(DatasetError::Unsupported(format!(
            "contiguous I/O at {location:?}"
        ))),
    }
}

fn check_bounds(offset: u64, len: u64, size: u64) -> Result<(), DatasetError> {
    if offset + len > size {
        Err(DatasetError::Argument(format!(
            "contiguous access of {len} bytes at {offset} exceeds the raw data size {size}"
        )))
    } else {
        Ok(())
    }
}

impl LayoutIoTraits for ContiguousIo {
    fn readvv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &mut [u8],
    ) -> Result<u64, DatasetError> {
        let (address, size) = contiguous_location(io)?;
        let dataset = io.dataset();
        let storage = dataset.storage();
        let mut sieve = dataset.sieve.lock();
        for_each_segment(dst, src, |mem_offset, file_offset, len| {
            check_bounds(file_offset, len, size)?;
            let mem_offset = usize::try_from(mem_offset).unwrap();
            let len = usize::try_from(len).unwrap();
            sieve.read(
                storage,
                address..address + size,
                address + file_offset,
                &mut buf[mem_offset..mem_offset + len],
            )?;
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
        let (address, size) = contiguous_location(io)?;
        let dataset = io.dataset();
        let storage = dataset.storage();
        let mut sieve = dataset.sieve.lock();
        for_each_segment(dst, src, |file_offset, mem_offset, len| {
            check_bounds(file_offset, len, size)?;
            let mem_offset = usize::try_from(mem_offset).unwrap();
            let len = usize::try_from(len).unwrap();
            sieve.write(
                storage,
                address..address + size,
                address + file_offset,
                &buf[mem_offset..mem_offset + len],
            )?;
            Ok::<_, DatasetError>(())
        })
    }
}

/// A read-through, write-back window over the raw data of a contiguous dataset.
#[derive(Debug, Default)]
pub(crate) struct SieveBuffer {
    address: ByteOffset,
    data: Vec<u8>,
    dirty: bool,
    max_size: usize,
}

impl SieveBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    fn end(&self) -> ByteOffset {
        self.address + self.data.len() as u64
    }

    fn contains(&self, address: ByteOffset, len: usize) -> bool {
        !self.data.is_empty() && address >= self.address && address + len as u64 <= self.end()
    }

    fn overlaps(&self, address: ByteOffset, len: usize) -> bool {
        !self.data.is_empty() && address < self.end() && address + len as u64 > self.address
    }

    /// Write back the window if it is dirty.
    pub(crate) fn flush(
        &mut self,
        storage: &dyn ReadableWritableStorageTraits,
    ) -> Result<(), StorageError> {
        if self.dirty {
            log::debug!(
                "flushing sieve buffer of {} bytes at {}",
                self.data.len(),
                self.address
            );
            storage.set_partial(self.address, &self.data)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Move the window to start at `address`, clipped to `extent`.
    fn load(
        &mut self,
        storage: &dyn ReadableWritableStorageTraits,
        extent: std::ops::Range<ByteOffset>,
        address: ByteOffset,
    ) -> Result<(), StorageError> {
        self.flush(storage)?;
        let end = std::cmp::min(address + self.max_size as u64, extent.end);
        self.data.clear();
        self.data.resize(usize::try_from(end - address).unwrap(), 0);
        storage.read_into(address, &mut self.data)?;
        self.address = address;
        Ok(())
    }

    /// Returns true if an access of `len` bytes bypasses the window.
    fn bypasses(&self, len: usize) -> bool {
        len >= self.max_size
    }

    pub(crate) fn read(
        &mut self,
        storage: &dyn ReadableWritableStorageTraits,
        extent: std::ops::Range<ByteOffset>,
        address: ByteOffset,
        out: &mut [u8],
    ) -> Result<(), StorageError> {
        if self.bypasses(out.len()) {
            if self.overlaps(address, out.len()) {
                self.flush(storage)?;
            }
            return storage.read_into(address, out);
        }
        if !self.contains(address, out.len()) {
            self.load(storage, extent, address)?;
        }
        let start = usize::try_from(address - self.address).unwrap();
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }

    pub(crate) fn write(
        &mut self,
        storage: &dyn ReadableWritableStorageTraits,
        extent: std::ops::Range<ByteOffset>,
        address: ByteOffset,
        input: &[u8],
    ) -> Result<(), StorageError> {
        if self.bypasses(input.len()) {
            if self.overlaps(address, input.len()) {
                self.flush(storage)?;
                self.data.clear();
            }
            return storage.set_partial(address, input);
        }
        if !self.contains(address, input.len()) {
            self.load(storage, extent, address)?;
        }
        let start = usize::try_from(address - self.address).unwrap();
        self.data[start..start + input.len()].copy_from_slice(input);
        self.dirty = true;
        Ok(())
    }
}
