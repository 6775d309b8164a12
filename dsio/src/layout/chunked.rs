use dsio_dataspace::{
    sequence::{for_each_segment, vector_copy},
    SequenceCursor,
};
use dsio_storage::byte_range::ByteOffset;

use crate::{
    transfer::{IoInfo, StorageLocation},
    DatasetError,
};

use super::LayoutIoTraits;

/// The I/O operations of a chunked layout.
///
/// File sequences are relative to the start of the chunk.
/// A chunk with an address is accessed directly in storage; a chunk without one is accessed through the chunk cache of the dataset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkedIo;

struct ChunkTarget<'a> {
    scaled: &'a [u64],
    address: Option<ByteOffset>,
    full_overwrite: bool,
}

fn chunk_target<'a>(io: &'a IoInfo) -> Result<ChunkTarget<'a>, DatasetError> {
    match io.location() {
        StorageLocation::Chunk {
            scaled,
            address,
            full_overwrite,
            ..
        } => Ok(ChunkTarget {
            scaled,
            address: *address,
            full_overwrite: *full_overwrite,
        }),
        location => Err(DatasetError::Unsupported(format!(
            "chunked I/O at {location:?}"
        ))),
    }
}

impl LayoutIoTraits for ChunkedIo {
    fn readvv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &mut [u8],
    ) -> Result<u64, DatasetError> {
        let target = chunk_target(io)?;
        let dataset = io.dataset();
        if let Some(address) = target.address {
            let storage = dataset.storage();
            return for_each_segment(dst, src, |mem_offset, chunk_offset, len| {
                let mem_offset = usize::try_from(mem_offset).unwrap();
                let len = usize::try_from(len).unwrap();
                storage.read_into(address + chunk_offset, &mut buf[mem_offset..mem_offset + len])?;
                Ok::<_, DatasetError>(())
            });
        }

        let backing = dataset.chunk_backing()?;
        let mut cache = dataset.chunk_cache.lock();
        let chunk = cache.get_or_insert_with(target.scaled, &backing, || {
            match backing.index.get(target.scaled)? {
                Some(address) => backing.load(address),
                None => Ok(dataset.fill_chunk(false)),
            }
        })?;
        Ok(vector_copy(buf, dst, &chunk.data, src))
    }

    fn writevv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &[u8],
    ) -> Result<u64, DatasetError> {
        let target = chunk_target(io)?;
        let dataset = io.dataset();
        if let Some(address) = target.address {
            let storage = dataset.storage();
            let mut regions = Vec::with_capacity(dst.len());
            let bytes = for_each_segment(dst, src, |chunk_offset, mem_offset, len| {
                let mem_offset = usize::try_from(mem_offset).unwrap();
                let len = usize::try_from(len).unwrap();
                regions.push((address + chunk_offset, &buf[mem_offset..mem_offset + len]));
                Ok::<_, DatasetError>(())
            })?;
            storage.set_partial_many(Box::new(regions.into_iter()))?;
            return Ok(bytes);
        }

        let backing = dataset.chunk_backing()?;
        let mut cache = dataset.chunk_cache.lock();
        let chunk = cache.get_or_insert_with(target.scaled, &backing, || {
            match backing.index.get(target.scaled)? {
                Some(address) if !target.full_overwrite => backing.load(address),
                _ => Ok(dataset.fill_chunk(target.full_overwrite)),
            }
        })?;
        chunk.dirty = true;
        Ok(vector_copy(&mut chunk.data, dst, buf, src))
    }
}
