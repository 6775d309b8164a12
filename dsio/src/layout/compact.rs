use dsio_dataspace::{sequence::vector_copy, SequenceCursor};

use crate::{transfer::IoInfo, DatasetError};

use super::{Layout, LayoutIoTraits};

/// The I/O operations of a compact layout.
///
/// The raw data lives in the dataset's layout record and is persisted when the dataset is flushed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactIo;

impl LayoutIoTraits for CompactIo {
    fn readvv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &mut [u8],
    ) -> Result<u64, DatasetError> {
        match &*io.dataset().layout.lock() {
            Layout::Compact { buf: data, .. } => Ok(vector_copy(buf, dst, data, src)),
            layout => Err(DatasetError::Unsupported(format!(
                "compact I/O on a {} layout",
                layout.class()
            ))),
        }
    }

    fn writevv(
        &self,
        io: &IoInfo,
        dst: &mut SequenceCursor,
        src: &mut SequenceCursor,
        buf: &[u8],
    ) -> Result<u64, DatasetError> {
        match &mut *io.dataset().layout.lock() {
            Layout::Compact { buf: data, dirty } => {
                *dirty = true;
                Ok(vector_copy(data, dst, buf, src))
            }
            layout => Err(DatasetError::Unsupported(format!(
                "compact I/O on a {} layout",
                layout.class()
            ))),
        }
    }
}
