use std::sync::Arc;

use dsio_dataspace::{ArrayShape, Extent};
use dsio_storage::{SpaceAllocatorTraits, WritableStorageTraits};

use crate::{
    datatype::DataType,
    file::File,
    fill_value::{AllocTime, FillTime, FillValue, FillValueRecord},
    layout::{LayoutRecord, StorageLayout, COMPACT_MAX_SIZE},
    DatasetCreateError, DatasetError,
};

use super::{Dataset, DatasetMetadata, DatasetShared};

/// The size in bytes reserved in the file for the chunk index of a chunked dataset.
const CHUNK_INDEX_RESERVED_SIZE: u64 = 8;

/// A [`Dataset`] builder.
///
/// [`DatasetBuilder`] is initialised from the dimensions and data type of a dataset.
///  - The default layout is [contiguous](StorageLayout::Contiguous).
///  - The extent is fixed unless maximum dimensions are set.
///  - There is no fill value, storage is allocated [incrementally](AllocTime::Incremental) and filled [if a fill value is set](FillTime::IfSet).
///
/// In a multi-process file every process must build the same dataset: creation ends with a barrier.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # use std::sync::Arc;
/// use dsio::{datatype::DataType, layout::StorageLayout, DatasetBuilder, File, SpaceArg};
/// let file = File::new(Arc::new(dsio::storage::store::MemoryStore::new()));
/// let dataset = DatasetBuilder::new(vec![8, 8], DataType::float32())
///     .layout(StorageLayout::Chunked(vec![4, 4]))
///     .fill_value(-1.0f32)
///     .build(&file, "temperature")?;
/// let elements: Vec<f32> = dataset.read_elements(&DataType::float32(), SpaceArg::All)?;
/// assert_eq!(elements, vec![-1.0; 64]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct DatasetBuilder {
    dims: ArrayShape,
    max_dims: Option<Vec<Option<u64>>>,
    data_type: DataType,
    layout: StorageLayout,
    fill_value: FillValueRecord,
}

impl DatasetBuilder {
    /// Create a new dataset builder for a dataset of `dims` elements of `data_type`.
    ///
    /// Empty `dims` creates a scalar dataset.
    #[must_use]
    pub fn new(dims: impl Into<ArrayShape>, data_type: DataType) -> Self {
        Self {
            dims: dims.into(),
            max_dims: None,
            data_type,
            layout: StorageLayout::default(),
            fill_value: FillValueRecord::default(),
        }
    }

    /// Set the maximum dimensions. [`None`] is unlimited.
    ///
    /// An extendible dataset must be chunked.
    pub fn max_dims(&mut self, max_dims: Vec<Option<u64>>) -> &mut Self {
        self.max_dims = Some(max_dims);
        self
    }

    /// Set the storage layout.
    pub fn layout(&mut self, layout: StorageLayout) -> &mut Self {
        self.layout = layout;
        self
    }

    /// Set a chunked layout with chunks of `chunk_shape`.
    pub fn chunk_shape(&mut self, chunk_shape: impl Into<ArrayShape>) -> &mut Self {
        self.layout = StorageLayout::Chunked(chunk_shape.into());
        self
    }

    /// Set the fill value.
    pub fn fill_value(&mut self, fill_value: impl Into<FillValue>) -> &mut Self {
        self.fill_value.value = Some(fill_value.into());
        self
    }

    /// Set the allocation time.
    pub fn alloc_time(&mut self, alloc_time: AllocTime) -> &mut Self {
        self.fill_value.alloc_time = alloc_time;
        self
    }

    /// Set the fill time.
    pub fn fill_time(&mut self, fill_time: FillTime) -> &mut Self {
        self.fill_value.fill_time = fill_time;
        self
    }

    fn extent(&self) -> Result<Extent, DatasetCreateError> {
        Ok(match &self.max_dims {
            Some(max_dims) => Extent::new_with_max(self.dims.clone(), max_dims.clone())?,
            None => Extent::new_simple(self.dims.clone()),
        })
    }

    fn layout_record(
        &self,
        file: &File,
        extent: &Extent,
    ) -> Result<LayoutRecord, DatasetCreateError> {
        let element_size = self.data_type.size();
        let nbytes = extent.num_elements() * element_size as u64;
        if extent.is_extendible() && !matches!(self.layout, StorageLayout::Chunked(_)) {
            return Err(DatasetCreateError::InvalidLayout(
                "an extendible dataset must be chunked".to_string(),
            ));
        }
        Ok(match &self.layout {
            StorageLayout::Contiguous => LayoutRecord::Contiguous {
                address: None,
                size: nbytes,
            },
            StorageLayout::Chunked(chunk_shape) => {
                if extent.rank() == 0
                    || chunk_shape.len() != extent.rank()
                    || chunk_shape.contains(&0)
                {
                    return Err(DatasetCreateError::InvalidChunkShape(chunk_shape.clone()));
                }
                let index_address = file
                    .inner()
                    .allocator
                    .allocate(CHUNK_INDEX_RESERVED_SIZE)?;
                let mut dims = chunk_shape.clone();
                dims.push(element_size as u64);
                LayoutRecord::Chunked {
                    dims,
                    index_address,
                }
            }
            StorageLayout::Compact => {
                if nbytes > COMPACT_MAX_SIZE as u64 {
                    return Err(DatasetCreateError::InvalidLayout(format!(
                        "{nbytes} bytes of raw data exceed the compact limit of {COMPACT_MAX_SIZE} bytes"
                    )));
                }
                let nelmts = usize::try_from(extent.num_elements()).unwrap_or_default();
                LayoutRecord::Compact {
                    data: self.fill_value.fill_bytes(element_size, nelmts),
                }
            }
            StorageLayout::External(efl) => {
                if efl.total_size() < nbytes {
                    return Err(DatasetCreateError::InvalidLayout(format!(
                        "external files hold {} bytes but the dataset needs {nbytes}",
                        efl.total_size()
                    )));
                }
                LayoutRecord::External { efl: efl.clone() }
            }
        })
    }

    /// Write the fill value to the raw data of an external dataset.
    fn fill_external(
        &self,
        file: &File,
        record: &LayoutRecord,
        nelmts: u64,
    ) -> Result<(), DatasetError> {
        let LayoutRecord::External { efl } = record else {
            return Ok(());
        };
        if !self.fill_value.writes_fill() {
            return Ok(());
        }
        let element_size = self.data_type.size();
        let nelmts =
            usize::try_from(nelmts).map_err(|err| DatasetError::Allocation(err.to_string()))?;
        let fill = self.fill_value.fill_bytes(element_size, nelmts);
        let mut offset = 0;
        for (entry, file_offset, n) in efl.segments(0, fill.len() as u64)? {
            let n = usize::try_from(n).map_err(|err| DatasetError::Allocation(err.to_string()))?;
            file.inner()
                .external_files
                .resolve(&entry.name)?
                .set_partial(file_offset, &fill[offset..offset + n])?;
            offset += n;
        }
        Ok(())
    }

    /// Build the dataset `name` in `file`.
    ///
    /// The metadata record is stored in the file and, with [early allocation](AllocTime::Early), the raw data is allocated.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if
    ///  - a dataset named `name` already exists,
    ///  - the data type, extent, chunk shape, or fill value is invalid,
    ///  - the layout cannot store the dataset, or
    ///  - allocation or the closing barrier fails.
    pub fn build(&self, file: &File, name: &str) -> Result<Dataset, DatasetCreateError> {
        if file.inner().contains_object(name) {
            return Err(DatasetCreateError::Exists(name.to_string()));
        }
        self.data_type.validate()?;
        if let Some(value) = &self.fill_value.value {
            if value.size() != self.data_type.size() {
                return Err(DatasetCreateError::InvalidFillValue {
                    expected: self.data_type.size(),
                    got: value.size(),
                });
            }
        }
        let extent = self.extent()?;
        let layout = self.layout_record(file, &extent)?;
        self.fill_external(file, &layout, extent.num_elements())?;

        let metadata = DatasetMetadata {
            data_type: self.data_type.clone(),
            extent,
            layout,
            fill_value: self.fill_value.clone(),
        };
        file.inner().store_metadata(name, &metadata)?;
        let shared = Arc::new(DatasetShared::open(file.inner().clone(), name, metadata)?);
        file.inner().register(name, &shared);
        shared.allocate_early()?;
        shared.store_metadata()?;
        log::debug!("created dataset `{name}`");

        let communicator = file.communicator();
        if communicator.size() > 1 {
            communicator.barrier().map_err(DatasetError::from)?;
        }
        Ok(Dataset::from_shared(shared))
    }
}
