//! Chunk mapping.
//!
//! A [`ChunkMap`] partitions a file selection and a memory selection into per-chunk pairs of subspaces.
//! Each [`ChunkInfo`] holds the part of the file selection inside one chunk, in chunk-local coordinates, and the matching part of the memory selection.
//! Records are ordered by ascending linear chunk index.

use std::{borrow::Cow, collections::BTreeMap, num::NonZeroU64, ops::Deref};

use dsio_dataspace::{
    selection::{Hyperslab, PointList, Selection},
    sequence::{chunk_grid_indices, chunk_index, chunk_local_indices, grid_shape, row_major_strides},
    ArrayIndices, ArrayShape, Dataspace, SeqListFlags,
};

use crate::DatasetError;

fn cant_init(err: impl std::fmt::Display) -> DatasetError {
    DatasetError::CantInitialize(err.to_string())
}

/// The memory subspace of a chunk.
#[derive(Debug)]
pub enum MemorySubspace<'a> {
    /// A subspace owned by the chunk record.
    Owned(Dataspace),
    /// The caller's whole memory space, shared because exactly one chunk is touched.
    Shared(&'a Dataspace),
}

impl MemorySubspace<'_> {
    /// Returns true if the subspace is the caller's memory space.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

impl Deref for MemorySubspace<'_> {
    type Target = Dataspace;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(space) => space,
            Self::Shared(space) => space,
        }
    }
}

/// The part of a transfer touching one chunk.
#[derive(Debug)]
pub struct ChunkInfo<'a> {
    index: u64,
    scaled: ArrayIndices,
    file_space: Dataspace,
    mem_space: MemorySubspace<'a>,
    num_points: u64,
}

impl ChunkInfo<'_> {
    /// Return the linear chunk index.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Return the scaled coordinates of the chunk (its indices in the chunk grid).
    #[must_use]
    pub fn scaled(&self) -> &[u64] {
        &self.scaled
    }

    /// Return the file subspace, whose extent is the chunk shape and whose selection is in chunk-local coordinates.
    #[must_use]
    pub fn file_space(&self) -> &Dataspace {
        &self.file_space
    }

    /// Return the memory subspace.
    #[must_use]
    pub fn mem_space(&self) -> &MemorySubspace<'_> {
        &self.mem_space
    }

    /// Return the number of selected elements in the chunk.
    #[must_use]
    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    /// Returns true if the file subspace can be expressed as one monotone file view.
    ///
    /// Hyperslabs are always monotone. A point list is monotone if its byte offsets never decrease.
    #[must_use]
    pub fn file_is_monotone(&self) -> bool {
        match self.file_space.selection() {
            Selection::Points(_) if self.num_points > 0 => {
                let mut iter = self.file_space.iter(1);
                let (_, consumed) =
                    iter.get_seq_list(SeqListFlags::SORTED, usize::MAX, self.num_points);
                consumed == self.num_points
            }
            _ => true,
        }
    }
}

/// A mapping of a transfer onto a regular chunk grid.
#[derive(Debug)]
pub struct ChunkMap<'a> {
    grid_shape: ArrayShape,
    down_sizes: Vec<u64>,
    chunks: BTreeMap<u64, ChunkInfo<'a>>,
}

impl<'a> ChunkMap<'a> {
    /// Partition `file_space` and `mem_space` over a dataset of shape `dims` chunked with `chunk_shape`.
    ///
    /// The selection offset of `file_space` is folded into its selection while the map is built and restored before returning, whether or not the build succeeds.
    /// The memory selection keeps its offset; memory subspaces inherit it.
    ///
    /// # Errors
    /// Returns [`DatasetError::CantInitialize`] if the dataspaces are inconsistent with each other or with the chunk grid.
    pub fn build(
        dims: &[u64],
        chunk_shape: &[NonZeroU64],
        file_space: &mut Dataspace,
        mem_space: &'a Dataspace,
    ) -> Result<Self, DatasetError> {
        let rank = chunk_shape.len();
        if file_space.dims() != dims || dims.len() != rank {
            return Err(cant_init(format!(
                "file dataspace {:?} does not match dataset shape {dims:?} with chunk shape {chunk_shape:?}",
                file_space.dims()
            )));
        }

        // (a) a scalar memory space becomes an N-D space of extent one
        let mem: Cow<'a, Dataspace> = if mem_space.rank() == 0 {
            let mut space = Dataspace::new_simple(vec![1; rank]);
            if mem_space.num_selected() == 0 {
                space.select_none();
            }
            Cow::Owned(space)
        } else {
            Cow::Borrowed(mem_space)
        };

        // (b) fold the file selection offset, restored when `file` drops
        let file = file_space.normalize_offset().map_err(cant_init)?;

        // (c) the chunk grid and its down sizes
        let grid_shape = grid_shape(dims, chunk_shape);
        let down_sizes = row_major_strides(&grid_shape);
        let chunk_dims: ArrayShape = chunk_shape.iter().map(|c| c.get()).collect();

        // (d) file side
        let mut chunks = BTreeMap::new();
        match file.selection() {
            Selection::None => {}
            Selection::Points(points) => {
                let mut buckets: BTreeMap<u64, (ArrayIndices, PointList)> = BTreeMap::new();
                for point in points.iter() {
                    let scaled = chunk_grid_indices(point, chunk_shape);
                    let index = chunk_index(&scaled, &down_sizes);
                    let local = chunk_local_indices(point, chunk_shape);
                    buckets
                        .entry(index)
                        .or_insert_with(|| (scaled, PointList::new(rank)))
                        .1
                        .push(&local)
                        .map_err(cant_init)?;
                }
                for (index, (scaled, points)) in buckets {
                    let num_points = points.len() as u64;
                    let mut chunk_space = Dataspace::new_simple(chunk_dims.clone());
                    chunk_space
                        .set_selection(Selection::Points(points))
                        .map_err(cant_init)?;
                    chunks.insert(
                        index,
                        ChunkInfo {
                            index,
                            scaled,
                            file_space: chunk_space,
                            mem_space: MemorySubspace::Owned(Dataspace::new_null()),
                            num_points,
                        },
                    );
                }
            }
            Selection::All | Selection::Hyperslab(_) => {
                let hyperslab = file
                    .as_hyperslab()
                    .ok_or_else(|| cant_init("file selection is not a hyperslab"))?;
                if let Some(bbox) = hyperslab.bounding_box() {
                    for (scaled, chunk_subset) in bbox.chunks(chunk_shape).map_err(cant_init)? {
                        let selected = hyperslab
                            .intersect_subset(&chunk_subset)
                            .map_err(cant_init)?;
                        if selected.is_empty() {
                            continue;
                        }
                        let local = selected
                            .relative_to(chunk_subset.start())
                            .ok_or_else(|| cant_init("chunk origin exceeds selection"))?;
                        let num_points = local.num_elements();
                        let index = chunk_index(&scaled, &down_sizes);
                        let mut chunk_space = Dataspace::new_simple(chunk_dims.clone());
                        chunk_space
                            .set_selection(Selection::Hyperslab(local))
                            .map_err(cant_init)?;
                        chunks.insert(
                            index,
                            ChunkInfo {
                                index,
                                scaled,
                                file_space: chunk_space,
                                mem_space: MemorySubspace::Owned(Dataspace::new_null()),
                                num_points,
                            },
                        );
                    }
                }
            }
        }

        // (e) memory side
        let translation = if matches!(file.selection(), Selection::Points(_)) {
            None
        } else {
            file.same_shape(&mem)
        };
        if let Some(delta) = translation {
            if chunks.len() == 1 {
                let mem_space = match &mem {
                    Cow::Borrowed(space) => MemorySubspace::Shared(*space),
                    Cow::Owned(space) => MemorySubspace::Owned(space.clone()),
                };
                if let Some(info) = chunks.values_mut().next() {
                    info.mem_space = mem_space;
                }
            } else {
                for info in chunks.values_mut() {
                    let Selection::Hyperslab(local) = info.file_space.selection() else {
                        return Err(cant_init("chunk file selection is not a hyperslab"));
                    };
                    let shift = std::iter::zip(&info.scaled, std::iter::zip(&chunk_dims, &delta))
                        .map(|(&s, (&c, &d))| {
                            i64::try_from(s * c).map(|origin| origin + d)
                        })
                        .collect::<Result<Vec<i64>, _>>()
                        .map_err(cant_init)?;
                    let mem_selection: Hyperslab = local
                        .translate(&shift)
                        .ok_or_else(|| cant_init("memory selection translation out of range"))?;
                    let mut space = mem.as_ref().clone();
                    space
                        .set_selection(Selection::Hyperslab(mem_selection))
                        .map_err(cant_init)?;
                    info.mem_space = MemorySubspace::Owned(space);
                }
            }
        } else {
            // walk both selections element by element
            let mut mem_points: BTreeMap<u64, PointList> = BTreeMap::new();
            let mut file_iter = file.iter(1);
            let mut mem_iter = mem.iter(1);
            loop {
                match (file_iter.next(), mem_iter.next()) {
                    (Some(file_coords), Some(mem_coords)) => {
                        let scaled = chunk_grid_indices(&file_coords, chunk_shape);
                        let index = chunk_index(&scaled, &down_sizes);
                        mem_points
                            .entry(index)
                            .or_insert_with(|| PointList::new(mem.rank()))
                            .push(&mem_coords)
                            .map_err(cant_init)?;
                    }
                    (None, None) => break,
                    _ => {
                        return Err(cant_init(format!(
                            "file selection of {} elements does not match memory selection of {} elements",
                            file.num_selected(),
                            mem.num_selected()
                        )))
                    }
                }
            }
            for (index, points) in mem_points {
                let info = chunks
                    .get_mut(&index)
                    .ok_or_else(|| cant_init(format!("chunk {index} missing from file map")))?;
                let mut space = Dataspace::new(mem.extent().clone());
                space
                    .set_selection(Selection::Points(points))
                    .map_err(cant_init)?;
                info.mem_space = MemorySubspace::Owned(space);
            }
        }

        let total: u64 = chunks.values().map(|info| info.num_points).sum();
        if total != file.num_selected() || total != mem.num_selected() {
            return Err(cant_init(format!(
                "chunk map holds {total} elements, file selects {}, memory selects {}",
                file.num_selected(),
                mem.num_selected()
            )));
        }
        if let Some(info) = chunks
            .values()
            .find(|info| info.mem_space.num_selected() != info.num_points)
        {
            return Err(cant_init(format!(
                "chunk {} selects {} file elements but {} memory elements",
                info.index,
                info.num_points,
                info.mem_space.num_selected()
            )));
        }
        log::debug!(
            "chunk map over grid {grid_shape:?} touches {} chunks",
            chunks.len()
        );

        Ok(Self {
            grid_shape,
            down_sizes,
            chunks,
        })
    }

    /// Return the shape of the chunk grid.
    #[must_use]
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Return the down sizes used to linearise scaled coordinates.
    #[must_use]
    pub fn down_sizes(&self) -> &[u64] {
        &self.down_sizes
    }

    /// Return the number of chunks touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if no chunks are touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the chunk record with linear index `index`.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&ChunkInfo<'a>> {
        self.chunks.get(&index)
    }

    /// Return the chunk records in ascending linear index order.
    pub fn iter(&self) -> impl Iterator<Item = &ChunkInfo<'a>> {
        self.chunks.values()
    }

    /// Return the total number of elements across all chunk records.
    #[must_use]
    pub fn num_points(&self) -> u64 {
        self.chunks.values().map(|info| info.num_points).sum()
    }
}
