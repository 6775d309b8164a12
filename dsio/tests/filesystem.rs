#![allow(missing_docs)]
#![cfg(feature = "filesystem")]

use std::sync::Arc;

use dsio::{
    chunk_index::{BTreeChunkIndex, ChunkIndexTraits},
    dataspace::ArraySubset,
    datatype::DataType,
    filesystem::FilesystemStore,
    layout::{ExternalFileList, FilesystemExternalFiles, LayoutRecord, StorageLayout},
    DatasetBuilder, File, FileBuilder, SpaceArg,
};

#[test]
fn filesystem_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.bin");

    let (objects, end_of_allocation, index_address, chunks) = {
        let file = File::new(Arc::new(FilesystemStore::new(&path)?));
        let contiguous = DatasetBuilder::new(vec![6, 6], DataType::float32())
            .fill_value(0.5f32)
            .build(&file, "contiguous")?;
        let values: Vec<f32> = (0..36u16).map(f32::from).collect();
        contiguous.write_elements(&DataType::float32(), SpaceArg::All, &values)?;

        let chunked = DatasetBuilder::new(vec![9], DataType::int64())
            .chunk_shape(vec![4])
            .max_dims(vec![None])
            .build(&file, "chunked")?;
        let mut file_space = chunked.space();
        file_space.select_subset(&ArraySubset::new_with_ranges(&[3..7]))?;
        chunked.write_elements(
            &DataType::int64(),
            SpaceArg::Space(&file_space),
            &[-3i64, -4, -5, -6],
        )?;
        file.flush()?;

        let LayoutRecord::Chunked { index_address, .. } = file.metadata("chunked")?.layout else {
            panic!("chunked layout expected");
        };
        let chunks = file.chunk_index(index_address).entries()?;
        (file.objects(), file.end_of_allocation(), index_address, chunks)
    };
    assert_eq!(chunks.len(), 2);

    // Restore the chunk index as an external index layer would
    let index = Arc::new(BTreeChunkIndex::new());
    for (scaled, address) in &chunks {
        index.insert(scaled, *address)?;
    }
    let file = FileBuilder::new(Arc::new(FilesystemStore::new(&path)?))
        .objects(objects)
        .base_address(end_of_allocation)
        .chunk_index(index_address, index)
        .build();
    assert_eq!(file.dataset_names(), ["chunked", "contiguous"]);

    let contiguous = file.open_dataset("contiguous")?;
    let values = contiguous.read_elements::<f64>(&DataType::float64(), SpaceArg::All)?;
    assert_eq!(values[35], 35.0);
    let chunked = file.open_dataset("chunked")?;
    assert_eq!(
        chunked.read_elements::<i64>(&DataType::int64(), SpaceArg::All)?,
        [0, 0, 0, -3, -4, -5, -6, 0, 0]
    );

    // New allocations do not overlap the previous session
    chunked.set_extent(vec![13])?;
    let mut file_space = chunked.space();
    file_space.select_subset(&ArraySubset::new_with_ranges(&[12..13]))?;
    chunked.write_elements(&DataType::int64(), SpaceArg::Space(&file_space), &[12i64])?;
    chunked.flush()?;
    assert!(file.end_of_allocation() > end_of_allocation);
    assert_eq!(
        contiguous.read_elements::<f32>(&DataType::float32(), SpaceArg::All)?[..3],
        [0.0, 1.0, 2.0]
    );
    Ok(())
}

#[test]
fn filesystem_external_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = FileBuilder::new(Arc::new(FilesystemStore::new(dir.path().join("data.bin"))?))
        .external_files(Arc::new(FilesystemExternalFiles::new(dir.path())))
        .build();
    let mut efl = ExternalFileList::new();
    efl.push("part0.raw", 0, 4).push("part1.raw", 2, 4);
    let dataset = DatasetBuilder::new(vec![4], DataType::uint16())
        .layout(StorageLayout::External(efl))
        .build(&file, "ext")?;
    dataset.write_elements(&DataType::uint16(), SpaceArg::All, &[1u16, 2, 3, 4])?;

    assert_eq!(
        std::fs::read(dir.path().join("part0.raw"))?,
        [1u16.to_ne_bytes(), 2u16.to_ne_bytes()].concat()
    );
    assert_eq!(
        std::fs::read(dir.path().join("part1.raw"))?,
        [[0, 0], 3u16.to_ne_bytes(), 4u16.to_ne_bytes()].concat()
    );
    assert_eq!(
        dataset.read_elements::<u16>(&DataType::uint16(), SpaceArg::All)?,
        [1, 2, 3, 4]
    );
    Ok(())
}
