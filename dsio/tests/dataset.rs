#![allow(missing_docs)]

use std::{num::NonZeroU64, sync::Arc};

use dsio::{
    chunk_map::ChunkMap,
    dataspace::{ArraySubset, Dataspace, SelectionError},
    datatype::DataType,
    fill_value::{AllocTime, FillTime},
    layout::{ExternalFileList, Layout, MemoryExternalFiles, StorageLayout},
    properties::{TransferProperties, TransferScratch},
    storage::{
        storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter,
        store::MemoryStore, ReadableStorageTraits,
    },
    DatasetBuilder, DatasetCreateError, DatasetError, File, FileBuilder, SpaceArg,
};

fn memory_file() -> File {
    File::new(Arc::new(MemoryStore::new()))
}

fn hyperslab(dims: &[u64], ranges: &[std::ops::Range<u64>]) -> Dataspace {
    let mut space = Dataspace::new_simple(dims.to_vec());
    space
        .select_subset(&ArraySubset::new_with_ranges(ranges))
        .unwrap();
    space
}

#[test]
fn dataset_straddling_block() -> Result<(), Box<dyn std::error::Error>> {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![100, 100], DataType::int32())
        .chunk_shape(vec![10, 10])
        .fill_value(0i32)
        .build(&file, "grid")?;

    let mut file_space = hyperslab(&[100, 100], &[5..15, 5..15]);
    let mem_space = Dataspace::new_simple(vec![10, 10]);
    let chunk_shape = [NonZeroU64::new(10).unwrap(); 2];
    let map = ChunkMap::build(&[100, 100], &chunk_shape, &mut file_space, &mem_space)?;
    assert_eq!(map.len(), 4);
    assert!(map.iter().all(|info| info.num_points() == 25));
    drop(map);

    dataset.write_elements(&DataType::int32(), SpaceArg::Space(&file_space), &[7i32; 100])?;
    let elements: Vec<i32> = dataset.read_elements(&DataType::int32(), SpaceArg::All)?;
    for (i, element) in elements.iter().enumerate() {
        let (row, col) = (i / 100, i % 100);
        let inside = (5..15).contains(&row) && (5..15).contains(&col);
        assert_eq!(*element, if inside { 7 } else { 0 }, "element ({row}, {col})");
    }
    Ok(())
}

#[test]
fn dataset_count_mismatch() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![8, 8], DataType::uint8())
        .build(&file, "a")
        .unwrap();
    let file_space = hyperslab(&[8, 8], &[0..2, 0..2]);
    let mem_space = Dataspace::new_simple(vec![5]);
    let store_size_before = file.end_of_allocation();
    let result = dataset.write(
        &DataType::uint8(),
        SpaceArg::Space(&mem_space),
        SpaceArg::Space(&file_space),
        &TransferProperties::default(),
        &[1; 5],
    );
    assert!(matches!(result, Err(DatasetError::Argument(_))));
    // Nothing was allocated
    assert_eq!(file.end_of_allocation(), store_size_before);

    assert!(matches!(
        dataset.write_elements(&DataType::uint8(), SpaceArg::Space(&file_space), &[1u8; 3]),
        Err(DatasetError::Argument(_))
    ));
    assert!(matches!(
        dataset.read_elements::<u16>(&DataType::uint8(), SpaceArg::All),
        Err(DatasetError::Argument(_))
    ));

    // A null memory extent cannot take part in a transfer
    let mut buf = [0u8; 4];
    assert!(matches!(
        dataset.read(
            &DataType::uint8(),
            SpaceArg::Space(&Dataspace::new_null()),
            SpaceArg::Space(&file_space),
            &TransferProperties::default(),
            &mut buf,
        ),
        Err(DatasetError::Argument(_))
    ));

    // Empty buffers are only valid for empty selections
    let mut empty = Dataspace::new_simple(vec![8, 8]);
    empty.select_none();
    let mut none = Dataspace::new_simple(vec![4]);
    none.select_none();
    dataset
        .read(
            &DataType::uint8(),
            SpaceArg::Space(&none),
            SpaceArg::Space(&empty),
            &TransferProperties::default(),
            &mut [],
        )
        .unwrap();
    assert!(matches!(
        dataset.read(
            &DataType::uint8(),
            SpaceArg::Space(&Dataspace::new_simple(vec![4])),
            SpaceArg::Space(&hyperslab(&[8, 8], &[0..2, 0..2])),
            &TransferProperties::default(),
            &mut [],
        ),
        Err(DatasetError::Argument(_))
    ));
}

#[test]
fn dataset_selection_out_of_bounds() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![4, 4], DataType::uint8())
        .build(&file, "a")
        .unwrap();
    let mut file_space = dataset.space();
    file_space.select_points([[0u64, 0], [4, 1]]).unwrap();
    assert!(matches!(
        dataset.read_elements::<u8>(&DataType::uint8(), SpaceArg::Space(&file_space)),
        Err(DatasetError::Selection(SelectionError::OutOfBounds(_)))
    ));

    // The file dataspace must match the dataset extent
    let other = Dataspace::new_simple(vec![5, 5]);
    assert!(matches!(
        dataset.read_elements::<u8>(&DataType::uint8(), SpaceArg::Space(&other)),
        Err(DatasetError::Argument(_))
    ));
}

fn round_trip(layout: StorageLayout) {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![12, 9], DataType::uint16())
        .layout(layout)
        .build(&file, "a")
        .unwrap();
    let props = TransferProperties::default();

    // Hyperslab: a strided selection written from the middle of a larger memory buffer
    let mut file_space = dataset.space();
    file_space
        .select_hyperslab(&[1, 0], &[3, 4], &[4, 3], &[2, 1])
        .unwrap();
    let mut mem_space = Dataspace::new_simple(vec![30]);
    mem_space
        .select_subset(&ArraySubset::new_with_ranges(&[3..27]))
        .unwrap();
    let values: Vec<u16> = (0..30).map(|i| i * 11).collect();
    dataset
        .write(
            &DataType::uint16(),
            SpaceArg::Space(&mem_space),
            SpaceArg::Space(&file_space),
            &props,
            bytemuck::cast_slice(&values),
        )
        .unwrap();
    let mut read_back = vec![0u16; 30];
    dataset
        .read(
            &DataType::uint16(),
            SpaceArg::Space(&mem_space),
            SpaceArg::Space(&file_space),
            &props,
            bytemuck::cast_slice_mut(&mut read_back),
        )
        .unwrap();
    assert_eq!(read_back[3..27], values[3..27]);
    assert!(read_back[..3].iter().all(|&v| v == 0));

    // Points, in an order that is not sorted
    let points = [[11u64, 8], [0, 0], [6, 4], [2, 7]];
    let mut file_space = dataset.space();
    file_space.select_points(points).unwrap();
    dataset
        .write_elements(
            &DataType::uint16(),
            SpaceArg::Space(&file_space),
            &[1000u16, 2000, 3000, 4000],
        )
        .unwrap();
    assert_eq!(
        dataset
            .read_elements::<u16>(&DataType::uint16(), SpaceArg::Space(&file_space))
            .unwrap(),
        [1000, 2000, 3000, 4000]
    );
    let all = dataset
        .read_elements::<u16>(&DataType::uint16(), SpaceArg::All)
        .unwrap();
    assert_eq!(all[11 * 9 + 8], 1000);
    assert_eq!(all[6 * 9 + 4], 3000);
}

#[test]
fn dataset_round_trip_contiguous() {
    round_trip(StorageLayout::Contiguous);
}

#[test]
fn dataset_round_trip_chunked() {
    round_trip(StorageLayout::Chunked(vec![5, 4]));
}

#[test]
fn dataset_round_trip_compact() {
    round_trip(StorageLayout::Compact);
}

#[test]
fn dataset_round_trip_external() {
    let mut efl = ExternalFileList::new();
    efl.push("a.raw", 16, 100).push("b.raw", 0, 200);
    round_trip(StorageLayout::External(efl));
}

#[test]
fn dataset_type_conversion() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![6], DataType::int16())
        .chunk_shape(vec![4])
        .build(&file, "a")
        .unwrap();
    dataset
        .write_elements(
            &DataType::float64(),
            SpaceArg::All,
            &[-1.0f64, 0.0, 1.5, 300.0, 40000.0, -40000.0],
        )
        .unwrap();
    assert_eq!(
        dataset
            .read_elements::<i16>(&DataType::int16(), SpaceArg::All)
            .unwrap(),
        [-1, 0, 1, 300, i16::MAX, i16::MIN]
    );
    assert_eq!(
        dataset
            .read_elements::<f32>(&DataType::float32(), SpaceArg::All)
            .unwrap(),
        [-1.0, 0.0, 1.0, 300.0, 32767.0, -32768.0]
    );

    // Scratch buffers are reused across calls
    let mut scratch = TransferScratch::default();
    let mut out = vec![0i64; 6];
    for _ in 0..2 {
        dataset
            .read_with_scratch(
                &DataType::int64(),
                SpaceArg::All,
                SpaceArg::All,
                &TransferProperties::default().with_buffer_size(16),
                bytemuck::cast_slice_mut(&mut out),
                &mut scratch,
            )
            .unwrap();
    }
    assert_eq!(out, [-1, 0, 1, 300, 32767, -32768]);
    assert!(scratch.tconv_size() > 0);
}

#[test]
fn dataset_fill_values_without_physical_reads() {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let file = File::new(store.clone());
    for (name, layout) in [
        ("contiguous", StorageLayout::Contiguous),
        ("chunked", StorageLayout::Chunked(vec![3, 3])),
    ] {
        let dataset = DatasetBuilder::new(vec![7, 5], DataType::uint16())
            .layout(layout.clone())
            .fill_value(9u16)
            .fill_time(FillTime::Alloc)
            .build(&file, name)
            .unwrap();
        store.reset();
        let elements = dataset
            .read_elements::<u16>(&DataType::uint16(), SpaceArg::All)
            .unwrap();
        assert_eq!(elements, vec![9; 35]);
        // Converted fill values
        let elements = dataset
            .read_elements::<f64>(&DataType::float64(), SpaceArg::All)
            .unwrap();
        assert_eq!(elements, vec![9.0; 35]);
        assert_eq!(store.reads(), 0);

        let never = DatasetBuilder::new(vec![7, 5], DataType::uint16())
            .layout(layout)
            .fill_value(9u16)
            .fill_time(FillTime::Never)
            .build(&file, &format!("{name}_never"))
            .unwrap();
        store.reset();
        let mut buf = vec![0xABu8; 70];
        never
            .read(
                &DataType::uint16(),
                SpaceArg::All,
                SpaceArg::All,
                &TransferProperties::default(),
                &mut buf,
            )
            .unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
        assert_eq!(store.reads(), 0);
    }
}

#[test]
fn dataset_partial_write_fills_remainder() {
    let store = Arc::new(MemoryStore::new());
    let file = File::new(store.clone());
    let dataset = DatasetBuilder::new(vec![10], DataType::uint8())
        .fill_value(5u8)
        .build(&file, "a")
        .unwrap();
    let file_space = hyperslab(&[10], &[2..4]);
    dataset
        .write_elements(&DataType::uint8(), SpaceArg::Space(&file_space), &[1u8, 2])
        .unwrap();
    dataset.flush().unwrap();
    let Layout::Contiguous {
        address: Some(address),
        ..
    } = dataset.layout()
    else {
        panic!("contiguous storage is allocated by the first write");
    };
    let mut raw = [0u8; 10];
    store.read_into(address, &mut raw).unwrap();
    assert_eq!(raw, [5, 5, 1, 2, 5, 5, 5, 5, 5, 5]);

    // A full overwrite elides the fill
    let full = DatasetBuilder::new(vec![4], DataType::uint8())
        .fill_value(5u8)
        .build(&file, "b")
        .unwrap();
    full.write_elements(&DataType::uint8(), SpaceArg::All, &[1u8, 2, 3, 4])
        .unwrap();
    assert_eq!(
        full.read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
            .unwrap(),
        [1, 2, 3, 4]
    );
}

#[test]
fn dataset_early_allocation_writes_fill() {
    let store = Arc::new(MemoryStore::new());
    let file = File::new(store.clone());
    let dataset = DatasetBuilder::new(vec![2, 3], DataType::uint8())
        .chunk_shape(vec![2, 2])
        .fill_value(3u8)
        .alloc_time(AllocTime::Early)
        .build(&file, "a")
        .unwrap();
    let Layout::Chunked { index_address, .. } = dataset.layout() else {
        panic!("chunked layout expected");
    };
    let index = file.chunk_index(index_address);
    assert_eq!(index.num_chunks().unwrap(), 2);
    let address = index.get(&[0, 1]).unwrap().unwrap();
    let mut raw = [0u8; 4];
    store.read_into(address, &mut raw).unwrap();
    assert_eq!(raw, [3; 4]);
}

#[test]
fn dataset_late_allocation_on_first_write() {
    let store = Arc::new(MemoryStore::new());
    let file = File::new(store.clone());
    let dataset = DatasetBuilder::new(vec![8], DataType::uint8())
        .chunk_shape(vec![2])
        .fill_value(5u8)
        .alloc_time(AllocTime::Late)
        .build(&file, "late")
        .unwrap();
    let Layout::Chunked { index_address, .. } = dataset.layout() else {
        panic!("chunked layout expected");
    };
    let index = file.chunk_index(index_address);
    assert_eq!(index.num_chunks().unwrap(), 0);

    let file_space = hyperslab(&[8], &[3..4]);
    dataset
        .write_elements(&DataType::uint8(), SpaceArg::Space(&file_space), &[9u8])
        .unwrap();
    assert_eq!(index.num_chunks().unwrap(), 4);
    let mut raw = [0u8; 2];
    store
        .read_into(index.get(&[3]).unwrap().unwrap(), &mut raw)
        .unwrap();
    assert_eq!(raw, [5, 5]);
    assert_eq!(
        dataset
            .read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
            .unwrap(),
        [5, 5, 5, 9, 5, 5, 5, 5]
    );
}

#[test]
fn dataset_compact_persists_in_metadata() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![4], DataType::int8())
        .layout(StorageLayout::Compact)
        .fill_value(-1i8)
        .build(&file, "small")
        .unwrap();
    dataset
        .write_elements(&DataType::int8(), SpaceArg::Space(&hyperslab(&[4], &[1..3])), &[10i8, 20])
        .unwrap();
    // No file space is used by compact raw data
    assert_eq!(file.end_of_allocation(), 0);
    dataset.close().unwrap();

    let metadata = file.metadata("small").unwrap();
    assert_eq!(
        serde_json::to_value(&metadata.layout).unwrap(),
        serde_json::json!({"class": "compact", "data": [255, 10, 20, 255]})
    );
    let reopened = file.open_dataset("small").unwrap();
    assert_eq!(
        reopened
            .read_elements::<i8>(&DataType::int8(), SpaceArg::All)
            .unwrap(),
        [-1, 10, 20, -1]
    );
}

#[test]
fn dataset_external_files() {
    let external_files = Arc::new(MemoryExternalFiles::new());
    let file = FileBuilder::new(Arc::new(MemoryStore::new()))
        .external_files(external_files.clone())
        .build();
    let mut efl = ExternalFileList::new();
    efl.push("first.raw", 4, 6).push("second.raw", 0, 10);
    let dataset = DatasetBuilder::new(vec![8], DataType::uint16())
        .layout(StorageLayout::External(efl))
        .fill_value(1u16)
        .build(&file, "ext")
        .unwrap();
    dataset
        .write_elements(
            &DataType::uint16(),
            SpaceArg::Space(&hyperslab(&[8], &[2..5])),
            &[7u16, 8, 9],
        )
        .unwrap();
    assert_eq!(
        dataset
            .read_elements::<u16>(&DataType::uint16(), SpaceArg::All)
            .unwrap(),
        [1, 1, 7, 8, 9, 1, 1, 1]
    );

    // Element 2 is bytes 4..6 of the raw data, in the first file at offset 8
    let first = external_files.get("first.raw").unwrap().to_vec();
    assert_eq!(first.len(), 10);
    assert_eq!(first[8..10], 7u16.to_ne_bytes());
    // Element 3 is bytes 6..8 of the raw data, at the start of the second file
    let second = external_files.get("second.raw").unwrap().to_vec();
    assert_eq!(second[0..2], 8u16.to_ne_bytes());
    assert_eq!(file.end_of_allocation(), 0);
}

#[test]
fn dataset_set_extent() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![4, 4], DataType::uint8())
        .chunk_shape(vec![2, 2])
        .max_dims(vec![None, Some(6)])
        .fill_value(0u8)
        .build(&file, "grow")
        .unwrap();
    dataset
        .write_elements(&DataType::uint8(), SpaceArg::All, &[1u8; 16])
        .unwrap();

    assert!(matches!(
        dataset.set_extent(vec![4, 8]),
        Err(DatasetError::Extent(_))
    ));
    dataset.set_extent(vec![6, 6]).unwrap();
    assert_eq!(dataset.dims(), [6, 6]);
    let elements = dataset
        .read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
        .unwrap();
    for (i, element) in elements.iter().enumerate() {
        let (row, col) = (i / 6, i % 6);
        assert_eq!(*element, u8::from(row < 4 && col < 4));
    }

    // Shrinking discards chunks outside the new extent
    dataset.flush().unwrap();
    dataset.set_extent(vec![2, 6]).unwrap();
    let Layout::Chunked { index_address, .. } = dataset.layout() else {
        panic!("chunked layout expected");
    };
    let index = file.chunk_index(index_address);
    assert!(index.entries().unwrap().iter().all(|(scaled, _)| scaled[0] == 0));
    assert_eq!(file.metadata("grow").unwrap().extent.dims(), [2, 6]);

    // Growing again reads fill values where chunks were discarded
    dataset.set_extent(vec![4, 6]).unwrap();
    let elements = dataset
        .read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
        .unwrap();
    assert_eq!(elements[..12], [1, 1, 1, 1, 0, 0, 1, 1, 1, 1, 0, 0]);
    assert!(elements[12..].iter().all(|&e| e == 0));

    let fixed = DatasetBuilder::new(vec![4], DataType::uint8())
        .build(&file, "fixed")
        .unwrap();
    fixed.set_extent(vec![4]).unwrap();
    assert!(matches!(
        fixed.set_extent(vec![5]),
        Err(DatasetError::Unsupported(_))
    ));
}

#[test]
fn dataset_shrink_fills_edge_chunks() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![10], DataType::int32())
        .chunk_shape(vec![4])
        .max_dims(vec![None])
        .fill_value(-1i32)
        .build(&file, "edge")
        .unwrap();
    dataset
        .write_elements(&DataType::int32(), SpaceArg::All, &[9i32; 10])
        .unwrap();

    // The edge chunk is held by the chunk cache
    dataset.set_extent(vec![5]).unwrap();
    dataset.set_extent(vec![10]).unwrap();
    assert_eq!(
        dataset
            .read_elements::<i32>(&DataType::int32(), SpaceArg::All)
            .unwrap(),
        [9, 9, 9, 9, 9, -1, -1, -1, -1, -1]
    );

    // The edge chunk is only in storage after reopening
    dataset
        .write_elements(&DataType::int32(), SpaceArg::All, &[7i32; 10])
        .unwrap();
    dataset.close().unwrap();
    let dataset = file.open_dataset("edge").unwrap();
    dataset.set_extent(vec![6]).unwrap();
    dataset.set_extent(vec![10]).unwrap();
    assert_eq!(
        dataset
            .read_elements::<i32>(&DataType::int32(), SpaceArg::All)
            .unwrap(),
        [7, 7, 7, 7, 7, 7, -1, -1, -1, -1]
    );
}

#[test]
fn dataset_shared_handles() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(vec![3], DataType::uint8())
        .chunk_shape(vec![2])
        .build(&file, "a")
        .unwrap();
    let reopened = file.open_dataset("a").unwrap();
    assert!(dataset.shares_with(&reopened));
    dataset
        .write_elements(&DataType::uint8(), SpaceArg::All, &[4u8, 5, 6])
        .unwrap();
    // Cached chunks are visible through every handle
    assert_eq!(
        reopened
            .read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
            .unwrap(),
        [4, 5, 6]
    );
    drop(dataset);
    drop(reopened);

    // The last handle flushed the chunk cache
    let metadata = file.metadata("a").unwrap();
    let dsio::layout::LayoutRecord::Chunked { index_address, .. } = metadata.layout else {
        panic!("chunked layout expected");
    };
    assert_eq!(file.chunk_index(index_address).num_chunks().unwrap(), 2);
    let again = file.open_dataset("a").unwrap();
    assert_eq!(
        again
            .read_elements::<u8>(&DataType::uint8(), SpaceArg::All)
            .unwrap(),
        [4, 5, 6]
    );

    assert!(matches!(
        DatasetBuilder::new(vec![3], DataType::uint8()).build(&file, "a"),
        Err(DatasetCreateError::Exists(_))
    ));
}

#[test]
fn dataset_scalar() {
    let file = memory_file();
    let dataset = DatasetBuilder::new(Vec::<u64>::new(), DataType::float32())
        .fill_value(2.5f32)
        .build(&file, "scalar")
        .unwrap();
    assert_eq!(
        dataset
            .read_elements::<f32>(&DataType::float32(), SpaceArg::All)
            .unwrap(),
        [2.5]
    );
    dataset
        .write_elements(&DataType::float32(), SpaceArg::All, &[-4.0f32])
        .unwrap();
    assert_eq!(
        dataset
            .read_elements::<f64>(&DataType::float64(), SpaceArg::All)
            .unwrap(),
        [-4.0]
    );
}
