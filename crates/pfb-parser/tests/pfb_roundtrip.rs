//! End-to-end reads of synthetic PFB files written by `test_utils::PfbFixture`.

use ndarray::Axis as ArrayAxis;
use pfb_parser::{
    read_pfb, read_stack, AccessMode, Axis, OpenOptions, ParflowBinaryReader, PfbError,
    ReaderConfig,
};
use test_utils::{
    encode_global_header, encode_subgrid_header, init_test_tracing, layouts, require_test_file,
    temp_test_dir_with_prefix, PfbFixture,
};

fn config(access: AccessMode, parallel: bool) -> ReaderConfig {
    ReaderConfig {
        access,
        parallel,
        parallel_min_tiles: 1,
        ..Default::default()
    }
}

// =============================================================================
// Full-grid reads
// =============================================================================

#[test]
fn test_full_read_matches_fixture_for_all_layouts() {
    init_test_tracing();
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");

    for (i, (extent, partition)) in [
        layouts::TWO_BY_ONE,
        layouts::UNEVEN,
        layouts::CUBE,
        layouts::SINGLE,
    ]
    .into_iter()
    .enumerate()
    {
        let fixture = PfbFixture::new(extent, partition);
        let path = fixture.write_to(dir.path(), &format!("f{}.pfb", i)).unwrap();

        let reader = ParflowBinaryReader::open(&path).unwrap();
        assert_eq!(
            reader.read_full().unwrap(),
            fixture.expected(),
            "layout {:?} / {:?}",
            extent,
            partition
        );
    }
}

#[test]
fn test_access_modes_and_parallelism_agree() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::CUBE;
    let fixture = PfbFixture::new(extent, partition);
    let path = fixture.write_to(dir.path(), "cube.pfb").unwrap();
    let expected = fixture.expected();

    for access in [AccessMode::Mmap, AccessMode::Pread] {
        for parallel in [false, true] {
            let reader = OpenOptions::new()
                .config(config(access, parallel))
                .open(&path)
                .unwrap();
            assert_eq!(reader.read_full().unwrap(), expected, "{:?} parallel={}", access, parallel);

            let flat = reader.read_flat().unwrap();
            assert_eq!(flat.len(), 12);
            assert_eq!(flat[0].dim(), (3, 2, 2));
        }
    }
}

#[test]
fn test_flat_tiles_line_up_with_geometry() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::UNEVEN;
    let fixture = PfbFixture::new(extent, partition);
    let path = fixture.write_to(dir.path(), "uneven.pfb").unwrap();
    let reader = ParflowBinaryReader::open(&path).unwrap();

    let flat = reader.read_flat().unwrap();
    for (sg, tile) in reader.geometry().subgrids().iter().zip(&flat) {
        assert_eq!(tile.shape(), &sg.shape[..]);
        let [x0, y0, z0] = sg.start;
        assert_eq!(tile[[0, 0, 0]], fixture.value(x0, y0, z0));

        // Stored local header agrees with the computed descriptor.
        let stored = reader.read_subgrid_header(sg.index).unwrap();
        assert_eq!(stored.start.map(|v| v as usize), sg.start);
        assert_eq!(stored.shape.map(|v| v as usize), sg.shape);
    }
}

#[test]
fn test_chunks_and_coords() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::UNEVEN;
    let path = PfbFixture::new(extent, partition)
        .write_to(dir.path(), "uneven.pfb")
        .unwrap();
    let reader = ParflowBinaryReader::open(&path).unwrap();
    let geometry = reader.geometry();

    assert_eq!(geometry.chunks(Axis::X), vec![3, 2, 2]);
    assert_eq!(geometry.chunks(Axis::Y), vec![3, 2]);
    assert_eq!(geometry.chunks(Axis::Z), vec![3]);
    assert_eq!(geometry.coords(Axis::X), vec![0..3, 3..5, 5..7]);
}

#[test]
fn test_read_pfb_tiled() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::CUBE;
    let fixture = PfbFixture::new(extent, partition);
    let path = fixture.write_to(dir.path(), "cube.pfb").unwrap();

    let tiled = read_pfb(&path, "tiled").unwrap().into_tiled().unwrap();
    let (desc, tile) = tiled.get(1, 2, 1).unwrap();
    assert_eq!(desc.start, [3, 4, 2]);
    assert_eq!(tile[[2, 1, 1]], fixture.value(5, 5, 3));
}

#[test]
fn test_non_dividing_first_tile_needs_explicit_partition() {
    // 9 cells over 4 ranks gives a first tile of 3, which looks like p = 3.
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let fixture = PfbFixture::new([9, 4, 2], [4, 2, 1]);
    let path = fixture.write_to(dir.path(), "odd.pfb").unwrap();

    let err = ParflowBinaryReader::open(&path).unwrap_err();
    assert!(matches!(err, PfbError::Format(_)));

    let reader = OpenOptions::new()
        .partition(pfb_parser::Partition::new(4, 2, 1))
        .open(&path)
        .unwrap();
    assert_eq!(reader.read_full().unwrap(), fixture.expected());
}

// =============================================================================
// Corrupt headers
// =============================================================================

#[test]
fn test_open_rejects_oversized_header() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let huge = i32::MAX as usize;

    // (extent, n_subgrids, first subgrid shape)
    let cases = [
        // Inferred counts of i32::MAX on every axis overflow p·q·r.
        ([huge; 3], 1, [1, 1, 1]),
        // One subgrid whose byte length does not fit in u64.
        ([huge; 3], 1, [huge; 3]),
        // Far more subgrids than the file has room for.
        ([huge, 1, 1], huge, [1, 1, 1]),
        ([4, 4, 1], 4, [2, 2, 1]),
        // First subgrid larger than the grid.
        ([4, 4, 1], 1, [8, 4, 1]),
    ];

    for (i, (extent, n_subgrids, shape)) in cases.into_iter().enumerate() {
        let mut bytes = encode_global_header([0.0; 3], extent, [1.0; 3], n_subgrids);
        bytes.extend(encode_subgrid_header([0, 0, 0], shape));
        let path = dir.path().join(format!("corrupt{}.pfb", i));
        std::fs::write(&path, &bytes).unwrap();

        for access in [AccessMode::Mmap, AccessMode::Pread] {
            let err = OpenOptions::new()
                .config(config(access, false))
                .open(&path)
                .unwrap_err();
            assert!(
                matches!(err, PfbError::Format(_)),
                "case {} ({:?}): {:?}",
                i,
                access,
                err
            );
        }
    }
}

// =============================================================================
// Stacks
// =============================================================================

#[test]
fn test_stack_matches_individual_reads() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::UNEVEN;
    let fixtures: Vec<_> = (0..3)
        .map(|t| PfbFixture::new(extent, partition).with_offset(t as f64 * 0.25))
        .collect();
    let paths: Vec<_> = fixtures
        .iter()
        .enumerate()
        .map(|(t, f)| f.write_to(dir.path(), &format!("sat.{:05}.pfb", t)).unwrap())
        .collect();

    for access in [AccessMode::Mmap, AccessMode::Pread] {
        for parallel in [false, true] {
            let stack = read_stack(&paths, &config(access, parallel)).unwrap();
            assert_eq!(stack.dim(), (3, 7, 5, 3));
            for (t, fixture) in fixtures.iter().enumerate() {
                assert_eq!(stack.index_axis(ArrayAxis(0), t), fixture.expected());
            }
        }
    }
}

#[test]
fn test_stack_rejects_different_origin() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::TWO_BY_ONE;
    let a = PfbFixture::new(extent, partition)
        .write_to(dir.path(), "a.pfb")
        .unwrap();
    let b = PfbFixture::new(extent, partition)
        .with_origin([100.0, 0.0, 0.0])
        .write_to(dir.path(), "b.pfb")
        .unwrap();

    let err = read_stack(&[&a, &b], &ReaderConfig::default()).unwrap_err();
    assert!(matches!(err, PfbError::Format(_)));

    // Without validation the second file is read with the first file's layout.
    let lenient = ReaderConfig {
        validate_stack: false,
        ..Default::default()
    };
    let stack = read_stack(&[&a, &b], &lenient).unwrap();
    assert_eq!(stack.dim(), (2, 10, 10, 1));
}

#[test]
fn test_stack_missing_file_is_io_error() {
    let dir = temp_test_dir_with_prefix("pfb_roundtrip_");
    let (extent, partition) = layouts::SINGLE;
    let a = PfbFixture::new(extent, partition)
        .write_to(dir.path(), "a.pfb")
        .unwrap();
    let missing = dir.path().join("missing.pfb");

    let err = read_stack(&[a, missing], &ReaderConfig::default()).unwrap_err();
    match err {
        PfbError::Io { path, .. } => assert!(path.ends_with("missing.pfb")),
        other => panic!("expected an I/O error, got {:?}", other),
    }
}

// =============================================================================
// Real ParFlow output (skipped unless PFB_TEST_DATA_DIR provides it)
// =============================================================================

#[test]
fn test_real_pressure_file() {
    let path = require_test_file!("LW.out.press.00000.pfb");
    let reader = ParflowBinaryReader::open(&path).unwrap();
    let full = reader.read_full().unwrap();

    let [nx, ny, nz] = reader.header().extent;
    assert_eq!(full.dim(), (nx, ny, nz));
    assert!(full.iter().all(|v| v.is_finite()));
}
