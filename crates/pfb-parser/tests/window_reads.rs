//! Windowed reads checked against slices of the fully assembled grid.

use ndarray::s;
use pfb_parser::{
    AccessMode, BoundaryPolicy, OpenOptions, ParflowBinaryReader, PfbError, ReaderConfig, Window,
};
use test_utils::{init_test_tracing, layouts, temp_test_dir_with_prefix, PfbFixture};

fn open_cube(dir: &std::path::Path, config: ReaderConfig) -> (PfbFixture, ParflowBinaryReader) {
    let (extent, partition) = layouts::CUBE;
    let fixture = PfbFixture::new(extent, partition);
    let path = fixture.write_to(dir, "cube.pfb").unwrap();
    let reader = OpenOptions::new().config(config).open(&path).unwrap();
    (fixture, reader)
}

#[test]
fn test_full_window_equals_full_read() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (_, reader) = open_cube(dir.path(), ReaderConfig::default());

    let window = Window::full(reader.header().extent);
    assert_eq!(reader.read_window(&window).unwrap(), reader.read_full().unwrap());
}

#[test]
fn test_every_small_window_matches_slice() {
    init_test_tracing();
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (fixture, reader) = open_cube(dir.path(), ReaderConfig::default());
    let expected = fixture.expected();

    // Every 2x3x2 block that fits, which crosses tile boundaries on all axes.
    for x in 0..5 {
        for y in 0..4 {
            for z in 0..3 {
                let window = Window::new([x, y, z], [2, 3, 2]);
                let got = reader.read_window(&window).unwrap();
                assert_eq!(
                    got,
                    expected.slice(s![x..x + 2, y..y + 3, z..z + 2]),
                    "window at {:?}",
                    [x, y, z]
                );
            }
        }
    }
}

#[test]
fn test_single_cell_and_column() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (fixture, reader) = open_cube(dir.path(), ReaderConfig::default());

    let cell = reader.read_window(&Window::new([4, 3, 2], [1, 1, 1])).unwrap();
    assert_eq!(cell.dim(), (1, 1, 1));
    assert_eq!(cell[[0, 0, 0]], fixture.value(4, 3, 2));

    let column = reader
        .read_window(&Window::with_default_depth([1, 5, 1], [1, 1]))
        .unwrap();
    assert_eq!(column.dim(), (1, 1, 3));
    for z in 0..3 {
        assert_eq!(column[[0, 0, z]], fixture.value(1, 5, z + 1));
    }
}

#[test]
fn test_overhang_clamped_on_every_axis() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (fixture, reader) = open_cube(dir.path(), ReaderConfig::default());

    let got = reader.read_window(&Window::new([4, 5, 3], [10, 10, 10])).unwrap();
    assert_eq!(got, fixture.expected().slice(s![4..6, 5..6, 3..4]));
}

#[test]
fn test_overhang_rejected_when_strict() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let config = ReaderConfig {
        boundary: BoundaryPolicy::Strict,
        ..Default::default()
    };
    let (_, reader) = open_cube(dir.path(), config);

    let err = reader.read_window(&Window::new([4, 0, 0], [3, 1, 1])).unwrap_err();
    assert!(matches!(err, PfbError::OutOfRange { .. }));
    assert!(reader.read_window(&Window::new([4, 0, 0], [2, 1, 1])).is_ok());
}

#[test]
fn test_invalid_windows_rejected() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (_, reader) = open_cube(dir.path(), ReaderConfig::default());

    for window in [
        Window::new([0, 0, 0], [0, 1, 1]),
        Window::new([6, 0, 0], [1, 1, 1]),
        Window::new([0, 0, 4], [1, 1, 1]),
    ] {
        let err = reader.read_window(&window).unwrap_err();
        assert!(err.is_invalid_argument(), "{:?}", window);
    }
}

#[test]
fn test_windows_agree_across_access_modes() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let window = Window::new([1, 1, 1], [4, 4, 2]);

    let mut results = Vec::new();
    for access in [AccessMode::Mmap, AccessMode::Pread] {
        for parallel in [false, true] {
            let config = ReaderConfig {
                access,
                parallel,
                parallel_min_tiles: 1,
                ..Default::default()
            };
            let (_, reader) = open_cube(dir.path(), config);
            results.push(reader.read_window(&window).unwrap());
        }
    }
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_shared_reader_across_threads() {
    let dir = temp_test_dir_with_prefix("pfb_window_");
    let (fixture, reader) = open_cube(dir.path(), ReaderConfig::default());
    let expected = fixture.expected();

    std::thread::scope(|scope| {
        for x in 0..4 {
            let reader = &reader;
            let expected = &expected;
            scope.spawn(move || {
                let got = reader.read_window(&Window::new([x, 0, 0], [3, 6, 4])).unwrap();
                assert_eq!(got, expected.slice(s![x..x + 3, .., ..]));
            });
        }
    });
}
