//! Generators for synthetic PFB grids.
//!
//! Values follow a fixed pattern so any decoded cell can be checked against
//! its global index without keeping the source data around.

/// Value stored at global index `(x, y, z)`: `offset + x·10000 + y·100 + z`.
///
/// Unique as long as `y < 100` and `z < 100`.
pub fn cell_value(offset: f64, x: usize, y: usize, z: usize) -> f64 {
    offset + (x * 10_000 + y * 100 + z) as f64
}

/// Splits `extent` cells over `parts` ranks, returning `(start, shape)` per
/// rank. The first `extent % parts` ranks get one extra cell.
///
/// # Example
///
/// ```
/// use test_utils::split_axis;
///
/// assert_eq!(split_axis(7, 3), vec![(0, 3), (3, 2), (5, 2)]);
/// assert_eq!(split_axis(10, 2), vec![(0, 5), (5, 5)]);
/// ```
pub fn split_axis(extent: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = extent / parts;
    let rem = extent % parts;
    let mut start = 0;
    (0..parts)
        .map(|pos| {
            let shape = base + usize::from(pos < rem);
            let entry = (start, shape);
            start += shape;
            entry
        })
        .collect()
}

/// Encodes the 64-byte global header.
pub fn encode_global_header(
    origin: [f64; 3],
    extent: [usize; 3],
    spacing: [f64; 3],
    n_subgrids: usize,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    for v in origin {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for n in extent {
        out.extend_from_slice(&(n as i32).to_be_bytes());
    }
    for v in spacing {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&(n_subgrids as i32).to_be_bytes());
    out
}

/// Encodes one 36-byte subgrid header with unit refinement.
pub fn encode_subgrid_header(start: [usize; 3], shape: [usize; 3]) -> Vec<u8> {
    start
        .iter()
        .chain(shape.iter())
        .map(|&v| v as i32)
        .chain([1, 1, 1])
        .flat_map(i32::to_be_bytes)
        .collect()
}
