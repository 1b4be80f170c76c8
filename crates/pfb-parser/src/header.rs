//! Global and subgrid header decoding.
//!
//! # Layout
//!
//! All fields are big-endian.
//!
//! ```text
//! Global header (64 bytes)
//!   0..24   f64 x0, y0, z0       origin
//!  24..36   i32 nx, ny, nz       grid extent
//!  36..60   f64 dx, dy, dz       cell spacing
//!  60..64   i32 n_subgrids
//!
//! Subgrid header (36 bytes, repeated before every payload)
//!   0..12   i32 ix, iy, iz       start index
//!  12..24   i32 nx, ny, nz       shape
//!  24..36   i32 rx, ry, rz       refinement ratio
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PfbError, PfbResult};
use crate::geometry::Partition;

/// Length of the global header in bytes.
pub const GLOBAL_HEADER_LEN: u64 = 64;

/// Length of each subgrid's local header in bytes.
pub const SUBGRID_HEADER_LEN: u64 = 36;

/// Added to `extent / shape` before truncation, turning it into a ceiling.
const PARTITION_EPSILON_BIAS: f64 = 1.0 - 1e-6;

/// The global PFB header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalHeader {
    /// Grid origin `(x0, y0, z0)`.
    pub origin: [f64; 3],
    /// Cells along each axis `(nx, ny, nz)`.
    pub extent: [usize; 3],
    /// Cell spacing `(dx, dy, dz)`.
    pub spacing: [f64; 3],
    /// Number of subgrids stored in the file.
    pub n_subgrids: usize,
    /// Partition counts, once supplied or inferred.
    pub partition: Option<Partition>,
}

impl GlobalHeader {
    /// Decode the 64-byte global header from the start of `data`.
    pub fn parse(data: &[u8]) -> PfbResult<Self> {
        if (data.len() as u64) < GLOBAL_HEADER_LEN {
            return Err(PfbError::format(format!(
                "global header needs {} bytes, found {}",
                GLOBAL_HEADER_LEN,
                data.len()
            )));
        }

        let origin = [be_f64(data, 0), be_f64(data, 8), be_f64(data, 16)];
        let extent = [
            positive(be_i32(data, 24), "nx")?,
            positive(be_i32(data, 28), "ny")?,
            positive(be_i32(data, 32), "nz")?,
        ];
        let spacing = [be_f64(data, 36), be_f64(data, 44), be_f64(data, 52)];
        let n_subgrids = positive(be_i32(data, 60), "n_subgrids")?;

        Ok(Self {
            origin,
            extent,
            spacing,
            n_subgrids,
            partition: None,
        })
    }

    /// Total number of cells in the grid, or `None` if it overflows `usize`.
    pub fn cells(&self) -> Option<usize> {
        self.extent
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
    }

    /// Whether two headers describe the same grid layout.
    ///
    /// Partition counts are derived, so they are not compared.
    pub fn same_layout(&self, other: &GlobalHeader) -> bool {
        self.extent == other.extent
            && self.n_subgrids == other.n_subgrids
            && self.origin == other.origin
            && self.spacing == other.spacing
    }
}

/// A subgrid's stored local header.
///
/// Start indices and refinement ratios are informational; only the shape of
/// the first subgrid is used, to infer partition counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgridHeader {
    pub start: [i32; 3],
    pub shape: [i32; 3],
    pub refinement: [i32; 3],
}

impl SubgridHeader {
    /// Decode a 36-byte subgrid header from the start of `data`.
    pub fn parse(data: &[u8]) -> PfbResult<Self> {
        if (data.len() as u64) < SUBGRID_HEADER_LEN {
            return Err(PfbError::format(format!(
                "subgrid header needs {} bytes, found {}",
                SUBGRID_HEADER_LEN,
                data.len()
            )));
        }

        let field = |i: usize| be_i32(data, i * 4);
        Ok(Self {
            start: [field(0), field(1), field(2)],
            shape: [field(3), field(4), field(5)],
            refinement: [field(6), field(7), field(8)],
        })
    }
}

/// Infer `(p, q, r)` from the grid extent and the first subgrid's shape.
///
/// The first subgrid is always one of the larger tiles, so
/// `ceil(extent / first_shape)` recovers the tile count on each axis.
pub fn infer_partition(header: &GlobalHeader, first: &SubgridHeader) -> PfbResult<Partition> {
    let mut counts = [0usize; 3];
    for (axis, count) in counts.iter_mut().enumerate() {
        let shape = first.shape[axis];
        if shape <= 0 || shape as usize > header.extent[axis] {
            return Err(PfbError::format(format!(
                "cannot infer partition: first subgrid has shape {:?} in a {:?} grid",
                first.shape, header.extent
            )));
        }
        let ratio = header.extent[axis] as f64 / f64::from(shape);
        *count = (ratio + PARTITION_EPSILON_BIAS) as usize;
    }

    let partition = Partition::new(counts[0], counts[1], counts[2]);
    partition.validate(header.n_subgrids)?;
    Ok(partition)
}

fn be_f64(data: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[at..at + 8]);
    f64::from_be_bytes(raw)
}

fn be_i32(data: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn positive(value: i32, name: &str) -> PfbResult<usize> {
    if value <= 0 {
        return Err(PfbError::format(format!(
            "{} must be positive, found {}",
            name, value
        )));
    }
    Ok(value as usize)
}
