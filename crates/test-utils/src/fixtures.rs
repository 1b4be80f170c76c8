//! Synthetic PFB files for reader tests.

use std::io;
use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::generators::{cell_value, encode_global_header, encode_subgrid_header, split_axis};

/// Common `(extent, partition)` layouts.
pub mod layouts {
    /// 10x10x1 split in two along x; subgrid 1 starts at byte 500.
    pub const TWO_BY_ONE: ([usize; 3], [usize; 3]) = ([10, 10, 1], [2, 1, 1]);

    /// Uneven split on two axes: x into [3, 2, 2], y into [3, 2].
    pub const UNEVEN: ([usize; 3], [usize; 3]) = ([7, 5, 3], [3, 2, 1]);

    /// Split on all three axes.
    pub const CUBE: ([usize; 3], [usize; 3]) = ([6, 6, 4], [2, 3, 2]);

    /// One subgrid holding the whole grid.
    pub const SINGLE: ([usize; 3], [usize; 3]) = ([5, 4, 3], [1, 1, 1]);
}

/// A PFB file written the way a `p × q × r` run writes one.
///
/// Cell values follow [`cell_value`], so a decoded grid can be compared
/// against [`PfbFixture::expected`].
#[derive(Debug, Clone)]
pub struct PfbFixture {
    pub extent: [usize; 3],
    pub partition: [usize; 3],
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub offset: f64,
}

impl PfbFixture {
    pub fn new(extent: [usize; 3], partition: [usize; 3]) -> Self {
        Self {
            extent,
            partition,
            origin: [0.0; 3],
            spacing: [1.0; 3],
            offset: 0.0,
        }
    }

    /// Shifts every cell value by `offset`, e.g. to tell time steps apart.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn n_subgrids(&self) -> usize {
        self.partition.iter().product()
    }

    pub fn value(&self, x: usize, y: usize, z: usize) -> f64 {
        cell_value(self.offset, x, y, z)
    }

    /// The full grid the file decodes to, indexed `[x, y, z]`.
    pub fn expected(&self) -> Array3<f64> {
        let [nx, ny, nz] = self.extent;
        Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| self.value(x, y, z))
    }

    /// Serializes the file: global header, then each subgrid's header and
    /// big-endian payload with x varying fastest, in rank order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let [p, q, r] = self.partition;
        let xs = split_axis(self.extent[0], p);
        let ys = split_axis(self.extent[1], q);
        let zs = split_axis(self.extent[2], r);

        let mut out =
            encode_global_header(self.origin, self.extent, self.spacing, self.n_subgrids());
        for &(z0, sz) in &zs {
            for &(y0, sy) in &ys {
                for &(x0, sx) in &xs {
                    out.extend(encode_subgrid_header([x0, y0, z0], [sx, sy, sz]));
                    for z in z0..z0 + sz {
                        for y in y0..y0 + sy {
                            for x in x0..x0 + sx {
                                out.extend_from_slice(&self.value(x, y, z).to_be_bytes());
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Writes the file to `dir/name` and returns its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}
