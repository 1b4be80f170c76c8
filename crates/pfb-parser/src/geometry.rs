//! Subgrid geometry derived from grid extent and partition counts.
//!
//! Every subgrid's shape, start index, partition location and byte offset is
//! computable from the global header alone. Nothing here touches file bytes.
//!
//! Along one axis with `extent` cells split into `parts` tiles, the first
//! `extent % parts` tiles carry one extra cell:
//!
//! ```text
//! extent = 7, parts = 3
//!
//!   pos:    0        1      2
//!         [x x x] [x x] [x x]
//!   start:  0        3      5
//! ```

use std::ops::{Range, RangeInclusive};

use serde::{Deserialize, Serialize};

use crate::error::{PfbError, PfbResult};
use crate::header::{GLOBAL_HEADER_LEN, SUBGRID_HEADER_LEN};

/// Size of one stored value (big-endian f64).
pub const VALUE_LEN: u64 = 8;

/// Grid axis, in storage order (x varies fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of this axis in `[x, y, z]` arrays.
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Lowercase axis name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Number of tiles along each axis (p × q × r ranks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub p: usize,
    pub q: usize,
    pub r: usize,
}

impl Partition {
    pub fn new(p: usize, q: usize, r: usize) -> Self {
        Self { p, q, r }
    }

    /// Total number of subgrids (p·q·r), saturating at `usize::MAX`.
    pub fn count(&self) -> usize {
        self.checked_count().unwrap_or(usize::MAX)
    }

    /// p·q·r, or `None` if the product overflows.
    pub fn checked_count(&self) -> Option<usize> {
        self.p.checked_mul(self.q)?.checked_mul(self.r)
    }

    /// Tile count along one axis.
    pub fn parts(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.p,
            Axis::Y => self.q,
            Axis::Z => self.r,
        }
    }

    /// Check that every count is positive and that they multiply to `n_subgrids`.
    pub fn validate(&self, n_subgrids: usize) -> PfbResult<()> {
        if self.p == 0 || self.q == 0 || self.r == 0 {
            return Err(PfbError::format(format!(
                "partition counts must be positive, got p={} q={} r={}",
                self.p, self.q, self.r
            )));
        }
        if self.checked_count() != Some(n_subgrids) {
            return Err(PfbError::format(format!(
                "partition {}x{}x{} does not divide into {} subgrids",
                self.p, self.q, self.r, n_subgrids
            )));
        }
        Ok(())
    }

    /// Unravel a linear subgrid index into `(pp, qq, rr)`, x fastest.
    pub fn location(&self, index: usize) -> [usize; 3] {
        let plane = self.p * self.q;
        let rr = index / plane;
        let qq = (index - rr * plane) / self.p;
        let pp = index - rr * plane - qq * self.p;
        [pp, qq, rr]
    }

    /// Linear subgrid index of partition location `(pp, qq, rr)`.
    pub fn linear_index(&self, pp: usize, qq: usize, rr: usize) -> usize {
        pp + self.p * qq + self.p * self.q * rr
    }

    /// Whether `(pp, qq, rr)` lies inside the partition.
    pub fn contains(&self, pp: usize, qq: usize, rr: usize) -> bool {
        pp < self.p && qq < self.q && rr < self.r
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.p, self.q, self.r)
    }
}

/// How one axis of the grid is divided among its tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSplit {
    /// Cells along the axis.
    pub extent: usize,
    /// Tiles along the axis.
    pub parts: usize,
    /// `ceil(extent / parts)`: size of the larger tiles.
    pub base: usize,
    /// `extent % parts`: number of tiles that receive `base` cells when uneven.
    pub remainder: usize,
}

impl AxisSplit {
    /// Split `extent` cells into `parts` tiles. `parts` must be positive.
    pub fn new(extent: usize, parts: usize) -> Self {
        Self {
            extent,
            parts,
            base: extent.div_ceil(parts),
            remainder: extent % parts,
        }
    }

    /// Cells held by the tile at `pos`.
    pub fn shape_at(&self, pos: usize) -> usize {
        if self.remainder == 0 || pos < self.remainder {
            self.base
        } else {
            self.base.saturating_sub(1)
        }
    }

    /// First global index covered by the tile at `pos`.
    pub fn start_at(&self, pos: usize) -> usize {
        if self.remainder == 0 {
            pos * self.base
        } else {
            pos * self.base.saturating_sub(1) + pos.min(self.remainder)
        }
    }

    /// Tile boundaries: the start of every tile followed by `extent`.
    pub fn boundaries(&self) -> Vec<usize> {
        (0..self.parts)
            .map(|pos| self.start_at(pos))
            .chain(std::iter::once(self.extent))
            .collect()
    }
}

/// Location, shape and byte offset of one subgrid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgridDescriptor {
    /// Linear subgrid index (`pp + p·qq + p·q·rr`).
    pub index: usize,
    /// Partition location `(pp, qq, rr)`.
    pub location: [usize; 3],
    /// Cells along x, y and z.
    pub shape: [usize; 3],
    /// First global index along x, y and z.
    pub start: [usize; 3],
    /// Byte offset of this subgrid's local header.
    pub offset: u64,
}

impl SubgridDescriptor {
    /// Number of values in the payload.
    pub fn cells(&self) -> usize {
        self.shape.iter().product()
    }

    /// Byte offset of the first payload value.
    pub fn payload_offset(&self) -> u64 {
        self.offset + SUBGRID_HEADER_LEN
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> u64 {
        self.cells() as u64 * VALUE_LEN
    }

    /// Global index range covered along `axis`.
    pub fn range(&self, axis: Axis) -> Range<usize> {
        let a = axis.index();
        self.start[a]..self.start[a] + self.shape[a]
    }
}

/// All subgrid descriptors of one file plus per-axis lookup tables.
///
/// Computed once when a file is opened and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryTable {
    extent: [usize; 3],
    partition: Partition,
    splits: [AxisSplit; 3],
    boundaries: [Vec<usize>; 3],
    subgrids: Vec<SubgridDescriptor>,
    total_len: u64,
}

impl GeometryTable {
    /// Derive every subgrid descriptor from grid extent and partition counts.
    ///
    /// Offsets are accumulated in subgrid-index order: each subgrid starts where
    /// the previous subgrid's payload ends.
    pub fn compute(
        extent: [usize; 3],
        partition: Partition,
        n_subgrids: usize,
    ) -> PfbResult<Self> {
        partition.validate(n_subgrids)?;

        for axis in Axis::ALL {
            let cells = extent[axis.index()];
            let parts = partition.parts(axis);
            if cells < parts {
                return Err(PfbError::format(format!(
                    "{} tiles along {} exceed the {} cells available",
                    parts, axis, cells
                )));
            }
        }

        let splits = [
            AxisSplit::new(extent[0], partition.p),
            AxisSplit::new(extent[1], partition.q),
            AxisSplit::new(extent[2], partition.r),
        ];

        let overflow = || {
            PfbError::format(format!(
                "grid {:?} split {} is too large to address",
                extent, partition
            ))
        };

        let mut subgrids = Vec::with_capacity(n_subgrids);
        let mut offset = GLOBAL_HEADER_LEN;
        for index in 0..n_subgrids {
            let location = partition.location(index);
            let shape = [0, 1, 2].map(|a| splits[a].shape_at(location[a]));
            let start = [0, 1, 2].map(|a| splits[a].start_at(location[a]));
            let payload_len = shape
                .iter()
                .try_fold(VALUE_LEN, |acc, &n| acc.checked_mul(n as u64))
                .ok_or_else(overflow)?;
            subgrids.push(SubgridDescriptor {
                index,
                location,
                shape,
                start,
                offset,
            });
            offset = offset
                .checked_add(SUBGRID_HEADER_LEN)
                .and_then(|o| o.checked_add(payload_len))
                .ok_or_else(overflow)?;
        }

        Ok(Self {
            extent,
            partition,
            boundaries: [
                splits[0].boundaries(),
                splits[1].boundaries(),
                splits[2].boundaries(),
            ],
            splits,
            subgrids,
            total_len: offset,
        })
    }

    /// Grid extent `[nx, ny, nz]`.
    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Per-axis split parameters.
    pub fn split(&self, axis: Axis) -> &AxisSplit {
        &self.splits[axis.index()]
    }

    /// Descriptors in subgrid-index order.
    pub fn subgrids(&self) -> &[SubgridDescriptor] {
        &self.subgrids
    }

    /// Number of subgrids.
    pub fn len(&self) -> usize {
        self.subgrids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgrids.is_empty()
    }

    /// Descriptor by linear index.
    pub fn subgrid(&self, index: usize) -> Option<&SubgridDescriptor> {
        self.subgrids.get(index)
    }

    /// Descriptor by partition location.
    pub fn at(&self, pp: usize, qq: usize, rr: usize) -> Option<&SubgridDescriptor> {
        if !self.partition.contains(pp, qq, rr) {
            return None;
        }
        self.subgrids.get(self.partition.linear_index(pp, qq, rr))
    }

    /// Byte length of a complete file with this layout.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Tile sizes along `axis`, in partition order.
    pub fn chunks(&self, axis: Axis) -> Vec<usize> {
        let split = self.split(axis);
        (0..split.parts).map(|pos| split.shape_at(pos)).collect()
    }

    /// Global index range covered by each tile along `axis`.
    pub fn coords(&self, axis: Axis) -> Vec<Range<usize>> {
        self.boundaries(axis)
            .windows(2)
            .map(|pair| pair[0]..pair[1])
            .collect()
    }

    /// Cumulative tile boundaries along `axis` (`parts + 1` entries).
    pub fn boundaries(&self, axis: Axis) -> &[usize] {
        &self.boundaries[axis.index()]
    }

    /// Partition position of the tile holding global `index` along `axis`.
    ///
    /// Binary search over the cumulative boundaries; `None` past the extent.
    pub fn tile_containing(&self, axis: Axis, index: usize) -> Option<usize> {
        if index >= self.extent[axis.index()] {
            return None;
        }
        let bounds = self.boundaries(axis);
        Some(bounds[1..].partition_point(|&end| end <= index))
    }

    /// Tiles along `axis` overlapping the half-open range `[start, end)`.
    ///
    /// `end` is clamped to the extent; an empty or out-of-grid range yields `None`.
    pub fn tiles_covering(
        &self,
        axis: Axis,
        start: usize,
        end: usize,
    ) -> Option<RangeInclusive<usize>> {
        let end = end.min(self.extent[axis.index()]);
        if start >= end {
            return None;
        }
        let first = self.tile_containing(axis, start)?;
        let last = self.tile_containing(axis, end - 1)?;
        Some(first..=last)
    }
}
