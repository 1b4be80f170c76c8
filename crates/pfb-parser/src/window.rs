//! Bounding-box reads that span several subgrids.
//!
//! A window is resolved to the covering tiles on each axis, those tiles are
//! decoded and stitched into one buffer spanning their union, and the buffer is
//! clipped to the requested range:
//!
//! ```text
//! +-------+-------+
//! |       |       |
//! |      x|xx     |
//! +-------+-------+
//! |      x|xx     |
//! |      x|xx     |
//! +-------+-------+
//! ```

use std::ops::RangeInclusive;

use ndarray::{s, Array3};
use tracing::{debug, instrument, warn};

use crate::config::BoundaryPolicy;
use crate::error::{PfbError, PfbResult};
use crate::geometry::{Axis, GeometryTable, SubgridDescriptor};
use crate::reader::ParflowBinaryReader;

/// An axis-aligned block of the grid: `[start, start + length)` on each axis.
///
/// Without an explicit depth the window runs from `start[2]` to the top of
/// whatever grid it is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: [usize; 3],
    pub length_xy: [usize; 2],
    pub depth: Option<usize>,
}

impl Window {
    pub fn new(start: [usize; 3], length: [usize; 3]) -> Self {
        Self {
            start,
            length_xy: [length[0], length[1]],
            depth: Some(length[2]),
        }
    }

    /// A window spanning every layer from `start[2]` to the top of the grid.
    pub fn with_default_depth(start: [usize; 3], length_xy: [usize; 2]) -> Self {
        Self {
            start,
            length_xy,
            depth: None,
        }
    }

    /// The whole grid.
    pub fn full(extent: [usize; 3]) -> Self {
        Self::new([0, 0, 0], extent)
    }

    /// Lengths on each axis for a grid with `nz` layers.
    pub fn length(&self, nz: usize) -> [usize; 3] {
        let depth = self
            .depth
            .unwrap_or_else(|| nz.saturating_sub(self.start[2]));
        [self.length_xy[0], self.length_xy[1], depth]
    }

    /// Exclusive end index on each axis for a grid with `nz` layers.
    pub fn end(&self, nz: usize) -> [usize; 3] {
        let length = self.length(nz);
        [0, 1, 2].map(|a| self.start[a].saturating_add(length[a]))
    }
}

/// A window checked against a geometry and mapped onto tile ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindow {
    /// First index read on each axis.
    pub start: [usize; 3],
    /// Exclusive end on each axis, after clamping.
    pub end: [usize; 3],
    /// Covering tile positions on each axis.
    pub tiles: [RangeInclusive<usize>; 3],
    /// Whether any axis was clamped to the grid boundary.
    pub clamped: bool,
}

impl ResolvedWindow {
    /// Output shape `[nx, ny, nz]`.
    pub fn shape(&self) -> [usize; 3] {
        [0, 1, 2].map(|a| self.end[a] - self.start[a])
    }

    /// Number of subgrids the window touches.
    pub fn tile_count(&self) -> usize {
        self.tiles.iter().map(|r| r.clone().count()).product()
    }
}

/// Validate `window` against `geometry` and find the tiles it covers.
///
/// No I/O. Zero lengths and starts past the extent are invalid arguments; an
/// end past the extent is clamped to the last index or rejected, depending
/// on `policy`, the same way on every axis.
pub fn resolve_window(
    geometry: &GeometryTable,
    window: &Window,
    policy: BoundaryPolicy,
) -> PfbResult<ResolvedWindow> {
    let extent = geometry.extent();
    let length = window.length(extent[2]);
    let requested_end = window.end(extent[2]);
    let mut end = [0usize; 3];
    let mut clamped = false;

    for axis in Axis::ALL {
        let a = axis.index();
        if length[a] == 0 {
            return Err(PfbError::invalid_argument(format!(
                "window length along {} must be positive",
                axis
            )));
        }
        if window.start[a] >= extent[a] {
            return Err(PfbError::invalid_argument(format!(
                "window start {} along {} is beyond grid extent {}",
                window.start[a], axis, extent[a]
            )));
        }
        if requested_end[a] > extent[a] {
            if policy == BoundaryPolicy::Strict {
                return Err(PfbError::out_of_range(
                    format!("{}=[{}, {})", axis, window.start[a], requested_end[a]),
                    format!("n{}={}", axis, extent[a]),
                ));
            }
            clamped = true;
        }
        end[a] = requested_end[a].min(extent[a]);
    }

    let covering = |axis: Axis| {
        let a = axis.index();
        geometry
            .tiles_covering(axis, window.start[a], end[a])
            .ok_or_else(|| {
                PfbError::invalid_argument(format!("empty window along {}", axis))
            })
    };

    Ok(ResolvedWindow {
        start: window.start,
        end,
        tiles: [covering(Axis::X)?, covering(Axis::Y)?, covering(Axis::Z)?],
        clamped,
    })
}

impl ParflowBinaryReader {
    /// Read an axis-aligned block of the grid, indexed `[x, y, z]`.
    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub fn read_window(&self, window: &Window) -> PfbResult<Array3<f64>> {
        let geometry = self.geometry();
        let resolved = resolve_window(geometry, window, self.config().boundary)?;
        if resolved.clamped {
            warn!(
                requested = ?window.end(geometry.extent()[2]),
                extent = ?geometry.extent(),
                "Window clamped to grid boundary"
            );
        }

        let [xs, ys, zs] = resolved.tiles.clone();
        let mut covering: Vec<&SubgridDescriptor> = Vec::with_capacity(resolved.tile_count());
        for rr in zs.clone() {
            for qq in ys.clone() {
                for pp in xs.clone() {
                    let subgrid = geometry.at(pp, qq, rr).ok_or_else(|| {
                        PfbError::format(format!("no subgrid at ({}, {}, {})", pp, qq, rr))
                    })?;
                    covering.push(subgrid);
                }
            }
        }
        let tiles = self.decode_many(&covering)?;

        // Union of the covering tiles, in global indices.
        let union_min = [
            geometry.boundaries(Axis::X)[*xs.start()],
            geometry.boundaries(Axis::Y)[*ys.start()],
            geometry.boundaries(Axis::Z)[*zs.start()],
        ];
        let union_max = [
            geometry.boundaries(Axis::X)[*xs.end() + 1],
            geometry.boundaries(Axis::Y)[*ys.end() + 1],
            geometry.boundaries(Axis::Z)[*zs.end() + 1],
        ];

        let mut union = Array3::<f64>::zeros((
            union_max[0] - union_min[0],
            union_max[1] - union_min[1],
            union_max[2] - union_min[2],
        ));
        for (sg, tile) in covering.iter().zip(&tiles) {
            let o = [0, 1, 2].map(|a| sg.start[a] - union_min[a]);
            let [sx, sy, sz] = sg.shape;
            union
                .slice_mut(s![o[0]..o[0] + sx, o[1]..o[1] + sy, o[2]..o[2] + sz])
                .assign(tile);
        }

        let lo = [0, 1, 2].map(|a| resolved.start[a] - union_min[a]);
        let hi = [0, 1, 2].map(|a| resolved.end[a] - union_min[a]);

        debug!(
            tiles = covering.len(),
            shape = ?resolved.shape(),
            "Read window"
        );

        Ok(union
            .slice(s![lo[0]..hi[0], lo[1]..hi[1], lo[2]..hi[2]])
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Partition;

    fn geometry() -> GeometryTable {
        // x: [0,3) [3,5) [5,7); y: [0,3) [3,5); z: [0,3)
        GeometryTable::compute([7, 5, 3], Partition::new(3, 2, 1), 6).unwrap()
    }

    #[test]
    fn test_resolve_single_tile() {
        let resolved =
            resolve_window(&geometry(), &Window::new([0, 0, 0], [2, 2, 1]), BoundaryPolicy::Clamp)
                .unwrap();
        assert_eq!(resolved.tiles, [0..=0, 0..=0, 0..=0]);
        assert_eq!(resolved.shape(), [2, 2, 1]);
        assert_eq!(resolved.tile_count(), 1);
        assert!(!resolved.clamped);
    }

    #[test]
    fn test_resolve_spanning_tiles() {
        let resolved =
            resolve_window(&geometry(), &Window::new([2, 2, 0], [2, 2, 3]), BoundaryPolicy::Clamp)
                .unwrap();
        assert_eq!(resolved.tiles, [0..=1, 0..=1, 0..=0]);
        assert_eq!(resolved.tile_count(), 4);
    }

    #[test]
    fn test_end_on_tile_boundary_excludes_next_tile() {
        let resolved =
            resolve_window(&geometry(), &Window::new([0, 0, 0], [3, 3, 3]), BoundaryPolicy::Clamp)
                .unwrap();
        assert_eq!(resolved.tiles, [0..=0, 0..=0, 0..=0]);
    }

    #[test]
    fn test_clamp_is_symmetric_across_axes() {
        let resolved = resolve_window(
            &geometry(),
            &Window::new([5, 3, 1], [10, 10, 10]),
            BoundaryPolicy::Clamp,
        )
        .unwrap();
        assert!(resolved.clamped);
        assert_eq!(resolved.end, [7, 5, 3]);
        assert_eq!(resolved.tiles, [2..=2, 1..=1, 0..=0]);
    }

    #[test]
    fn test_strict_policy_rejects_overhang() {
        for length in [[3, 1, 1], [1, 3, 1], [1, 1, 4]] {
            let err = resolve_window(
                &geometry(),
                &Window::new([5, 3, 0], length),
                BoundaryPolicy::Strict,
            )
            .unwrap_err();
            assert!(matches!(err, PfbError::OutOfRange { .. }), "{:?}", length);
        }

        // Ending exactly at the extent is fine.
        assert!(resolve_window(
            &geometry(),
            &Window::new([5, 3, 0], [2, 2, 3]),
            BoundaryPolicy::Strict
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_windows() {
        let g = geometry();
        let err = resolve_window(&g, &Window::new([0, 0, 0], [0, 1, 1]), BoundaryPolicy::Clamp)
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = resolve_window(&g, &Window::new([7, 0, 0], [1, 1, 1]), BoundaryPolicy::Clamp)
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = resolve_window(&g, &Window::new([0, 0, 3], [1, 1, 1]), BoundaryPolicy::Strict)
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_default_depth() {
        let window = Window::with_default_depth([1, 2, 1], [3, 2]);
        assert_eq!(window.length(3), [3, 2, 2]);
        assert_eq!(window.end(3), [4, 4, 3]);
        assert_eq!(window.length(10), [3, 2, 9]);
        assert_eq!(Window::full([7, 5, 3]).end(3), [7, 5, 3]);
    }

    #[test]
    fn test_default_depth_resolves_against_geometry() {
        let g = geometry();
        let resolved = resolve_window(
            &g,
            &Window::with_default_depth([0, 0, 1], [2, 2]),
            BoundaryPolicy::Strict,
        )
        .unwrap();
        assert_eq!(resolved.end, [2, 2, 3]);
        assert!(!resolved.clamped);

        // Starting above the top layer leaves nothing to read.
        let err = resolve_window(
            &g,
            &Window::with_default_depth([0, 0, 3], [2, 2]),
            BoundaryPolicy::Clamp,
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
