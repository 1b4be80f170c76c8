//! Open PFB files and assemble their subgrids.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array3, ArrayViewMut3};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::config::ReaderConfig;
use crate::error::{PfbError, PfbResult};
use crate::geometry::{Axis, GeometryTable, Partition, SubgridDescriptor};
use crate::header::{
    infer_partition, GlobalHeader, SubgridHeader, GLOBAL_HEADER_LEN, SUBGRID_HEADER_LEN,
};
use crate::source::{open_source, PfbSource};
use crate::tile::{decode_subgrid, read_subgrid_header};

/// How `read_all` arranges the decoded subgrids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// One array per subgrid, in subgrid-index order.
    Flat,
    /// Subgrids keyed by partition location.
    Tiled,
    /// One dense `nx × ny × nz` array.
    Full,
}

impl AssemblyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Tiled => "tiled",
            Self::Full => "full",
        }
    }
}

impl FromStr for AssemblyMode {
    type Err = PfbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "tiled" => Ok(Self::Tiled),
            "full" => Ok(Self::Full),
            other => Err(PfbError::invalid_argument(format!(
                "mode must be one of flat, tiled, or full; got {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AssemblyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subgrids decoded individually and addressed by partition location.
///
/// Tiles are ragged: shapes differ when an axis does not divide evenly.
#[derive(Debug, Clone)]
pub struct TiledSubgrids {
    partition: Partition,
    tiles: Vec<(SubgridDescriptor, Array3<f64>)>,
}

impl TiledSubgrids {
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// The subgrid at partition location `(pp, qq, rr)`.
    pub fn get(&self, pp: usize, qq: usize, rr: usize) -> Option<&(SubgridDescriptor, Array3<f64>)> {
        if !self.partition.contains(pp, qq, rr) {
            return None;
        }
        self.tiles.get(self.partition.linear_index(pp, qq, rr))
    }

    /// All subgrids in subgrid-index order.
    pub fn iter(&self) -> impl Iterator<Item = &(SubgridDescriptor, Array3<f64>)> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn into_inner(self) -> Vec<(SubgridDescriptor, Array3<f64>)> {
        self.tiles
    }
}

/// Result of [`ParflowBinaryReader::read_all`].
#[derive(Debug, Clone)]
pub enum SubgridData {
    Flat(Vec<Array3<f64>>),
    Tiled(TiledSubgrids),
    Full(Array3<f64>),
}

impl SubgridData {
    pub fn mode(&self) -> AssemblyMode {
        match self {
            Self::Flat(_) => AssemblyMode::Flat,
            Self::Tiled(_) => AssemblyMode::Tiled,
            Self::Full(_) => AssemblyMode::Full,
        }
    }

    pub fn into_full(self) -> Option<Array3<f64>> {
        match self {
            Self::Full(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_flat(self) -> Option<Vec<Array3<f64>>> {
        match self {
            Self::Flat(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_tiled(self) -> Option<TiledSubgrids> {
        match self {
            Self::Tiled(data) => Some(data),
            _ => None,
        }
    }
}

/// Options controlling how a PFB file is opened.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    config: ReaderConfig,
    partition: Option<Partition>,
    layout: Option<(GlobalHeader, Arc<GeometryTable>)>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use known partition counts instead of inferring them.
    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Reuse the header and geometry of a sibling file with the same layout.
    pub fn layout(mut self, header: GlobalHeader, geometry: Arc<GeometryTable>) -> Self {
        self.layout = Some((header, geometry));
        self
    }

    /// Open `path` with these options.
    pub fn open(self, path: impl AsRef<Path>) -> PfbResult<ParflowBinaryReader> {
        ParflowBinaryReader::open_with(path.as_ref(), self)
    }
}

/// An open PFB file.
///
/// The file stays open until [`close`](Self::close) is called or the reader is
/// dropped. All reads are positional, so a reader can be shared across threads.
pub struct ParflowBinaryReader {
    path: PathBuf,
    header: GlobalHeader,
    geometry: Arc<GeometryTable>,
    source: Box<dyn PfbSource>,
    config: ReaderConfig,
}

impl std::fmt::Debug for ParflowBinaryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParflowBinaryReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("subgrids", &self.geometry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ParflowBinaryReader {
    /// Open a PFB file with default configuration.
    pub fn open(path: impl AsRef<Path>) -> PfbResult<Self> {
        OpenOptions::new().open(path)
    }

    #[instrument(skip(path, options), fields(path = %path.display()))]
    fn open_with(path: &Path, options: OpenOptions) -> PfbResult<Self> {
        let OpenOptions {
            config,
            partition,
            layout,
        } = options;
        config.validate()?;

        let len = std::fs::metadata(path)
            .map_err(|e| PfbError::io(path, e))?
            .len();
        if len < GLOBAL_HEADER_LEN {
            return Err(PfbError::format(format!(
                "file is {} bytes, shorter than the {}-byte header",
                len, GLOBAL_HEADER_LEN
            )));
        }

        let source = open_source(path, config.access)?;

        let (header, geometry) = match layout {
            Some((header, geometry)) => {
                if config.validate_stack {
                    let own = GlobalHeader::parse(&source.read_at(0, GLOBAL_HEADER_LEN as usize)?)?;
                    if !own.same_layout(&header) {
                        return Err(PfbError::format(format!(
                            "{} does not share the expected grid layout: extent {:?} with {} subgrids, expected {:?} with {}",
                            path.display(),
                            own.extent,
                            own.n_subgrids,
                            header.extent,
                            header.n_subgrids
                        )));
                    }
                }
                (header, geometry)
            }
            None => {
                let mut header =
                    GlobalHeader::parse(&source.read_at(0, GLOBAL_HEADER_LEN as usize)?)?;

                // Every subgrid carries at least its local header.
                let min_len = GLOBAL_HEADER_LEN + header.n_subgrids as u64 * SUBGRID_HEADER_LEN;
                if source.len() < min_len {
                    return Err(PfbError::format(format!(
                        "truncated file: {} subgrids need at least {} bytes, file holds {}",
                        header.n_subgrids,
                        min_len,
                        source.len()
                    )));
                }
                let partition = match partition.or(header.partition) {
                    Some(partition) => {
                        partition.validate(header.n_subgrids)?;
                        partition
                    }
                    None => {
                        let first = read_subgrid_header(source.as_ref(), GLOBAL_HEADER_LEN)?;
                        infer_partition(&header, &first)?
                    }
                };
                header.partition = Some(partition);
                let geometry =
                    GeometryTable::compute(header.extent, partition, header.n_subgrids)?;
                (header, Arc::new(geometry))
            }
        };

        if source.len() < geometry.total_len() {
            return Err(PfbError::format(format!(
                "truncated file: geometry needs {} bytes, file holds {}",
                geometry.total_len(),
                source.len()
            )));
        }

        debug!(
            extent = ?header.extent,
            partition = %geometry.partition(),
            subgrids = geometry.len(),
            access = %config.access,
            "Opened PFB file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            header,
            geometry,
            source,
            config,
        })
    }

    /// Release the file handle.
    pub fn close(self) {
        debug!(path = %self.path.display(), "Closed PFB file");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Subgrid geometry, shareable with readers of sibling files.
    pub fn geometry(&self) -> &Arc<GeometryTable> {
        &self.geometry
    }

    pub fn partition(&self) -> Partition {
        self.geometry.partition()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub(crate) fn source(&self) -> &dyn PfbSource {
        self.source.as_ref()
    }

    fn descriptor(&self, index: usize) -> PfbResult<&SubgridDescriptor> {
        self.geometry.subgrid(index).ok_or_else(|| {
            PfbError::invalid_argument(format!(
                "subgrid index {} out of range for {} subgrids",
                index,
                self.geometry.len()
            ))
        })
    }

    /// Decode one subgrid by linear index.
    pub fn read_subgrid(&self, index: usize) -> PfbResult<Array3<f64>> {
        decode_subgrid(self.source(), self.descriptor(index)?)
    }

    /// Decode one subgrid by partition location.
    pub fn read_subgrid_at(&self, pp: usize, qq: usize, rr: usize) -> PfbResult<Array3<f64>> {
        let subgrid = self.geometry.at(pp, qq, rr).ok_or_else(|| {
            PfbError::invalid_argument(format!(
                "location ({}, {}, {}) outside partition {}",
                pp,
                qq,
                rr,
                self.geometry.partition()
            ))
        })?;
        decode_subgrid(self.source(), subgrid)
    }

    /// Read the stored local header of one subgrid.
    pub fn read_subgrid_header(&self, index: usize) -> PfbResult<SubgridHeader> {
        read_subgrid_header(self.source(), self.descriptor(index)?.offset)
    }

    /// Decode several subgrids, in order, on the rayon pool when configured.
    pub(crate) fn decode_many(
        &self,
        subgrids: &[&SubgridDescriptor],
    ) -> PfbResult<Vec<Array3<f64>>> {
        let source = self.source();
        if self.config.decode_in_parallel(subgrids.len()) {
            subgrids
                .par_iter()
                .map(|sg| decode_subgrid(source, sg))
                .collect()
        } else {
            subgrids.iter().map(|sg| decode_subgrid(source, sg)).collect()
        }
    }

    /// Read every subgrid, arranged according to `mode` (`flat`, `tiled` or `full`).
    ///
    /// An unknown mode is rejected before any bytes are read.
    pub fn read_all(&self, mode: &str) -> PfbResult<SubgridData> {
        let mode: AssemblyMode = mode.parse()?;
        self.read_all_as(mode)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_all_as(&self, mode: AssemblyMode) -> PfbResult<SubgridData> {
        Ok(match mode {
            AssemblyMode::Flat => SubgridData::Flat(self.read_flat()?),
            AssemblyMode::Tiled => SubgridData::Tiled(self.read_tiled()?),
            AssemblyMode::Full => SubgridData::Full(self.read_full()?),
        })
    }

    /// One array per subgrid, in subgrid-index order.
    pub fn read_flat(&self) -> PfbResult<Vec<Array3<f64>>> {
        let all: Vec<&SubgridDescriptor> = self.geometry.subgrids().iter().collect();
        self.decode_many(&all)
    }

    /// Subgrids paired with their descriptors, addressable by partition location.
    pub fn read_tiled(&self) -> PfbResult<TiledSubgrids> {
        let arrays = self.read_flat()?;
        let tiles = self
            .geometry
            .subgrids()
            .iter()
            .copied()
            .zip(arrays)
            .collect();
        Ok(TiledSubgrids {
            partition: self.geometry.partition(),
            tiles,
        })
    }

    /// The whole grid as one dense `[x, y, z]` array.
    pub fn read_full(&self) -> PfbResult<Array3<f64>> {
        let [nx, ny, nz] = self.geometry.extent();
        let mut out = Array3::<f64>::zeros((nx, ny, nz));
        self.read_full_into(out.view_mut())?;
        Ok(out)
    }

    /// Decode the whole grid into a caller-provided `nx × ny × nz` view.
    pub fn read_full_into(&self, out: ArrayViewMut3<'_, f64>) -> PfbResult<()> {
        let [nx, ny, nz] = self.geometry.extent();
        if out.dim() != (nx, ny, nz) {
            return Err(PfbError::invalid_argument(format!(
                "output shape {:?} does not match grid extent {:?}",
                out.dim(),
                (nx, ny, nz)
            )));
        }

        let subgrids = self.geometry.subgrids();
        let blocks = tile_views(out, &self.geometry);
        let source = self.source();
        let fill = |(mut block, sg): (ArrayViewMut3<'_, f64>, &SubgridDescriptor)| {
            block.assign(&decode_subgrid(source, sg)?);
            Ok::<_, PfbError>(())
        };

        if self.config.decode_in_parallel(subgrids.len()) {
            blocks
                .into_par_iter()
                .zip(subgrids.par_iter())
                .try_for_each(fill)?;
        } else {
            blocks.into_iter().zip(subgrids).try_for_each(fill)?;
        }

        debug!(subgrids = subgrids.len(), "Assembled full grid");
        Ok(())
    }
}

/// Split `out` into one disjoint view per subgrid, in subgrid-index order.
fn tile_views<'a>(
    out: ArrayViewMut3<'a, f64>,
    geometry: &GeometryTable,
) -> Vec<ArrayViewMut3<'a, f64>> {
    let mut views = Vec::with_capacity(geometry.len());
    for slab in split_along(out, Axis::Z, geometry.boundaries(Axis::Z)) {
        for row in split_along(slab, Axis::Y, geometry.boundaries(Axis::Y)) {
            views.extend(split_along(row, Axis::X, geometry.boundaries(Axis::X)));
        }
    }
    views
}

/// Cut `view` along `axis` at the interior tile boundaries.
fn split_along<'a>(
    view: ArrayViewMut3<'a, f64>,
    axis: Axis,
    boundaries: &[usize],
) -> Vec<ArrayViewMut3<'a, f64>> {
    let mut parts = Vec::with_capacity(boundaries.len().saturating_sub(1));
    let mut rest = view;
    let mut cut = 0;
    for &at in &boundaries[1..boundaries.len() - 1] {
        let (head, tail) = rest.split_at(ndarray::Axis(axis.index()), at - cut);
        parts.push(head);
        rest = tail;
        cut = at;
    }
    parts.push(rest);
    parts
}
