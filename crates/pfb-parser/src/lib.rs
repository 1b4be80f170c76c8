//! ParFlow binary (PFB) reader.
//!
//! A PFB file holds one 3-D field of f64 values, written by a p × q × r
//! distributed run as a global header followed by one independently-headered
//! tile ("subgrid") per rank:
//!
//! ```text
//! [global header 64B][sg 0 header 36B][sg 0 payload]...[sg n-1 header][sg n-1 payload]
//! ```
//!
//! The byte offset, shape and start index of every subgrid follow from the
//! global header alone, so the reader never scans payloads to find a tile.
//!
//! # Architecture
//!
//! ```text
//! ParflowBinaryReader::open(path)
//!      │
//!      ├─► GlobalHeader::parse        (64-byte header)
//!      ├─► infer_partition            (first subgrid header, if p/q/r unknown)
//!      └─► GeometryTable::compute     (shapes, starts, offsets; no I/O)
//!
//! read_all(mode)   ─► decode_tile per subgrid ─► flat | tiled | full
//! read_window(w)   ─► covering tiles ─► stitch ─► clip
//! read_stack(files)─► read_full per file into [t, x, y, z]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pfb_parser::{ParflowBinaryReader, Window};
//!
//! let reader = ParflowBinaryReader::open("run.out.press.00010.pfb")?;
//! let field = reader.read_full()?;
//! let column = reader.read_window(&Window::new([10, 20, 0], [1, 1, 50]))?;
//! reader.close();
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod header;
pub mod reader;
pub mod source;
pub mod stack;
pub mod tile;
pub mod window;

use std::path::Path;

use tracing::debug;

// Re-export commonly used types at crate root
pub use config::{AccessMode, BoundaryPolicy, ReaderConfig};
pub use error::{PfbError, PfbResult};
pub use geometry::{Axis, AxisSplit, GeometryTable, Partition, SubgridDescriptor};
pub use header::{infer_partition, GlobalHeader, SubgridHeader, GLOBAL_HEADER_LEN, SUBGRID_HEADER_LEN};
pub use reader::{AssemblyMode, OpenOptions, ParflowBinaryReader, SubgridData, TiledSubgrids};
pub use source::{open_source, FileSource, MmapSource, PfbSource};
pub use stack::{open_sequence, read_stack};
pub use tile::{decode_subgrid, decode_tile, read_subgrid_header};
pub use window::{resolve_window, ResolvedWindow, Window};

/// File extensions recognised as PFB data.
pub const PFB_EXTENSIONS: &[&str] = &["pfb"];

/// Open `path`, read every subgrid in `mode`, and close the file.
pub fn read_pfb(path: impl AsRef<Path>, mode: &str) -> PfbResult<SubgridData> {
    let mode: AssemblyMode = mode.parse()?;
    let reader = ParflowBinaryReader::open(path)?;
    let data = reader.read_all_as(mode)?;
    reader.close();
    Ok(data)
}

/// Whether `path` carries a PFB file extension (case-insensitive).
pub fn is_pfb_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PFB_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Check whether `path` starts with a plausible PFB global header.
///
/// Returns `Ok(false)` for files that are too short or carry non-positive
/// dimensions; I/O failures are returned as errors.
pub fn probe(path: impl AsRef<Path>) -> PfbResult<bool> {
    let path = path.as_ref();
    let source = FileSource::open(path)?;
    let result = source
        .read_at(0, GLOBAL_HEADER_LEN as usize)
        .and_then(|raw| GlobalHeader::parse(&raw));
    match result {
        Ok(header) => {
            debug!(path = %path.display(), extent = ?header.extent, "Probed PFB header");
            Ok(true)
        }
        Err(PfbError::Format(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
