//! Decoding of individual subgrid payloads.

use ndarray::{Array3, ShapeBuilder};

use crate::error::{PfbError, PfbResult};
use crate::geometry::{SubgridDescriptor, VALUE_LEN};
use crate::header::{SubgridHeader, SUBGRID_HEADER_LEN};
use crate::source::PfbSource;

/// Decode the tile whose local header starts at `offset`.
///
/// The payload follows the 36-byte local header and holds `sx·sy·sz`
/// big-endian f64 values with x varying fastest. The result is indexed
/// `[x, y, z]`.
pub fn decode_tile(
    source: &dyn PfbSource,
    offset: u64,
    shape: [usize; 3],
) -> PfbResult<Array3<f64>> {
    let cells: usize = shape.iter().product();
    let raw = source.read_at(offset + SUBGRID_HEADER_LEN, cells * VALUE_LEN as usize)?;

    let values: Vec<f64> = raw
        .chunks_exact(VALUE_LEN as usize)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            f64::from_be_bytes(word)
        })
        .collect();

    Array3::from_shape_vec((shape[0], shape[1], shape[2]).f(), values)
        .map_err(|e| PfbError::format(format!("tile at offset {}: {}", offset, e)))
}

/// Decode the payload of one subgrid.
pub fn decode_subgrid(
    source: &dyn PfbSource,
    subgrid: &SubgridDescriptor,
) -> PfbResult<Array3<f64>> {
    decode_tile(source, subgrid.offset, subgrid.shape)
}

/// Read the stored local header of the subgrid at `offset`.
pub fn read_subgrid_header(source: &dyn PfbSource, offset: u64) -> PfbResult<SubgridHeader> {
    let raw = source.read_at(offset, SUBGRID_HEADER_LEN as usize)?;
    SubgridHeader::parse(&raw)
}
