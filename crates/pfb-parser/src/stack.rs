//! Stacking same-geometry PFB files along a leading time axis.

use std::path::Path;

use ndarray::{Array4, ArrayViewMut3};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::config::ReaderConfig;
use crate::error::{PfbError, PfbResult};
use crate::reader::{OpenOptions, ParflowBinaryReader};

/// Read `files` into one `[t, x, y, z]` array.
///
/// Geometry is derived from the first file and reused for the rest. With
/// `validate_stack` set, each later file's header must describe the same grid.
#[instrument(skip(files, config), fields(files = files.len()))]
pub fn read_stack<P>(files: &[P], config: &ReaderConfig) -> PfbResult<Array4<f64>>
where
    P: AsRef<Path> + Sync,
{
    let Some((first_path, rest)) = files.split_first() else {
        return Err(PfbError::invalid_argument("file list is empty"));
    };

    let first = OpenOptions::new()
        .config(config.clone())
        .open(first_path)?;
    let header = first.header().clone();
    let geometry = first.geometry().clone();
    let [nx, ny, nz] = geometry.extent();

    let mut stack = Array4::<f64>::zeros((files.len(), nx, ny, nz));
    let mut slots = stack.axis_iter_mut(ndarray::Axis(0));
    if let Some(slot) = slots.next() {
        first.read_full_into(slot)?;
    }
    first.close();

    let fill = |path: &P, slot: ArrayViewMut3<'_, f64>| -> PfbResult<()> {
        let reader = OpenOptions::new()
            .config(config.clone())
            .layout(header.clone(), geometry.clone())
            .open(path)?;
        reader.read_full_into(slot)?;
        reader.close();
        Ok(())
    };

    if config.parallel {
        slots
            .into_par_iter()
            .zip(rest.par_iter())
            .try_for_each(|(slot, path)| fill(path, slot))?;
    } else {
        for (slot, path) in slots.zip(rest) {
            fill(path, slot)?;
        }
    }

    debug!(
        steps = files.len(),
        extent = ?[nx, ny, nz],
        "Stacked PFB files"
    );
    Ok(stack)
}

/// Open several files that share one grid, computing geometry only once.
pub fn open_sequence<P: AsRef<Path>>(
    files: &[P],
    config: &ReaderConfig,
) -> PfbResult<Vec<ParflowBinaryReader>> {
    let Some((first_path, rest)) = files.split_first() else {
        return Err(PfbError::invalid_argument("file list is empty"));
    };

    let first = OpenOptions::new()
        .config(config.clone())
        .open(first_path)?;
    let header = first.header().clone();
    let geometry = first.geometry().clone();

    let mut readers = Vec::with_capacity(files.len());
    readers.push(first);
    for path in rest {
        readers.push(
            OpenOptions::new()
                .config(config.clone())
                .layout(header.clone(), geometry.clone())
                .open(path)?,
        );
    }
    Ok(readers)
}
