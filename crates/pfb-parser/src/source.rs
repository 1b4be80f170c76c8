//! Positional byte sources for PFB data.
//!
//! Every read names its own offset. No source keeps a seek cursor, so a single
//! source can serve tile reads from many threads at once.

use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::Mmap;

use crate::config::AccessMode;
use crate::error::{PfbError, PfbResult};

/// Random-access, read-only view of a PFB file.
pub trait PfbSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Reading past the end is a format error: a well-formed file always
    /// holds every byte its geometry describes.
    fn read_at(&self, offset: u64, len: usize) -> PfbResult<Cow<'_, [u8]>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_bounds(offset: u64, len: usize, available: u64) -> PfbResult<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= available => Ok(()),
        _ => Err(PfbError::format(format!(
            "truncated file: need {} bytes at offset {}, file holds {}",
            len, offset, available
        ))),
    }
}

/// Read-only memory map of a file.
pub struct MmapSource {
    map: Mmap,
}

impl MmapSource {
    pub fn open(path: &Path) -> PfbResult<Self> {
        let file = File::open(path).map_err(|e| PfbError::io(path, e))?;
        // SAFETY: the map is read-only; PFB files are not modified while open.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| PfbError::io(path, e))?;
        Ok(Self { map })
    }
}

impl PfbSource for MmapSource {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> PfbResult<Cow<'_, [u8]>> {
        check_bounds(offset, len, self.len())?;
        let start = offset as usize;
        Ok(Cow::Borrowed(&self.map[start..start + len]))
    }
}

/// File handle read with positional (`pread`-style) calls.
pub struct FileSource {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> PfbResult<Self> {
        let file = File::open(path).map_err(|e| PfbError::io(path, e))?;
        let len = file.metadata().map_err(|e| PfbError::io(path, e))?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl PfbSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> PfbResult<Cow<'_, [u8]>> {
        check_bounds(offset, len, self.len)?;
        let mut buf = vec![0u8; len];
        self.read_exact_at(&mut buf, offset)
            .map_err(|e| PfbError::io(&self.path, e))?;
        Ok(Cow::Owned(buf))
    }
}

impl PfbSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> PfbResult<Cow<'_, [u8]>> {
        check_bounds(offset, len, PfbSource::len(self))?;
        let start = offset as usize;
        Ok(Cow::Borrowed(&self[start..start + len]))
    }
}

/// Open `path` with the requested access strategy.
pub fn open_source(path: &Path, access: AccessMode) -> PfbResult<Box<dyn PfbSource>> {
    Ok(match access {
        AccessMode::Mmap => Box::new(MmapSource::open(path)?),
        AccessMode::Pread => Box::new(FileSource::open(path)?),
    })
}
