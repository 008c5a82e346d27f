//! Byte-range access to the backing document.
//!
//! Lazy mode keeps only `(offset, length)` locators at load time and reads
//! feature text back on demand. Each query opens its own [`RangeReader`]
//! (its own file handle for file-backed documents) and drops it when the
//! query's result set is dropped, so concurrent queries never share a seek
//! position.

use crate::error::{GeoJsonError, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

/// Read buffer for the one-pass extraction scan.
const SCAN_BUFFER_SIZE: usize = 256 * 1024;

/// Backing bytes of a loaded document.
#[derive(Debug, Clone)]
pub enum ByteRangeStore {
    /// Inline document text.
    Memory(Arc<str>),
    /// Document on disk; `size` is captured at load.
    File { path: PathBuf, size: u64 },
}

impl ByteRangeStore {
    pub fn memory(text: Arc<str>) -> Self {
        ByteRangeStore::Memory(text)
    }

    /// Stat a file-backed document.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        Ok(ByteRangeStore::File { path, size })
    }

    /// Total document size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            ByteRangeStore::Memory(text) => text.len() as u64,
            ByteRangeStore::File { size, .. } => *size,
        }
    }

    /// Sequential reader over the whole document, for the extraction scan.
    pub fn scan_reader(&self) -> Result<Box<dyn BufRead + '_>> {
        match self {
            ByteRangeStore::Memory(text) => Ok(Box::new(text.as_bytes())),
            ByteRangeStore::File { path, .. } => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::with_capacity(SCAN_BUFFER_SIZE, file)))
            }
        }
    }

    /// Open a reader for random-access range reads.
    pub fn open(&self) -> Result<RangeReader> {
        let source = match self {
            ByteRangeStore::Memory(text) => RangeSource::Memory(Arc::clone(text)),
            ByteRangeStore::File { path, .. } => RangeSource::File(File::open(path)?),
        };
        Ok(RangeReader {
            source,
            size: self.size(),
            buf: Vec::new(),
        })
    }

    /// Read one range with a short-lived reader.
    pub fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut reader = self.open()?;
        Ok(reader.read(offset, length)?.to_vec())
    }
}

#[derive(Debug)]
enum RangeSource {
    Memory(Arc<str>),
    File(File),
}

/// Scoped random-access reader. The file handle closes on drop.
#[derive(Debug)]
pub struct RangeReader {
    source: RangeSource,
    size: u64,
    buf: Vec<u8>,
}

impl RangeReader {
    /// Read `length` bytes at `offset`. The returned slice is valid until the
    /// next read.
    ///
    /// A range past the end of the document is a parse error at `offset`,
    /// not an I/O error. That covers a file truncated after load, which the
    /// size check alone cannot see.
    pub fn read(&mut self, offset: u64, length: u64) -> Result<&[u8]> {
        let size = self.size;
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= size)
            .ok_or_else(|| outside_document(offset, length, size))?;

        match &mut self.source {
            RangeSource::Memory(text) => Ok(&text.as_bytes()[offset as usize..end as usize]),
            RangeSource::File(file) => {
                self.buf.resize(length as usize, 0);
                file.seek(SeekFrom::Start(offset))?;
                match file.read_exact(&mut self.buf) {
                    Ok(()) => Ok(&self.buf),
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        Err(outside_document(offset, length, size))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

fn outside_document(offset: u64, length: u64, size: u64) -> GeoJsonError {
    GeoJsonError::parse_at(
        offset,
        format!(
            "byte range {}..{} outside document of {} bytes",
            offset,
            offset.saturating_add(length),
            size
        ),
    )
}
