//! Byte sources the object store reads from.
//!
//! A source reports its total length and the prefix that is readable right
//! now. For files and buffers the two are the same; a [`ProgressiveSource`]
//! grows its readable prefix as chunks arrive.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Random-access bytes with a possibly incomplete readable prefix.
pub trait ByteSource: Send + Sync {
    /// Total length of the source once fully delivered.
    fn len(&self) -> u64;

    /// The contiguous prefix of the source that can be read now.
    fn available(&self) -> &[u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once every byte is readable.
    fn is_complete(&self) -> bool {
        self.available().len() as u64 >= self.len()
    }

    /// Copy bytes at `offset` into `buf`, returning how many were copied.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let data = self.available();
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        let Some(src) = data.get(start..) else {
            return 0;
        };
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Deliver more bytes. Only growing sources accept this.
    fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let _ = chunk;
        Err(PdfError::Structural("byte source does not accept more data".into()))
    }
}

/// A fully available source backed by shared bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Memory-map a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the map is read-only; callers must not truncate the file
        // while the document is alive.
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(Self::from_mmap(mmap))
    }

    pub fn from_mmap(mmap: Mmap) -> Self {
        Self {
            data: Bytes::from_owner(mmap),
        }
    }

    /// Shared handle to the underlying bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn available(&self) -> &[u8] {
        &self.data
    }
}

/// A source that is being delivered front to back, such as a download.
#[derive(Debug, Clone)]
pub struct ProgressiveSource {
    buf: Vec<u8>,
    total: u64,
}

impl ProgressiveSource {
    /// An empty source that will eventually hold `total` bytes.
    pub fn new(total: u64) -> Self {
        Self {
            buf: Vec::new(),
            total,
        }
    }

    /// Append the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        if self.buf.len() as u64 + chunk.len() as u64 > self.total {
            return Err(PdfError::Structural(format!(
                "received more than the declared {} bytes",
                self.total
            )));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }
}

impl ByteSource for ProgressiveSource {
    fn len(&self) -> u64 {
        self.total
    }

    fn available(&self) -> &[u8] {
        &self.buf
    }

    fn append(&mut self, chunk: &[u8]) -> Result<()> {
        self.push(chunk)
    }
}
