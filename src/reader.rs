use crate::boxes::FourCC;
use byteorder::{BigEndian, ByteOrder};

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("offset {offset} + count {count} overflows the addressable range")]
    Overflow { offset: u64, count: u64 },
    #[error("requested range {offset}..{end} is out of bounds (source length {len})")]
    OutOfBounds { offset: u64, end: u64, len: u64 },
    #[error("truncated read at {offset}: expected {expected} bytes, got {actual}")]
    Truncated { offset: u64, expected: usize, actual: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounded random access over an immutable byte source.
///
/// Implementations are read-only and stateless across calls, so one source
/// may back several concurrent traversals. Reading zero bytes always
/// succeeds and returns an empty buffer without bounds checks.
pub trait RandomAccessSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, offset: u64, count: usize) -> Result<Vec<u8>, ReadError>;
}

/// Fixed-width big-endian field reads on top of [`RandomAccessSource`].
pub trait SourceExt: RandomAccessSource {
    fn read_exactly(&self, offset: u64, count: usize) -> Result<Vec<u8>, ReadError> {
        let buf = self.read(offset, count)?;
        if buf.len() != count {
            return Err(ReadError::Truncated { offset, expected: count, actual: buf.len() });
        }
        Ok(buf)
    }

    fn read_u32_be(&self, offset: u64) -> Result<u32, ReadError> {
        let buf = self.read_exactly(offset, 4)?;
        Ok(BigEndian::read_u32(&buf))
    }

    fn read_u64_be(&self, offset: u64) -> Result<u64, ReadError> {
        let buf = self.read_exactly(offset, 8)?;
        Ok(BigEndian::read_u64(&buf))
    }

    fn read_fourcc(&self, offset: u64) -> Result<FourCC, ReadError> {
        let buf = self.read_exactly(offset, 4)?;
        Ok(FourCC([buf[0], buf[1], buf[2], buf[3]]))
    }
}

impl<S: RandomAccessSource + ?Sized> SourceExt for S {}

/// In-memory source backed by a byte vector.
///
/// File-backed and chunked sources are collaborators outside this crate;
/// this one exists so the parser is usable (and testable) stand-alone.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        MemorySource { data }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        MemorySource::new(data)
    }
}

impl RandomAccessSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, count: usize) -> Result<Vec<u8>, ReadError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(count as u64)
            .ok_or(ReadError::Overflow { offset, count: count as u64 })?;
        if end > self.len() {
            return Err(ReadError::OutOfBounds { offset, end, len: self.len() });
        }
        Ok(self.data[offset as usize..end as usize].to_vec())
    }
}
