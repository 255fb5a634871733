use crate::boxes::{BoxHeader, FourCC};
use crate::reader::{RandomAccessSource, ReadError};
use byteorder::{BigEndian, ByteOrder};
use std::ops::Range;

#[derive(thiserror::Error, Debug)]
pub enum HeaderDecodeError {
    #[error("offset {offset} outside parent range {parent:?}")]
    OffsetOutsideParent { offset: u64, parent: Range<u64> },
    #[error("offset {offset} beyond source length {len}")]
    OffsetBeyondSource { offset: u64, len: u64 },
    #[error("truncated header field at {offset}: expected {expected} bytes, got {actual}")]
    TruncatedField { offset: u64, expected: usize, actual: usize },
    #[error("declared size {0} does not fit the addressable range")]
    SizeOverflow(u64),
    #[error("total size {total} is smaller than header size {header}")]
    InvalidSize { total: u64, header: u64 },
    #[error("io: {0}")]
    Read(#[from] ReadError),
}

pub type Result<T> = std::result::Result<T, HeaderDecodeError>;

/// Decode one box header at `offset` inside `parent`.
///
/// Pure computation over the supplied bytes: a 32-bit big-endian size and a
/// 4-byte type, a 64-bit extended size when the size field is 1, resolution
/// against the enclosing range when it is 0, and a 16-byte extended type for
/// `uuid` boxes. The declared end may still run past `parent` or the source;
/// the traversal engine turns that excess into guard issues rather than a
/// decode failure.
pub fn read_box_header(
    src: &dyn RandomAccessSource,
    offset: u64,
    parent: &Range<u64>,
) -> Result<BoxHeader> {
    if offset < parent.start || offset >= parent.end {
        return Err(HeaderDecodeError::OffsetOutsideParent { offset, parent: parent.clone() });
    }
    if offset >= src.len() {
        return Err(HeaderDecodeError::OffsetBeyondSource { offset, len: src.len() });
    }

    let size32 = BigEndian::read_u32(&read_field(src, offset, 4)?);
    let typ = read_field(src, offset + 4, 4)?;
    let fourcc = FourCC([typ[0], typ[1], typ[2], typ[3]]);

    let mut header_size = 8u64;
    let mut cursor = offset + 8;
    let mut total = size32 as u64;

    if size32 == 1 {
        total = BigEndian::read_u64(&read_field(src, cursor, 8)?);
        header_size += 8;
        cursor += 8;
    }

    let mut uuid = None;
    if &fourcc.0 == b"uuid" {
        let bytes = read_field(src, cursor, 16)?;
        let mut u = [0u8; 16];
        u.copy_from_slice(&bytes);
        uuid = Some(u);
        header_size += 16;
        cursor += 16;
    }

    if size32 == 0 {
        // Box extends to the end of its enclosing container.
        total = parent.end - offset;
    }

    if total < header_size {
        return Err(HeaderDecodeError::InvalidSize { total, header: header_size });
    }
    let end = offset
        .checked_add(total)
        .ok_or(HeaderDecodeError::SizeOverflow(total))?;

    Ok(BoxHeader {
        fourcc,
        total_size: total,
        header_size,
        payload: cursor..end,
        range: offset..end,
        uuid,
    })
}

// Header-field reads map a short or past-EOF read onto TruncatedField so the
// engine can treat it as malformed content; other read failures stay I/O
// errors (the source contract itself was violated).
fn read_field(src: &dyn RandomAccessSource, offset: u64, count: usize) -> Result<Vec<u8>> {
    match src.read(offset, count) {
        Ok(buf) if buf.len() == count => Ok(buf),
        Ok(buf) => Err(HeaderDecodeError::TruncatedField {
            offset,
            expected: count,
            actual: buf.len(),
        }),
        Err(ReadError::OutOfBounds { len, .. }) => {
            let available = len.saturating_sub(offset).min(count as u64) as usize;
            Err(HeaderDecodeError::TruncatedField { offset, expected: count, actual: available })
        }
        Err(ReadError::Truncated { expected, actual, .. }) => {
            Err(HeaderDecodeError::TruncatedField { offset, expected, actual })
        }
        Err(err) => Err(HeaderDecodeError::Read(err)),
    }
}
