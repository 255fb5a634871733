use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else { None }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str_lossy())
    }
}

/// Identity of a tree node. Real boxes use their start byte offset (>= 0);
/// placeholder nodes fabricated for missing mandatory children use a
/// decreasing counter starting at -1 so they can never collide with a real
/// offset.
pub type NodeId = i64;

/// Identity and extent of one box within the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxHeader {
    pub fourcc: FourCC,
    /// Total size including header, after extended-size resolution.
    pub total_size: u64,
    /// 8 for compact boxes, +8 with a 64-bit size, +16 for `uuid` boxes.
    pub header_size: u64,
    /// Payload bytes (header excluded).
    pub payload: Range<u64>,
    /// Full extent, header included.
    pub range: Range<u64>,
    /// Extended type, present only for `uuid` boxes.
    pub uuid: Option<[u8; 16]>,
}

impl BoxHeader {
    pub fn start_offset(&self) -> u64 { self.range.start }
    pub fn end_offset(&self) -> u64 { self.range.end }

    pub fn node_id(&self) -> NodeId { self.range.start as NodeId }

    pub fn payload_len(&self) -> u64 { self.payload.end - self.payload.start }

    /// Header for a synthesized stand-in node: the missing type with zero
    /// sizes and a degenerate empty range. Its identity lives in the node id,
    /// not in the byte range.
    pub fn placeholder(fourcc: FourCC) -> Self {
        BoxHeader {
            fourcc,
            total_size: 0,
            header_size: 0,
            payload: 0..0,
            range: 0..0,
            uuid: None,
        }
    }

    /// Short label for diagnostics, e.g. `moov@0x18`.
    pub fn label(&self) -> String {
        format!("{}@{:#x}", self.fourcc, self.range.start)
    }
}
