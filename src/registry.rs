use crate::boxes::{BoxHeader, FourCC};
use crate::issues::{Severity, ValidationIssue};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// Key a decoder is registered under: a 4CC, or the extended type for
/// `uuid` boxes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

impl BoxKey {
    pub fn for_header(hdr: &BoxHeader) -> Self {
        match hdr.uuid {
            Some(u) => BoxKey::Uuid(u),
            None => BoxKey::FourCC(hdr.fourcc),
        }
    }
}

/// Structurally interpreted payload of a box whose contents were decoded.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum ParsedPayload {
    FileType(FtypData),
    MovieHeader(MvhdData),
    TrackHeader(TkhdData),
    MediaHeader(MdhdData),
    HandlerReference(HdlrData),
    TimeToSample(SttsData),
    SampleSizes(StszData),
    ChunkOffsets(StcoData),
    EditList(ElstData),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FtypData {
    pub major_brand: String,
    pub minor_version: u32,
    pub compatible_brands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MvhdData {
    pub version: u8,
    pub flags: u32,
    pub timescale: u32,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TkhdData {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MdhdData {
    pub version: u8,
    pub flags: u32,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HdlrData {
    pub version: u8,
    pub flags: u32,
    pub handler_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SttsData {
    pub entry_count: u32,
    pub entries: Vec<SttsEntry>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StszData {
    pub sample_size: u32,
    pub sample_count: u32,
    pub sample_sizes: Vec<u32>, // Empty if sample_size > 0
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StcoData {
    pub entry_count: u32,
    pub chunk_offsets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ElstData {
    pub version: u8,
    pub entry_count: u32,
    pub entries: Vec<ElstEntry>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ElstEntry {
    pub segment_duration: u64,
    pub media_time: i64,
}

/// What a decoder hands back: the interpreted payload plus any field-level
/// validation problems it noticed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub payload: ParsedPayload,
    pub issues: Vec<ValidationIssue>,
}

impl DecodedPayload {
    fn clean(payload: ParsedPayload) -> Self {
        DecodedPayload { payload, issues: Vec::new() }
    }
}

/// Trait for payload decoders.
///
/// A decoder interprets the payload of a specific box (identified by a
/// [`BoxKey`]) and returns a [`DecodedPayload`]. For FullBox types the
/// version and flags have already been consumed by the traversal engine and
/// are passed in.
pub trait PayloadDecoder: Send + Sync {
    fn decode(
        &self,
        r: &mut dyn Read,
        hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload>;
}

/// Registry of decoders keyed by `BoxKey` (4CC or UUID).
///
/// Immutable once constructed; use [`Registry::with_decoder`] to build it
/// fluently.
pub struct Registry {
    map: HashMap<BoxKey, DecoderEntry>,
}

struct DecoderEntry {
    inner: Box<dyn PayloadDecoder>,
    _name: String,
}

impl Registry {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for debugging / logging.
    pub fn with_decoder(mut self, key: BoxKey, name: &str, dec: Box<dyn PayloadDecoder>) -> Self {
        self.map.insert(key, DecoderEntry { inner: dec, _name: name.to_string() });
        self
    }

    pub fn contains(&self, key: &BoxKey) -> bool {
        self.map.contains_key(key)
    }

    /// Try to decode the payload of a box using a registered decoder.
    ///
    /// Returns `None` if no decoder exists for the given key.
    pub fn decode(
        &self,
        key: &BoxKey,
        r: &mut dyn Read,
        hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> Option<anyhow::Result<DecodedPayload>> {
        self.map.get(key).map(|d| d.inner.decode(r, hdr, version, flags))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

fn read_all(r: &mut dyn Read) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(buf)
}

fn truncated(what: &str) -> ValidationIssue {
    ValidationIssue::new(Severity::Error, format!("{what} truncated"))
}

fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char)
}

// ---------- Decoders ----------

// ftyp: major + minor + compatible brands
pub struct FtypDecoder;

impl PayloadDecoder for FtypDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        _version: Option<u8>,
        _flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        if buf.len() < 8 {
            return Ok(DecodedPayload {
                payload: ParsedPayload::FileType(FtypData {
                    major_brand: String::new(),
                    minor_version: 0,
                    compatible_brands: Vec::new(),
                }),
                issues: vec![truncated("file type payload")],
            });
        }

        let major_brand = String::from_utf8_lossy(&buf[0..4]).to_string();
        let minor_version = u32::from_be_bytes(buf[4..8].try_into()?);

        let mut issues = Vec::new();
        let mut compatible_brands = Vec::new();
        for chunk in buf[8..].chunks(4) {
            if chunk.len() == 4 {
                compatible_brands.push(String::from_utf8_lossy(chunk).to_string());
            } else {
                issues.push(ValidationIssue::new(
                    Severity::Warning,
                    "compatible brand list length is not a multiple of 4",
                ));
            }
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::FileType(FtypData {
                major_brand,
                minor_version,
                compatible_brands,
            }),
            issues,
        })
    }
}

// mvhd: timescale + duration
pub struct MvhdDecoder;

impl PayloadDecoder for MvhdDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let mut cur = Cursor::new(&buf);
        let version = version.unwrap_or(0);

        let decoded = (|| -> std::io::Result<(u32, u64)> {
            if version == 1 {
                let _creation = cur.read_u64::<BigEndian>()?;
                let _modification = cur.read_u64::<BigEndian>()?;
                let ts = cur.read_u32::<BigEndian>()?;
                let dur = cur.read_u64::<BigEndian>()?;
                Ok((ts, dur))
            } else {
                let _creation = cur.read_u32::<BigEndian>()?;
                let _modification = cur.read_u32::<BigEndian>()?;
                let ts = cur.read_u32::<BigEndian>()?;
                let dur = cur.read_u32::<BigEndian>()? as u64;
                Ok((ts, dur))
            }
        })();

        let (timescale, duration, mut issues) = match decoded {
            Ok((ts, dur)) => (ts, dur, Vec::new()),
            Err(_) => (0, 0, vec![truncated("movie header payload")]),
        };
        if issues.is_empty() && timescale == 0 {
            issues.push(ValidationIssue::new(Severity::Warning, "movie timescale is zero"));
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::MovieHeader(MvhdData {
                version,
                flags: flags.unwrap_or(0),
                timescale,
                duration,
            }),
            issues,
        })
    }
}

// tkhd: track id, duration, width, height
pub struct TkhdDecoder;

impl PayloadDecoder for TkhdDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let version = version.unwrap_or(0);
        let mut pos = 0usize;

        let read_u32 = |pos: &mut usize| -> Option<u32> {
            if *pos + 4 > buf.len() {
                return None;
            }
            let v = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().ok()?);
            *pos += 4;
            Some(v)
        };
        let read_u64 = |pos: &mut usize| -> Option<u64> {
            if *pos + 8 > buf.len() {
                return None;
            }
            let v = u64::from_be_bytes(buf[*pos..*pos + 8].try_into().ok()?);
            *pos += 8;
            Some(v)
        };

        let mut issues = Vec::new();
        let (track_id, duration) = if version == 1 {
            let times = read_u64(&mut pos).and_then(|_| read_u64(&mut pos));
            let id = read_u32(&mut pos);
            let _reserved = read_u32(&mut pos);
            let dur = read_u64(&mut pos);
            if times.is_none() || id.is_none() || dur.is_none() {
                issues.push(truncated("track header payload"));
            }
            (id.unwrap_or(0), dur.unwrap_or(0))
        } else {
            let times = read_u32(&mut pos).and_then(|_| read_u32(&mut pos));
            let id = read_u32(&mut pos);
            let _reserved = read_u32(&mut pos);
            let dur = read_u32(&mut pos);
            if times.is_none() || id.is_none() || dur.is_none() {
                issues.push(truncated("track header payload"));
            }
            (id.unwrap_or(0), dur.unwrap_or(0) as u64)
        };

        // reserved[2] + layer/alt_group/volume/reserved + matrix
        let fixed_point = if pos + 8 + 8 + 36 + 8 <= buf.len() {
            pos += 8 + 8 + 36;
            let w = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap_or([0; 4]));
            let h = u32::from_be_bytes(buf[pos + 4..pos + 8].try_into().unwrap_or([0; 4]));
            Some((w as f32 / 65536.0, h as f32 / 65536.0))
        } else {
            None
        };

        Ok(DecodedPayload {
            payload: ParsedPayload::TrackHeader(TkhdData {
                version,
                flags: flags.unwrap_or(0),
                track_id,
                duration,
                width: fixed_point.map(|(w, _)| w),
                height: fixed_point.map(|(_, h)| h),
            }),
            issues,
        })
    }
}

// mdhd: timescale, duration, language
pub struct MdhdDecoder;

impl PayloadDecoder for MdhdDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let mut cur = Cursor::new(&buf);
        let version = version.unwrap_or(0);

        let decoded = (|| -> std::io::Result<(u32, u64, u16)> {
            if version == 1 {
                let _creation = cur.read_u64::<BigEndian>()?;
                let _modification = cur.read_u64::<BigEndian>()?;
                let ts = cur.read_u32::<BigEndian>()?;
                let dur = cur.read_u64::<BigEndian>()?;
                let lang = cur.read_u16::<BigEndian>()?;
                Ok((ts, dur, lang))
            } else {
                let _creation = cur.read_u32::<BigEndian>()?;
                let _modification = cur.read_u32::<BigEndian>()?;
                let ts = cur.read_u32::<BigEndian>()?;
                let dur = cur.read_u32::<BigEndian>()? as u64;
                let lang = cur.read_u16::<BigEndian>()?;
                Ok((ts, dur, lang))
            }
        })();

        let (timescale, duration, language_code, issues) = match decoded {
            Ok((ts, dur, lang)) => (ts, dur, lang, Vec::new()),
            Err(_) => (0, 0, 0, vec![truncated("media header payload")]),
        };

        Ok(DecodedPayload {
            payload: ParsedPayload::MediaHeader(MdhdData {
                version,
                flags: flags.unwrap_or(0),
                timescale,
                duration,
                language: lang_from_u16(language_code),
            }),
            issues,
        })
    }
}

// hdlr: handler type + name
pub struct HdlrDecoder;

impl PayloadDecoder for HdlrDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        version: Option<u8>,
        flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        if buf.len() < 8 {
            return Ok(DecodedPayload {
                payload: ParsedPayload::HandlerReference(HdlrData {
                    version: version.unwrap_or(0),
                    flags: flags.unwrap_or(0),
                    handler_type: String::new(),
                    name: String::new(),
                }),
                issues: vec![truncated("handler payload")],
            });
        }

        // pre_defined (4) + handler_type (4) + reserved (12) + name
        let handler_type = String::from_utf8_lossy(&buf[4..8]).to_string();
        let mut name_bytes: Vec<u8> = buf.get(20..).unwrap_or(&[]).to_vec();
        while name_bytes.last() == Some(&0) {
            name_bytes.pop();
        }
        let name = String::from_utf8_lossy(&name_bytes).to_string();

        Ok(DecodedPayload::clean(ParsedPayload::HandlerReference(HdlrData {
            version: version.unwrap_or(0),
            flags: flags.unwrap_or(0),
            handler_type,
            name,
        })))
    }
}

// stts: time-to-sample
pub struct SttsDecoder;

impl PayloadDecoder for SttsDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        _version: Option<u8>,
        _flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let mut cur = Cursor::new(&buf);
        let mut issues = Vec::new();

        let entry_count = cur.read_u32::<BigEndian>().unwrap_or_else(|_| {
            issues.push(truncated("time-to-sample payload"));
            0
        });
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let sample_count = cur.read_u32::<BigEndian>();
            let sample_delta = cur.read_u32::<BigEndian>();
            match (sample_count, sample_delta) {
                (Ok(sample_count), Ok(sample_delta)) => {
                    entries.push(SttsEntry { sample_count, sample_delta });
                }
                _ => {
                    issues.push(ValidationIssue::new(
                        Severity::Error,
                        format!(
                            "time-to-sample table declares {} entries but holds {}",
                            entry_count,
                            entries.len()
                        ),
                    ));
                    break;
                }
            }
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::TimeToSample(SttsData { entry_count, entries }),
            issues,
        })
    }
}

// stsz: sample sizes
pub struct StszDecoder;

impl PayloadDecoder for StszDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        _version: Option<u8>,
        _flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let mut cur = Cursor::new(&buf);
        let mut issues = Vec::new();

        let sample_size = cur.read_u32::<BigEndian>().unwrap_or(0);
        let sample_count = cur.read_u32::<BigEndian>().unwrap_or(0);
        if buf.len() < 8 {
            issues.push(truncated("sample size payload"));
        }

        // If sample_size is 0, each sample has its own size
        let mut sample_sizes = Vec::new();
        if sample_size == 0 {
            for _ in 0..sample_count {
                match cur.read_u32::<BigEndian>() {
                    Ok(v) => sample_sizes.push(v),
                    Err(_) => {
                        issues.push(ValidationIssue::new(
                            Severity::Error,
                            format!(
                                "sample size table declares {} entries but holds {}",
                                sample_count,
                                sample_sizes.len()
                            ),
                        ));
                        break;
                    }
                }
            }
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::SampleSizes(StszData { sample_size, sample_count, sample_sizes }),
            issues,
        })
    }
}

// stco: 32-bit chunk offsets
pub struct StcoDecoder;

impl PayloadDecoder for StcoDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        _version: Option<u8>,
        _flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let mut cur = Cursor::new(&buf);
        let mut issues = Vec::new();

        let entry_count = cur.read_u32::<BigEndian>().unwrap_or_else(|_| {
            issues.push(truncated("chunk offset payload"));
            0
        });
        let mut chunk_offsets = Vec::new();
        for _ in 0..entry_count {
            match cur.read_u32::<BigEndian>() {
                Ok(v) => chunk_offsets.push(v),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        Severity::Error,
                        format!(
                            "chunk offset table declares {} entries but holds {}",
                            entry_count,
                            chunk_offsets.len()
                        ),
                    ));
                    break;
                }
            }
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::ChunkOffsets(StcoData { entry_count, chunk_offsets }),
            issues,
        })
    }
}

// elst: edit list
pub struct ElstDecoder;

impl PayloadDecoder for ElstDecoder {
    fn decode(
        &self,
        r: &mut dyn Read,
        _hdr: &BoxHeader,
        version: Option<u8>,
        _flags: Option<u32>,
    ) -> anyhow::Result<DecodedPayload> {
        let buf = read_all(r)?;
        let version = version.unwrap_or(0);
        let mut pos = 0usize;
        let mut issues = Vec::new();

        let read_u32 = |pos: &mut usize| -> Option<u32> {
            if *pos + 4 > buf.len() {
                return None;
            }
            let v = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().ok()?);
            *pos += 4;
            Some(v)
        };
        let read_u64 = |pos: &mut usize| -> Option<u64> {
            if *pos + 8 > buf.len() {
                return None;
            }
            let v = u64::from_be_bytes(buf[*pos..*pos + 8].try_into().ok()?);
            *pos += 8;
            Some(v)
        };

        let entry_count = read_u32(&mut pos).unwrap_or_else(|| {
            issues.push(truncated("edit list payload"));
            0
        });

        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let entry = if version == 1 {
                read_u64(&mut pos).zip(read_u64(&mut pos)).map(|(dur, mt)| ElstEntry {
                    segment_duration: dur,
                    media_time: mt as i64,
                })
            } else {
                read_u32(&mut pos).zip(read_u32(&mut pos)).map(|(dur, mt)| ElstEntry {
                    segment_duration: dur as u64,
                    media_time: mt as i32 as i64,
                })
            };
            // media_rate (4 bytes) trails each entry
            let rate = read_u32(&mut pos);
            match (entry, rate) {
                (Some(entry), Some(_)) => entries.push(entry),
                _ => {
                    issues.push(ValidationIssue::new(
                        Severity::Error,
                        format!(
                            "edit list declares {} entries but holds {}",
                            entry_count,
                            entries.len()
                        ),
                    ));
                    break;
                }
            }
        }

        Ok(DecodedPayload {
            payload: ParsedPayload::EditList(ElstData { version, entry_count, entries }),
            issues,
        })
    }
}

// ---------- Default registry ----------

pub fn default_registry() -> Registry {
    Registry::new()
        .with_decoder(BoxKey::FourCC(FourCC(*b"ftyp")), "ftyp", Box::new(FtypDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"mvhd")), "mvhd", Box::new(MvhdDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"tkhd")), "tkhd", Box::new(TkhdDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"mdhd")), "mdhd", Box::new(MdhdDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"hdlr")), "hdlr", Box::new(HdlrDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"stts")), "stts", Box::new(SttsDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"stsz")), "stsz", Box::new(StszDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"stco")), "stco", Box::new(StcoDecoder))
        .with_decoder(BoxKey::FourCC(FourCC(*b"elst")), "elst", Box::new(ElstDecoder))
}
