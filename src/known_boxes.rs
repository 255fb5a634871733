use crate::boxes::FourCC;
use serde::Serialize;

/// Typed view over common MP4 / ISOBMFF box types.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level / top-level
    Ftyp,
    Moov,
    Mdat,
    Free,
    Skip,
    Meta,
    Sidx,
    Styp,
    Mfra,

    // moov children
    Mvhd,
    Trak,
    Mvex,
    Udta,

    // trak children
    Tkhd,
    Edts,
    Mdia,
    Tref,

    // edts children
    Elst,

    // mdia children
    Mdhd,
    Hdlr,
    Minf,

    // minf children
    Vmhd,
    Smhd,
    Nmhd,
    Dinf,
    Stbl,

    // dinf children
    Dref,

    // stbl children
    Stsd,
    Stts,
    Ctts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Stss,

    // fragmented
    Moof,
    Mfhd,
    Traf,
    Tfhd,
    Tfdt,
    Trun,
    Mehd,
    Trex,

    // meta / QT-ish
    Ilst,
    Strk,
    Strd,
    Sinf,
    Schi,

    // Raw UUID/vendor
    Uuid,

    // Anything else
    Unknown(FourCC),
}

/// Coarse grouping used for display and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxCategory {
    FileStructure,
    Movie,
    Track,
    Media,
    SampleTable,
    Fragment,
    Metadata,
    MediaData,
    Other,
}

/// Semantic metadata attached to parse events and tree nodes for box types
/// the catalog knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxDescriptor {
    pub fourcc: FourCC,
    pub name: &'static str,
    pub category: BoxCategory,
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"moov" => KnownBox::Moov,
            b"mdat" => KnownBox::Mdat,
            b"free" => KnownBox::Free,
            b"skip" => KnownBox::Skip,
            b"meta" => KnownBox::Meta,
            b"sidx" => KnownBox::Sidx,
            b"styp" => KnownBox::Styp,
            b"mfra" => KnownBox::Mfra,

            b"mvhd" => KnownBox::Mvhd,
            b"trak" => KnownBox::Trak,
            b"mvex" => KnownBox::Mvex,
            b"udta" => KnownBox::Udta,

            b"tkhd" => KnownBox::Tkhd,
            b"edts" => KnownBox::Edts,
            b"mdia" => KnownBox::Mdia,
            b"tref" => KnownBox::Tref,

            b"elst" => KnownBox::Elst,

            b"mdhd" => KnownBox::Mdhd,
            b"hdlr" => KnownBox::Hdlr,
            b"minf" => KnownBox::Minf,

            b"vmhd" => KnownBox::Vmhd,
            b"smhd" => KnownBox::Smhd,
            b"nmhd" => KnownBox::Nmhd,
            b"dinf" => KnownBox::Dinf,
            b"stbl" => KnownBox::Stbl,

            b"dref" => KnownBox::Dref,

            b"stsd" => KnownBox::Stsd,
            b"stts" => KnownBox::Stts,
            b"ctts" => KnownBox::Ctts,
            b"stsc" => KnownBox::Stsc,
            b"stsz" => KnownBox::Stsz,
            b"stco" => KnownBox::Stco,
            b"co64" => KnownBox::Co64,
            b"stss" => KnownBox::Stss,

            b"moof" => KnownBox::Moof,
            b"mfhd" => KnownBox::Mfhd,
            b"traf" => KnownBox::Traf,
            b"tfhd" => KnownBox::Tfhd,
            b"tfdt" => KnownBox::Tfdt,
            b"trun" => KnownBox::Trun,
            b"mehd" => KnownBox::Mehd,
            b"trex" => KnownBox::Trex,

            b"ilst" => KnownBox::Ilst,
            b"strk" => KnownBox::Strk,
            b"strd" => KnownBox::Strd,
            b"sinf" => KnownBox::Sinf,
            b"schi" => KnownBox::Schi,

            b"uuid" => KnownBox::Uuid,

            _ => KnownBox::Unknown(cc),
        }
    }
}

impl KnownBox {
    /// Does this box *contain* child boxes (container semantics)?
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            KnownBox::Moov
                | KnownBox::Trak
                | KnownBox::Mdia
                | KnownBox::Minf
                | KnownBox::Dinf
                | KnownBox::Stbl
                | KnownBox::Edts
                | KnownBox::Mvex
                | KnownBox::Moof
                | KnownBox::Traf
                | KnownBox::Mfra
                | KnownBox::Tref
                | KnownBox::Udta
                | KnownBox::Strk
                | KnownBox::Strd
                | KnownBox::Sinf
                | KnownBox::Schi
                | KnownBox::Stsd
                | KnownBox::Meta
                | KnownBox::Ilst
        )
    }

    /// Is this a FullBox (leading version + flags)?
    pub fn is_full_box(&self) -> bool {
        matches!(
            self,
            KnownBox::Mvhd
                | KnownBox::Tkhd
                | KnownBox::Mdhd
                | KnownBox::Hdlr
                | KnownBox::Vmhd
                | KnownBox::Smhd
                | KnownBox::Nmhd
                | KnownBox::Dref
                | KnownBox::Stts
                | KnownBox::Ctts
                | KnownBox::Stsc
                | KnownBox::Stsz
                | KnownBox::Stco
                | KnownBox::Co64
                | KnownBox::Stss
                | KnownBox::Elst
                | KnownBox::Sidx
                | KnownBox::Mfhd
                | KnownBox::Tfhd
                | KnownBox::Tfdt
                | KnownBox::Trun
                | KnownBox::Mehd
                | KnownBox::Trex
        )
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            KnownBox::Ftyp => "File Type Box",
            KnownBox::Moov => "Movie Box",
            KnownBox::Mdat => "Media Data Box",
            KnownBox::Free => "Free Space Box",
            KnownBox::Skip => "Free Space Box",
            KnownBox::Meta => "Metadata Box",
            KnownBox::Sidx => "Segment Index Box",
            KnownBox::Styp => "Segment Type Box",
            KnownBox::Mfra => "Movie Fragment Random Access Box",
            KnownBox::Mvhd => "Movie Header Box",
            KnownBox::Trak => "Track Box",
            KnownBox::Mvex => "Movie Extends Box",
            KnownBox::Udta => "User Data Box",
            KnownBox::Tkhd => "Track Header Box",
            KnownBox::Edts => "Edit Box",
            KnownBox::Mdia => "Media Box",
            KnownBox::Tref => "Track Reference Box",
            KnownBox::Elst => "Edit List Box",
            KnownBox::Mdhd => "Media Header Box",
            KnownBox::Hdlr => "Handler Reference Box",
            KnownBox::Minf => "Media Information Box",
            KnownBox::Vmhd => "Video Media Header Box",
            KnownBox::Smhd => "Sound Media Header Box",
            KnownBox::Nmhd => "Null Media Header Box",
            KnownBox::Dinf => "Data Information Box",
            KnownBox::Stbl => "Sample Table Box",
            KnownBox::Dref => "Data Reference Box",
            KnownBox::Stsd => "Sample Description Box",
            KnownBox::Stts => "Decoding Time-to-Sample Box",
            KnownBox::Ctts => "Composition Time-to-Sample Box",
            KnownBox::Stsc => "Sample-to-Chunk Box",
            KnownBox::Stsz => "Sample Size Box",
            KnownBox::Stco => "Chunk Offset Box",
            KnownBox::Co64 => "64-bit Chunk Offset Box",
            KnownBox::Stss => "Sync Sample Box",
            KnownBox::Moof => "Movie Fragment Box",
            KnownBox::Mfhd => "Movie Fragment Header Box",
            KnownBox::Traf => "Track Fragment Box",
            KnownBox::Tfhd => "Track Fragment Header Box",
            KnownBox::Tfdt => "Track Fragment Decode Time Box",
            KnownBox::Trun => "Track Run Box",
            KnownBox::Mehd => "Movie Extends Header Box",
            KnownBox::Trex => "Track Extends Box",
            KnownBox::Ilst => "Metadata Item List Box",
            KnownBox::Strk => "Sub Track Box",
            KnownBox::Strd => "Sub Track Definition Box",
            KnownBox::Sinf => "Protection Scheme Information Box",
            KnownBox::Schi => "Scheme Information Box",
            KnownBox::Uuid => "User Extension Box",
            KnownBox::Unknown(_) => "Unknown Box",
        }
    }

    pub fn category(&self) -> BoxCategory {
        match self {
            KnownBox::Ftyp | KnownBox::Styp | KnownBox::Free | KnownBox::Skip
            | KnownBox::Sidx => BoxCategory::FileStructure,
            KnownBox::Moov | KnownBox::Mvhd | KnownBox::Mvex | KnownBox::Mehd
            | KnownBox::Trex => BoxCategory::Movie,
            KnownBox::Trak | KnownBox::Tkhd | KnownBox::Edts | KnownBox::Elst
            | KnownBox::Tref => BoxCategory::Track,
            KnownBox::Mdia | KnownBox::Mdhd | KnownBox::Hdlr | KnownBox::Minf
            | KnownBox::Vmhd | KnownBox::Smhd | KnownBox::Nmhd | KnownBox::Dinf
            | KnownBox::Dref => BoxCategory::Media,
            KnownBox::Stbl | KnownBox::Stsd | KnownBox::Stts | KnownBox::Ctts
            | KnownBox::Stsc | KnownBox::Stsz | KnownBox::Stco | KnownBox::Co64
            | KnownBox::Stss => BoxCategory::SampleTable,
            KnownBox::Moof | KnownBox::Mfhd | KnownBox::Traf | KnownBox::Tfhd
            | KnownBox::Tfdt | KnownBox::Trun | KnownBox::Mfra => BoxCategory::Fragment,
            KnownBox::Meta | KnownBox::Ilst | KnownBox::Udta | KnownBox::Strk
            | KnownBox::Strd => BoxCategory::Metadata,
            KnownBox::Mdat => BoxCategory::MediaData,
            KnownBox::Sinf | KnownBox::Schi | KnownBox::Uuid | KnownBox::Unknown(_) => {
                BoxCategory::Other
            }
        }
    }
}

/// Catalog lookup: `None` for types the catalog has no entry for.
pub fn descriptor(fourcc: FourCC) -> Option<BoxDescriptor> {
    match KnownBox::from(fourcc) {
        KnownBox::Unknown(_) => None,
        kb => Some(BoxDescriptor { fourcc, name: kb.full_name(), category: kb.category() }),
    }
}
