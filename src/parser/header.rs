//! The 20-byte header shared by every datagram
use binrw::binrw;
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Size of the header in bytes, including the leading length word
pub const HEADER_SIZE: u64 = 20;

/// Size of the trailing duplicate length word
pub const TRAILER_SIZE: u64 = 4;

/// The general datagram header (EMdgmHeader)
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Datagram length in bytes, counting both length words
    pub num_bytes_dgm: u32,
    /// Type tag, e.g. `#MRZ`
    pub dgm_type: [u8; 4],
    /// Datagram version
    pub dgm_version: u8,
    /// System ID, separates datagrams from several echo sounders
    pub system_id: u8,
    /// Echo sounder identity, e.g. 122, 302, 710, 712, 2040
    pub echo_sounder_id: u16,
    /// UTC seconds since 1970-01-01
    pub time_sec: u32,
    /// Nanosecond remainder
    pub time_nanosec: u32,
}

impl Header {
    /// A header for `kind` with the length left for the encoder to fill in
    pub fn new(kind: DatagramKind, dgm_version: u8, time_sec: u32, time_nanosec: u32) -> Self {
        Header {
            num_bytes_dgm: 0,
            dgm_type: kind.code(),
            dgm_version,
            system_id: 0,
            echo_sounder_id: 0,
            time_sec,
            time_nanosec,
        }
    }

    /// The datagram kind, if the tag is one this crate knows
    pub fn kind(&self) -> Option<DatagramKind> {
        DatagramKind::from_code(&self.dgm_type)
    }

    /// The type tag as text, e.g. `#MRZ`
    pub fn type_str(&self) -> String {
        String::from_utf8_lossy(&self.dgm_type).into_owned()
    }

    /// True if the tag has the `#XYZ` shape of a datagram identifier
    pub fn has_valid_tag(&self) -> bool {
        self.dgm_type[0] == b'#'
            && self.dgm_type[1..]
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Seconds since the epoch as a float
    pub fn timestamp(&self) -> f64 {
        f64::from(self.time_sec) + f64::from(self.time_nanosec) / 1.0e9
    }

    /// Calendar time of the datagram
    pub fn datetime(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(i64::from(self.time_sec))
            .ok()
            .map(|t| t + Duration::nanoseconds(i64::from(self.time_nanosec)))
    }
}

/// The datagram types this crate can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatagramKind {
    /// `#IIP` installation parameters
    InstallationParameters,
    /// `#IOP` runtime parameters
    RuntimeParameters,
    /// `#IBE` BIST error report
    BistError,
    /// `#IBR` BIST reply
    BistReply,
    /// `#IBS` BIST short reply
    BistShortReply,
    /// `#MRZ` range and depth
    RangeAndDepth,
    /// `#MWC` water column
    WaterColumn,
    /// `#SPO` position
    Position,
    /// `#SKM` KM binary attitude
    KmBinary,
    /// `#SVP` sound velocity profile
    SoundVelocityProfile,
    /// `#SVT` sound velocity at transducer
    SoundVelocityTransducer,
    /// `#SCL` clock
    Clock,
    /// `#SDE` depth
    Depth,
    /// `#SHI` height
    Height,
    /// `#CPO` compatibility position
    CompatibilityPosition,
    /// `#CHE` compatibility heave
    CompatibilityHeave,
    /// `#CZ0` compressed MRZ with imagery
    CompressedWithImagery,
    /// `#CZ1` compressed MRZ without imagery
    CompressedSoundingsOnly,
}

const KIND_CODES: [(DatagramKind, &[u8; 4]); 18] = [
    (DatagramKind::InstallationParameters, b"#IIP"),
    (DatagramKind::RuntimeParameters, b"#IOP"),
    (DatagramKind::BistError, b"#IBE"),
    (DatagramKind::BistReply, b"#IBR"),
    (DatagramKind::BistShortReply, b"#IBS"),
    (DatagramKind::RangeAndDepth, b"#MRZ"),
    (DatagramKind::WaterColumn, b"#MWC"),
    (DatagramKind::Position, b"#SPO"),
    (DatagramKind::KmBinary, b"#SKM"),
    (DatagramKind::SoundVelocityProfile, b"#SVP"),
    (DatagramKind::SoundVelocityTransducer, b"#SVT"),
    (DatagramKind::Clock, b"#SCL"),
    (DatagramKind::Depth, b"#SDE"),
    (DatagramKind::Height, b"#SHI"),
    (DatagramKind::CompatibilityPosition, b"#CPO"),
    (DatagramKind::CompatibilityHeave, b"#CHE"),
    (DatagramKind::CompressedWithImagery, b"#CZ0"),
    (DatagramKind::CompressedSoundingsOnly, b"#CZ1"),
];

impl DatagramKind {
    /// Every known kind, in identifier table order
    pub fn all() -> impl Iterator<Item = DatagramKind> {
        KIND_CODES.iter().map(|(k, _)| *k)
    }

    /// Look up a 4-byte tag
    pub fn from_code(code: &[u8; 4]) -> Option<DatagramKind> {
        KIND_CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(k, _)| *k)
    }

    /// The 4-byte tag of this kind
    pub fn code(self) -> [u8; 4] {
        KIND_CODES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, c)| **c)
            .unwrap_or(*b"#???")
    }

    /// The tag as a static string, e.g. `#MRZ`
    pub fn name(self) -> &'static str {
        match self {
            DatagramKind::InstallationParameters => "#IIP",
            DatagramKind::RuntimeParameters => "#IOP",
            DatagramKind::BistError => "#IBE",
            DatagramKind::BistReply => "#IBR",
            DatagramKind::BistShortReply => "#IBS",
            DatagramKind::RangeAndDepth => "#MRZ",
            DatagramKind::WaterColumn => "#MWC",
            DatagramKind::Position => "#SPO",
            DatagramKind::KmBinary => "#SKM",
            DatagramKind::SoundVelocityProfile => "#SVP",
            DatagramKind::SoundVelocityTransducer => "#SVT",
            DatagramKind::Clock => "#SCL",
            DatagramKind::Depth => "#SDE",
            DatagramKind::Height => "#SHI",
            DatagramKind::CompatibilityPosition => "#CPO",
            DatagramKind::CompatibilityHeave => "#CHE",
            DatagramKind::CompressedWithImagery => "#CZ0",
            DatagramKind::CompressedSoundingsOnly => "#CZ1",
        }
    }
}

impl fmt::Display for DatagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
