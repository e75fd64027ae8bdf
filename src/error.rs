use thiserror::Error;

/// Possible `kmall` errors
///
/// Decoders never panic on malformed input; every failure surfaces as one of
/// these variants and the whole record is discarded.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Fewer bytes remain than a fixed-width field requires
    #[error("truncated read: the source ended inside a fixed-width field")]
    TruncatedRead,
    /// A struct's declared size is smaller than the fields it must contain
    #[error("{structure} declares {declared} bytes but its known fields need {known}")]
    DeclaredSizeUnderflow {
        /// Name of the offending struct
        structure: &'static str,
        /// Size taken from the struct's own size field
        declared: u64,
        /// Bytes consumed by the fields this crate decodes
        known: u64,
    },
    /// The 4-byte identifier is not a known datagram type
    #[error("unknown datagram type {0:?}")]
    UnknownDatagramType(String),
    /// The datagram version has no known layout for its non-declared structs
    #[error("{kind} datagram version {version} is not supported")]
    UnsupportedVersion {
        /// Datagram identifier, e.g. `#MRZ`
        kind: &'static str,
        /// Version byte from the header
        version: u8,
    },
    /// The bytes consumed disagree with the header's declared length
    #[error("datagram at offset {offset} declares {declared} bytes but {actual} were found")]
    LengthMismatch {
        /// File offset of the datagram start
        offset: u64,
        /// Length from the header
        declared: u64,
        /// Length actually consumed or available
        actual: u64,
    },
    /// A count field disagrees with the data it describes
    #[error("{what}: expected {expected} entries, found {actual}")]
    CountMismatch {
        /// The count being checked
        what: &'static str,
        /// Value implied by the count field(s)
        expected: usize,
        /// Number of entries present
        actual: usize,
    },
    /// An encoded or compressed block violates its own shape
    #[error("corrupt compressed block: {0}")]
    CompressionCorruption(String),
    /// No valid datagram start could be found at the cursor
    #[error("no valid datagram found at offset {offset}")]
    Desync {
        /// Offset at which the scanner lost synchronisation
        offset: u64,
    },
    /// A whole-file pass was cancelled through its flag
    #[error("cancelled")]
    Cancelled,
    /// Any other structural parse failure reported by binrw
    #[error("parse error: {0}")]
    Parse(String),
    /// Failure while writing the Avro export
    #[error("avro export failed")]
    Avro(#[from] apache_avro::Error),
    /// Underlying I/O failure
    #[error(transparent)]
    Io(std::io::Error),
}

impl Error {
    /// True when the error means the record ran past the end of the source
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::TruncatedRead)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TruncatedRead
        } else {
            Error::Io(e)
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(e: binrw::Error) -> Self {
        if e.is_eof() {
            return Error::TruncatedRead;
        }
        match e {
            binrw::Error::Io(e) => Error::from(e),
            other => Error::Parse(other.to_string()),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
