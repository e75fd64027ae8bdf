//! Parsing and writing KMALL datagrams
//!
//! Every datagram is framed the same way: a [`Header`] whose first field is
//! the total length, a type specific body, and a trailing copy of the length.
//! [`Record`] implements that framing once; each datagram type only supplies
//! its body codec. [`Datagram`] is the sum of all known types.
pub mod header;
pub mod install;
pub mod multibeam;
pub mod sensor;
pub mod watercolumn;

pub use header::{DatagramKind, Header, HEADER_SIZE, TRAILER_SIZE};

use crate::codec::{ensure_room, read_bytes, read_fixed, write_fixed};
use crate::compression::CompressedMrz;
use crate::{Error, Result};
use install::{Bist, ParameterText};
use multibeam::Mrz;
use sensor::{Che, Cpo, Scl, Sde, Shi, Skm, Spo, Svp, Svt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use watercolumn::Mwc;

/// Smallest legal datagram: header plus trailing length
pub const MIN_DATAGRAM_SIZE: u64 = HEADER_SIZE + TRAILER_SIZE;

/// A datagram type with a body codec
///
/// `decode_body` starts right after the header and must not read past `end`,
/// the offset of the trailing length word. `encode_body` writes the body
/// only; counts and size words are derived from the data being written.
pub trait Record: Sized {
    /// The header this record was decoded with or will be written with
    fn header(&self) -> &Header;

    /// Decode the body that follows `header`
    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self>;

    /// Encode the body, without header or trailer
    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()>;

    /// Decode a whole datagram at the current position
    ///
    /// On success the reader is left at the start of the next datagram.
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let start = reader.stream_position()?;
        let header = read_header(reader, start)?;
        read_framed(reader, start, header, Self::decode_body)
    }

    /// Write the whole datagram, returning the number of bytes written
    fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<u64> {
        let mut body = Cursor::new(Vec::new());
        self.encode_body(&mut body)?;
        frame(writer, self.header(), &body.into_inner())
    }

    /// The datagram as bytes
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.write(&mut buf)?;
        Ok(buf.into_inner())
    }
}

/// Read a header and check that its length can frame a datagram
pub fn read_header<R: Read + Seek>(reader: &mut R, start: u64) -> Result<Header> {
    let header: Header = read_fixed(reader)?;
    if u64::from(header.num_bytes_dgm) < MIN_DATAGRAM_SIZE {
        return Err(Error::LengthMismatch {
            offset: start,
            declared: u64::from(header.num_bytes_dgm),
            actual: MIN_DATAGRAM_SIZE,
        });
    }
    Ok(header)
}

/// Run a body decoder and leave the reader at the declared datagram end
pub(crate) fn read_framed<R, T, F>(reader: &mut R, start: u64, header: Header, decode: F) -> Result<T>
where
    R: Read + Seek,
    F: FnOnce(&mut R, Header, u64) -> Result<T>,
{
    let declared = u64::from(header.num_bytes_dgm);
    let end = start + declared - TRAILER_SIZE;
    let value = decode(reader, header, end)?;
    let consumed = reader.stream_position()? - start;
    if consumed + TRAILER_SIZE > declared {
        return Err(Error::LengthMismatch {
            offset: start,
            declared,
            actual: consumed + TRAILER_SIZE,
        });
    }
    reader.seek(SeekFrom::Start(start + declared))?;
    Ok(value)
}

/// Write header, body and trailer, computing the length from the body
pub(crate) fn frame<W: Write + Seek>(writer: &mut W, header: &Header, body: &[u8]) -> Result<u64> {
    let total = HEADER_SIZE + body.len() as u64 + TRAILER_SIZE;
    let total_word = u32::try_from(total).map_err(|_| Error::CountMismatch {
        what: "datagram length",
        expected: u32::MAX as usize,
        actual: total as usize,
    })?;
    let header = Header {
        num_bytes_dgm: total_word,
        ..header.clone()
    };
    write_fixed(writer, &header)?;
    writer.write_all(body)?;
    write_fixed(writer, &total_word)?;
    Ok(total)
}

/// Read a whole datagram as raw bytes, for copying it unchanged
///
/// The declared length must fit in the rest of the stream.
pub fn read_raw<R: Read + Seek>(reader: &mut R) -> Result<(Header, Vec<u8>)> {
    let start = reader.stream_position()?;
    let header = read_header(reader, start)?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;
    ensure_room(reader, len, header.num_bytes_dgm as usize, 1)?;
    let bytes = read_bytes(reader, header.num_bytes_dgm as usize)?;
    Ok((header, bytes))
}

/// Any datagram this crate can decode
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// `#IIP`
    InstallationParameters(ParameterText),
    /// `#IOP`
    RuntimeParameters(ParameterText),
    /// `#IBE`, `#IBR` and `#IBS`
    Bist(Bist),
    /// `#MRZ`
    RangeAndDepth(Mrz),
    /// `#MWC`
    WaterColumn(Mwc),
    /// `#SPO`
    Position(Spo),
    /// `#SKM`
    KmBinary(Skm),
    /// `#SVP`
    SoundVelocityProfile(Svp),
    /// `#SVT`
    SoundVelocityTransducer(Svt),
    /// `#SCL`
    Clock(Scl),
    /// `#SDE`
    Depth(Sde),
    /// `#SHI`
    Height(Shi),
    /// `#CPO`
    CompatibilityPosition(Cpo),
    /// `#CHE`
    CompatibilityHeave(Che),
    /// `#CZ0` and `#CZ1`
    Compressed(CompressedMrz),
}

/// Decode the body of a datagram of a known kind
fn decode_kind<R: Read + Seek>(
    kind: DatagramKind,
    reader: &mut R,
    header: Header,
    end: u64,
) -> Result<Datagram> {
    use DatagramKind::*;
    Ok(match kind {
        InstallationParameters => {
            Datagram::InstallationParameters(ParameterText::decode_body(reader, header, end)?)
        }
        RuntimeParameters => {
            Datagram::RuntimeParameters(ParameterText::decode_body(reader, header, end)?)
        }
        BistError | BistReply | BistShortReply => {
            Datagram::Bist(Bist::decode_body(reader, header, end)?)
        }
        RangeAndDepth => Datagram::RangeAndDepth(Mrz::decode_body(reader, header, end)?),
        WaterColumn => Datagram::WaterColumn(Mwc::decode_body(reader, header, end)?),
        Position => Datagram::Position(Spo::decode_body(reader, header, end)?),
        KmBinary => Datagram::KmBinary(Skm::decode_body(reader, header, end)?),
        SoundVelocityProfile => {
            Datagram::SoundVelocityProfile(Svp::decode_body(reader, header, end)?)
        }
        SoundVelocityTransducer => {
            Datagram::SoundVelocityTransducer(Svt::decode_body(reader, header, end)?)
        }
        Clock => Datagram::Clock(Scl::decode_body(reader, header, end)?),
        Depth => Datagram::Depth(Sde::decode_body(reader, header, end)?),
        Height => Datagram::Height(Shi::decode_body(reader, header, end)?),
        CompatibilityPosition => {
            Datagram::CompatibilityPosition(Cpo::decode_body(reader, header, end)?)
        }
        CompatibilityHeave => Datagram::CompatibilityHeave(Che::decode_body(reader, header, end)?),
        CompressedWithImagery | CompressedSoundingsOnly => {
            Datagram::Compressed(CompressedMrz::decode_body(reader, header, end)?)
        }
    })
}

impl Datagram {
    /// Decode the datagram at the current position
    ///
    /// An unknown type tag is an [`Error::UnknownDatagramType`]; the reader is
    /// then left at the declared end of the datagram.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Datagram> {
        let start = reader.stream_position()?;
        let header = read_header(reader, start)?;
        match header.kind() {
            Some(kind) => read_framed(reader, start, header, |r, h, end| {
                decode_kind(kind, r, h, end)
            }),
            None => {
                reader.seek(SeekFrom::Start(start + u64::from(header.num_bytes_dgm)))?;
                Err(Error::UnknownDatagramType(header.type_str()))
            }
        }
    }

    /// The header of the datagram
    pub fn header(&self) -> &Header {
        match self {
            Datagram::InstallationParameters(d) | Datagram::RuntimeParameters(d) => &d.header,
            Datagram::Bist(d) => &d.header,
            Datagram::RangeAndDepth(d) => &d.header,
            Datagram::WaterColumn(d) => &d.header,
            Datagram::Position(d) | Datagram::CompatibilityPosition(d) => &d.header,
            Datagram::KmBinary(d) => &d.header,
            Datagram::SoundVelocityProfile(d) => &d.header,
            Datagram::SoundVelocityTransducer(d) => &d.header,
            Datagram::Clock(d) => &d.header,
            Datagram::Depth(d) => &d.header,
            Datagram::Height(d) => &d.header,
            Datagram::CompatibilityHeave(d) => &d.header,
            Datagram::Compressed(d) => &d.header,
        }
    }

    /// The kind named by the header tag
    pub fn kind(&self) -> Option<DatagramKind> {
        self.header().kind()
    }

    /// Write the datagram, returning the number of bytes written
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<u64> {
        match self {
            Datagram::InstallationParameters(d) | Datagram::RuntimeParameters(d) => d.write(writer),
            Datagram::Bist(d) => d.write(writer),
            Datagram::RangeAndDepth(d) => d.write(writer),
            Datagram::WaterColumn(d) => d.write(writer),
            Datagram::Position(d) | Datagram::CompatibilityPosition(d) => d.write(writer),
            Datagram::KmBinary(d) => d.write(writer),
            Datagram::SoundVelocityProfile(d) => d.write(writer),
            Datagram::SoundVelocityTransducer(d) => d.write(writer),
            Datagram::Clock(d) => d.write(writer),
            Datagram::Depth(d) => d.write(writer),
            Datagram::Height(d) => d.write(writer),
            Datagram::CompatibilityHeave(d) => d.write(writer),
            Datagram::Compressed(d) => d.write(writer),
        }
    }

    /// The datagram as bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.write(&mut buf)?;
        Ok(buf.into_inner())
    }
}
