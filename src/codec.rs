//! Primitive field codec
//!
//! Little-endian fixed-width reads and writes on top of binrw, fixed-width text
//! fields, and the skip logic for structs that declare their own size.
use crate::{Error, Result};
use binrw::{BinRead, BinWrite, Endian};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tracing::trace;

/// Read one little-endian value
pub fn read_fixed<T, R>(reader: &mut R) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    Ok(T::read_options(reader, Endian::Little, ())?)
}

/// Write one little-endian value
pub fn write_fixed<T, W>(writer: &mut W, value: &T) -> Result<()>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
    W: Write + Seek,
{
    Ok(value.write_options(writer, Endian::Little, ())?)
}

/// Read `count` consecutive values of a fixed-layout struct
pub fn read_rows<T, R>(reader: &mut R, count: usize) -> Result<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    (0..count).map(|_| read_fixed(reader)).collect()
}

/// Write a run of fixed-layout values
pub fn write_rows<'v, T, W, I>(writer: &mut W, rows: I) -> Result<()>
where
    T: for<'a> BinWrite<Args<'a> = ()> + 'v,
    W: Write + Seek,
    I: IntoIterator<Item = &'v T>,
{
    for row in rows {
        write_fixed(writer, row)?;
    }
    Ok(())
}

/// Check that `count` items of `size` bytes fit before `end`
///
/// Counts come from the data, so this runs before allocating for them.
pub fn ensure_room<R: Seek>(reader: &mut R, end: u64, count: usize, size: usize) -> Result<()> {
    let pos = reader.stream_position()?;
    let needed = (count as u64).saturating_mul(size as u64);
    if pos.saturating_add(needed) > end {
        return Err(Error::TruncatedRead);
    }
    Ok(())
}

/// Read exactly `count` raw bytes, failing on truncation
pub fn read_bytes<R: Read>(reader: &mut R, count: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// The logical end of a fixed-width text field
///
/// Everything from the first NUL or CRLF onwards is padding.
pub fn text_boundary(bytes: &[u8]) -> &[u8] {
    let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let crlf = bytes
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(bytes.len());
    &bytes[..nul.min(crlf)]
}

/// Decode a UTF-8 string held in a fixed-width byte run
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(text_boundary(bytes).to_vec())
        .map_err(|e| Error::Parse(format!("text field is not UTF-8: {e}")))
}

/// Read a fixed-width text field of `width` bytes
pub fn read_text<R: Read>(reader: &mut R, width: usize) -> Result<String> {
    decode_text(&read_bytes(reader, width)?)
}

/// Write `text` into a NUL-padded field of exactly `width` bytes
pub fn write_text<W: Write>(writer: &mut W, text: &str, width: usize) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > width {
        return Err(Error::CountMismatch {
            what: "fixed-width text field",
            expected: width,
            actual: bytes.len(),
        });
    }
    writer.write_all(bytes)?;
    writer.write_all(&vec![0u8; width - bytes.len()])?;
    Ok(())
}

/// Skip the unknown tail of a declared-size struct
///
/// `known` bytes have been consumed from a struct declaring `declared` bytes.
pub fn skip_declared<R: Seek>(
    reader: &mut R,
    structure: &'static str,
    declared: u64,
    known: u64,
) -> Result<()> {
    let remaining = declared
        .checked_sub(known)
        .ok_or(Error::DeclaredSizeUnderflow {
            structure,
            declared,
            known,
        })?;
    if remaining > 0 {
        trace!(structure, remaining, "skipping unknown trailing fields");
        let remaining = i64::try_from(remaining)
            .map_err(|_| Error::Parse(format!("{structure} skip of {remaining} bytes")))?;
        reader.seek(SeekFrom::Current(remaining))?;
    }
    Ok(())
}

/// Read a struct prefixed by a `u16` giving its own size in bytes
///
/// The size word counts itself. Bytes beyond the fields of `T` are skipped.
pub fn read_declared<T, R>(reader: &mut R, structure: &'static str) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    let start = reader.stream_position()?;
    let declared: u16 = read_fixed(reader)?;
    let value: T = read_fixed(reader)?;
    let known = reader.stream_position()? - start;
    skip_declared(reader, structure, u64::from(declared), known)?;
    Ok(value)
}

/// Write a struct prefixed by its computed `u16` size
pub fn write_declared<T, W>(writer: &mut W, value: &T) -> Result<()>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
    W: Write + Seek,
{
    let body = to_bytes(value)?;
    write_fixed(writer, &size_word(body.len() + 2)?)?;
    writer.write_all(&body)?;
    Ok(())
}

/// Serialise a value into a fresh buffer
pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut buf = Cursor::new(Vec::new());
    write_fixed(&mut buf, value)?;
    Ok(buf.into_inner())
}

/// Convert a byte count into a `u16` size field
pub fn size_word(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::CountMismatch {
        what: "u16 size field",
        expected: usize::from(u16::MAX),
        actual: len,
    })
}

/// Convert a length into a `u16` count field
pub fn count_word(what: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::CountMismatch {
        what,
        expected: usize::from(u16::MAX),
        actual: len,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use binrw::binrw;

    #[binrw]
    #[brw(little)]
    #[derive(Debug, PartialEq)]
    struct Pair {
        a: u16,
        b: f32,
    }

    #[test]
    fn text_stops_at_nul_or_crlf() {
        assert_eq!(text_boundary(b"abc\0def"), b"abc");
        assert_eq!(text_boundary(b"$GPGGA,1\r\nxx\0"), b"$GPGGA,1");
        assert_eq!(text_boundary(b"full"), b"full");
        assert_eq!(decode_text(b"\0\0\0").unwrap(), "");
    }

    #[test]
    fn text_round_trip_pads_with_nul() {
        let mut buf = Cursor::new(Vec::new());
        write_text(&mut buf, "SN=42", 8).unwrap();
        assert_eq!(buf.get_ref(), b"SN=42\0\0\0");
        buf.set_position(0);
        assert_eq!(read_text(&mut buf, 8).unwrap(), "SN=42");
        assert!(write_text(&mut buf, "too long", 4).is_err());
    }

    #[test]
    fn truncated_field_is_an_error() {
        let mut buf = Cursor::new(vec![1u8, 2, 3]);
        let res: Result<u32> = read_fixed(&mut buf);
        assert!(matches!(res, Err(Error::TruncatedRead)));
    }

    #[test]
    fn declared_struct_consumes_exactly_declared_size() {
        // size word 12 = 2 (size) + 6 (known) + 4 unknown bytes
        let mut bytes = vec![12u8, 0, 7, 0];
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&[0xaa; 4]);
        bytes.push(0x55);
        let mut buf = Cursor::new(bytes);
        let pair: Pair = read_declared(&mut buf, "pair").unwrap();
        assert_eq!(pair, Pair { a: 7, b: 1.5 });
        assert_eq!(buf.position(), 12);
    }

    #[test]
    fn declared_size_underflow_is_fatal() {
        let mut bytes = vec![4u8, 0, 7, 0];
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        let mut buf = Cursor::new(bytes);
        let res: Result<Pair> = read_declared(&mut buf, "pair");
        assert!(matches!(
            res,
            Err(Error::DeclaredSizeUnderflow {
                declared: 4,
                known: 8,
                ..
            })
        ));
    }

    #[test]
    fn declared_size_is_computed_on_write() {
        let mut buf = Cursor::new(Vec::new());
        write_declared(&mut buf, &Pair { a: 1, b: 2.0 }).unwrap();
        assert_eq!(&buf.get_ref()[..2], &8u16.to_le_bytes());
        buf.set_position(0);
        let back: Pair = read_declared(&mut buf, "pair").unwrap();
        assert_eq!(back, Pair { a: 1, b: 2.0 });
    }
}
