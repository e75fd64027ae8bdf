//! Installation (I) datagrams: `#IIP`, `#IOP` and the `#IB*` BIST reports
//!
//! These carry a short binary head followed by free text. The size word
//! counts the text, so the text runs to the declared boundary.
use super::header::Header;
use super::Record;
use crate::codec::{ensure_room, read_fixed, read_text, size_word, to_bytes, write_fixed};
use crate::params::{self, Parameters};
use crate::{Error, Result};
use binrw::{binrw, BinRead, BinWrite};
use std::io::{Read, Seek, Write};

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ParameterHead {
    info: u16,
    status: u16,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BistHead {
    bist_info: u8,
    bist_style: u8,
    bist_number: u8,
    bist_status: i8,
}

fn read_text_block<H, R>(reader: &mut R, structure: &'static str, end: u64) -> Result<(H, String)>
where
    H: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    let start = reader.stream_position()?;
    let declared: u16 = read_fixed(reader)?;
    let head: H = read_fixed(reader)?;
    let known = reader.stream_position()? - start;
    let len = u64::from(declared)
        .checked_sub(known)
        .ok_or(Error::DeclaredSizeUnderflow {
            structure,
            declared: u64::from(declared),
            known,
        })?;
    let len = len as usize;
    ensure_room(reader, end, len, 1)?;
    Ok((head, read_text(reader, len)?))
}

fn write_text_block<H, W>(writer: &mut W, head: &H, text: &str) -> Result<()>
where
    H: for<'a> BinWrite<Args<'a> = ()>,
    W: Write + Seek,
{
    let head = to_bytes(head)?;
    write_fixed(writer, &size_word(2 + head.len() + text.len())?)?;
    writer.write_all(&head)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// `#IIP` installation parameters or `#IOP` runtime parameters
///
/// Both share one layout; the header tag tells them apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterText {
    pub header: Header,
    pub info: u16,
    pub status: u16,
    /// Comma separated groups of `KEY=value` settings
    pub text: String,
}

impl ParameterText {
    /// Translate the text into a key/value mapping
    pub fn parameters(&self) -> Parameters {
        params::translate(&self.text)
    }
}

impl Record for ParameterText {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let (head, text) = read_text_block::<ParameterHead, _>(reader, "parameter text", end)?;
        Ok(ParameterText {
            header,
            info: head.info,
            status: head.status,
            text,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let head = ParameterHead {
            info: self.info,
            status: self.status,
        };
        write_text_block(writer, &head, &self.text)
    }
}

/// `#IBE`, `#IBR` or `#IBS` built-in self test report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bist {
    pub header: Header,
    /// 0 last part of the message, 1 more to come
    pub bist_info: u8,
    /// 0 plain text, 1 style sheet
    pub bist_style: u8,
    pub bist_number: u8,
    /// 0 no errors, positive a warning, negative an error
    pub bist_status: i8,
    pub text: String,
}

impl Record for Bist {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let (head, text) = read_text_block::<BistHead, _>(reader, "BIST text", end)?;
        Ok(Bist {
            header,
            bist_info: head.bist_info,
            bist_style: head.bist_style,
            bist_number: head.bist_number,
            bist_status: head.bist_status,
            text,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let head = BistHead {
            bist_info: self.bist_info,
            bist_style: self.bist_style,
            bist_number: self.bist_number,
            bist_status: self.bist_status,
        };
        write_text_block(writer, &head, &self.text)
    }
}
