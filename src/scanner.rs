//! Walking a KMALL stream datagram by datagram
//!
//! The file has no magic and no index, so a [`DatagramReader`] identifies each
//! datagram from its header alone and moves on by the declared length. When the
//! bytes at the cursor do not look like a header, [`DatagramReader::resync`]
//! searches forward for the next `#XYZ` identifier whose framing checks out.
use crate::codec::{read_bytes, read_fixed};
use crate::parser::{Datagram, DatagramKind, Header, HEADER_SIZE, MIN_DATAGRAM_SIZE};
use crate::{Error, Result};
use regex::bytes::Regex;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Every known identifier, as searched for by [`DatagramReader::resync`]
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#(?:IIP|IOP|IBE|IBR|IBS|MRZ|MWC|SPO|SKM|SVP|SVT|SCL|SDE|SHI|CPO|CHE|CZ0|CZ1)")
        .expect("identifier pattern is valid")
});

/// Scanner settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Bytes searched for a datagram start after losing synchronisation
    pub resync_window: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            resync_window: 1 << 20,
        }
    }
}

/// Something the scanner recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// Invalid bytes were skipped to reach the next datagram
    DesyncRecovered {
        /// Where synchronisation was lost
        offset: u64,
        /// Bytes skipped
        skipped: u64,
    },
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEvent::DesyncRecovered { offset, skipped } => {
                write!(f, "skipped {skipped} invalid bytes at offset {offset}")
            }
        }
    }
}

/// A datagram identified by its header, body not yet read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peeked {
    /// Offset of the datagram start
    pub offset: u64,
    pub header: Header,
}

impl Peeked {
    /// Known kind, or `None` for a well-formed but unknown tag
    pub fn kind(&self) -> Option<DatagramKind> {
        self.header.kind()
    }

    /// Declared datagram length
    pub fn len(&self) -> u64 {
        u64::from(self.header.num_bytes_dgm)
    }

    /// Offset just past the datagram
    pub fn end(&self) -> u64 {
        self.offset + self.len()
    }
}

/// What a whole-file pass ran into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Datagrams identified, known or not
    pub datagrams: usize,
    /// Datagrams with a tag this crate does not know
    pub unknown: usize,
    /// Datagrams that were identified but failed to decode or verify
    pub record_errors: usize,
    /// Recoveries from lost synchronisation
    pub events: Vec<ScanEvent>,
    /// The error that ended the pass early, if any
    pub fatal: Option<String>,
}

impl ScanReport {
    /// Number of desync recoveries
    pub fn recovered(&self) -> usize {
        self.events.len()
    }

    /// Bytes skipped while resynchronising
    pub fn skipped_bytes(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                ScanEvent::DesyncRecovered { skipped, .. } => *skipped,
            })
            .sum()
    }

    /// True if the pass reached the end of the file
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none()
    }
}

/// Cursor over the datagrams of one KMALL stream
///
/// The reader should be buffered; datagram bodies are decoded field by field.
pub struct DatagramReader<R> {
    reader: R,
    len: u64,
    options: ScanOptions,
    current: Option<Peeked>,
    events: Vec<ScanEvent>,
    finished: bool,
}

impl<R: Read + Seek> DatagramReader<R> {
    /// Scan from the reader's current position with default options
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, ScanOptions::default())
    }

    pub fn with_options(mut reader: R, options: ScanOptions) -> Result<Self> {
        let pos = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;
        Ok(DatagramReader {
            reader,
            len,
            options,
            current: None,
            events: Vec::new(),
            finished: false,
        })
    }

    /// Length of the stream
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current cursor offset
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    /// Recoveries made so far
    pub fn events(&self) -> &[ScanEvent] {
        &self.events
    }

    /// Hand the recoveries made so far to the caller
    pub fn take_events(&mut self) -> Vec<ScanEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Identify the datagram at the cursor without consuming it
    ///
    /// `Ok(None)` at the end of the stream. A header that is not plausible is
    /// [`Error::Desync`]; a known datagram running past the end of the
    /// stream is [`Error::TruncatedRead`]. The cursor does not move.
    pub fn peek_next_identifier(&mut self) -> Result<Option<Peeked>> {
        if let Some(p) = &self.current {
            return Ok(Some(p.clone()));
        }
        let offset = self.reader.stream_position()?;
        if offset >= self.len {
            return Ok(None);
        }
        if self.len - offset < HEADER_SIZE {
            return Err(Error::Desync { offset });
        }
        let header: Header = read_fixed(&mut self.reader)?;
        self.reader.seek(SeekFrom::Start(offset))?;

        let declared = u64::from(header.num_bytes_dgm);
        if !header.has_valid_tag() || declared < MIN_DATAGRAM_SIZE {
            return Err(Error::Desync { offset });
        }
        if offset + declared > self.len {
            if header.kind().is_some() {
                return Err(Error::TruncatedRead);
            }
            return Err(Error::Desync { offset });
        }
        let peeked = Peeked { offset, header };
        self.current = Some(peeked.clone());
        Ok(Some(peeked))
    }

    /// Move past the datagram at the cursor by its declared length
    pub fn skip_current(&mut self) -> Result<()> {
        let Some(p) = self.peek_next_identifier()? else {
            return Ok(());
        };
        self.current = None;
        self.reader.seek(SeekFrom::Start(p.end()))?;
        Ok(())
    }

    /// Decode the datagram at the cursor
    ///
    /// Whether or not decoding succeeds the cursor ends up at the next
    /// datagram, so a bad record never stops the walk.
    pub fn decode_current(&mut self) -> Result<Option<Datagram>> {
        let Some(p) = self.peek_next_identifier()? else {
            return Ok(None);
        };
        self.current = None;
        self.reader.seek(SeekFrom::Start(p.offset))?;
        let res = Datagram::read(&mut self.reader);
        self.reader.seek(SeekFrom::Start(p.end()))?;
        if let Err(e) = &res {
            debug!(offset = p.offset, tag = %p.header.type_str(), error = %e, "datagram failed to decode");
        }
        res.map(Some)
    }

    /// Read the datagram at the cursor as raw bytes, for copying it unchanged
    pub fn read_current_raw(&mut self) -> Result<Option<(Peeked, Vec<u8>)>> {
        let Some(p) = self.peek_next_identifier()? else {
            return Ok(None);
        };
        self.current = None;
        self.reader.seek(SeekFrom::Start(p.offset))?;
        let bytes = read_bytes(&mut self.reader, p.len() as usize)?;
        Ok(Some((p, bytes)))
    }

    /// True if a framed datagram of a known kind starts at `offset`
    fn is_datagram_at(&mut self, offset: u64) -> Result<bool> {
        if self.len.saturating_sub(offset) < MIN_DATAGRAM_SIZE {
            return Ok(false);
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        let header: Header = read_fixed(&mut self.reader)?;
        let declared = u64::from(header.num_bytes_dgm);
        if header.kind().is_none() || declared < MIN_DATAGRAM_SIZE || offset + declared > self.len
        {
            return Ok(false);
        }
        self.reader.seek(SeekFrom::Start(offset + declared - 4))?;
        let trailer: u32 = read_fixed(&mut self.reader)?;
        Ok(trailer == header.num_bytes_dgm)
    }

    /// Search up to `window` bytes ahead for the next datagram
    ///
    /// A candidate must carry a known identifier, fit in the stream and end
    /// with a copy of its length. If the window reaches the end of the
    /// stream without a candidate, the rest of the stream is skipped.
    pub fn resync(&mut self, window: u64) -> Result<ScanEvent> {
        self.current = None;
        let offset = self.reader.stream_position()?;
        let end = offset.saturating_add(window).min(self.len);
        // a tag sits 4 bytes into the header, so look a little past the window
        let search_end = end.saturating_add(8).min(self.len);
        let buf = read_bytes(&mut self.reader, (search_end - offset) as usize)?;

        for m in IDENTIFIER.find_iter(&buf) {
            let Some(candidate) = (m.start() as u64).checked_sub(4).map(|c| c + offset) else {
                continue;
            };
            if candidate >= end {
                break;
            }
            if self.is_datagram_at(candidate)? {
                self.reader.seek(SeekFrom::Start(candidate))?;
                let skipped = candidate - offset;
                warn!(offset, skipped, "resynchronised on the next datagram");
                return Ok(ScanEvent::DesyncRecovered { offset, skipped });
            }
        }

        if end == self.len {
            self.reader.seek(SeekFrom::Start(self.len))?;
            let skipped = self.len - offset;
            warn!(offset, skipped, "no datagram before the end of the stream");
            return Ok(ScanEvent::DesyncRecovered { offset, skipped });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        Err(Error::Desync { offset })
    }

    /// Peek the next datagram, resynchronising past invalid bytes
    ///
    /// Recoveries are kept in [`events`](Self::events).
    pub fn next_identified(&mut self) -> Result<Option<Peeked>> {
        loop {
            match self.peek_next_identifier() {
                Err(Error::Desync { .. }) => {
                    let event = self.resync(self.options.resync_window)?;
                    self.events.push(event);
                }
                other => return other,
            }
        }
    }

    /// Decode the next datagram of a known kind
    ///
    /// Unknown datagrams are skipped by length. An `Err` that leaves the
    /// reader unfinished comes from the datagram itself; the next call
    /// continues after it.
    pub fn next_datagram(&mut self) -> Result<Option<Datagram>> {
        match self.next_known() {
            Ok(Some(_)) => self.decode_current(),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn next_known(&mut self) -> Result<Option<Peeked>> {
        while let Some(p) = self.next_identified()? {
            if p.kind().is_some() {
                return Ok(Some(p));
            }
            debug!(offset = p.offset, tag = %p.header.type_str(), "skipping unknown datagram");
            self.skip_current()?;
        }
        Ok(None)
    }

    /// True once the end of the stream or a fatal error was reached
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<R: Read + Seek> Iterator for DatagramReader<R> {
    type Item = Result<Datagram>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.next_datagram().transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::sensor::test::sample_skm;
    use crate::parser::Record;
    use std::io::Cursor;

    fn skm_bytes(t: u32) -> Vec<u8> {
        sample_skm(t).to_bytes().unwrap()
    }

    /// Garbage with a decoy `#MRZ` whose length cannot be right
    fn garbage(n: usize) -> Vec<u8> {
        let mut g = vec![0xab; n];
        if n >= 16 {
            g[8..12].copy_from_slice(b"#MRZ");
        }
        g
    }

    #[test]
    fn peek_does_not_move_and_skip_uses_length() {
        let first = skm_bytes(1);
        let mut bytes = first.clone();
        bytes.extend(skm_bytes(2));
        let mut scan = DatagramReader::new(Cursor::new(bytes)).unwrap();
        let p = scan.peek_next_identifier().unwrap().unwrap();
        assert_eq!(p.kind(), Some(DatagramKind::KmBinary));
        assert_eq!(p.len(), first.len() as u64);
        assert_eq!(scan.position().unwrap(), 0);
        scan.skip_current().unwrap();
        assert_eq!(scan.position().unwrap(), first.len() as u64);
        let second = scan.decode_current().unwrap().unwrap();
        assert_eq!(second.header().time_sec, 2);
        assert_eq!(scan.peek_next_identifier().unwrap(), None);
    }

    #[test]
    fn raw_read_copies_one_datagram() {
        let first = skm_bytes(1);
        let bytes = [first.clone(), skm_bytes(2)].concat();
        let mut scan = DatagramReader::new(Cursor::new(bytes)).unwrap();
        let (p, raw) = scan.read_current_raw().unwrap().unwrap();
        assert_eq!(p.offset, 0);
        assert_eq!(raw, first);
        assert_eq!(scan.position().unwrap(), first.len() as u64);
    }

    #[test]
    fn resync_reports_exactly_the_garbage() {
        for n in [1usize, 7, 37, 300] {
            let first = skm_bytes(1);
            let mut bytes = first.clone();
            bytes.extend(garbage(n));
            bytes.extend(skm_bytes(2));
            let mut scan = DatagramReader::new(Cursor::new(bytes)).unwrap();

            let times: Vec<u32> = scan
                .by_ref()
                .map(|d| d.unwrap().header().time_sec)
                .collect();
            assert_eq!(times, vec![1, 2]);
            assert_eq!(
                scan.events(),
                &[ScanEvent::DesyncRecovered {
                    offset: first.len() as u64,
                    skipped: n as u64
                }]
            );
        }
    }

    #[test]
    fn trailing_garbage_is_skipped_to_the_end() {
        let mut bytes = skm_bytes(1);
        bytes.extend(garbage(9));
        let mut scan = DatagramReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(scan.by_ref().count(), 1);
        assert_eq!(scan.events().len(), 1);
        assert!(scan.is_finished());
    }

    #[test]
    fn narrow_window_gives_up() {
        let mut bytes = skm_bytes(1);
        bytes.extend(garbage(64));
        bytes.extend(skm_bytes(2));
        let options = ScanOptions { resync_window: 16 };
        let mut scan = DatagramReader::with_options(Cursor::new(bytes), options).unwrap();
        assert!(scan.next().unwrap().is_ok());
        assert!(matches!(scan.next(), Some(Err(Error::Desync { .. }))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn datagram_past_the_end_is_fatal() {
        let mut bytes = skm_bytes(1);
        let second = skm_bytes(2);
        bytes.extend(&second[..second.len() - 10]);
        let mut scan = DatagramReader::new(Cursor::new(bytes)).unwrap();
        assert!(scan.next().unwrap().is_ok());
        assert!(matches!(scan.next(), Some(Err(Error::TruncatedRead))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn bad_record_does_not_stop_the_walk() {
        let mut bad = skm_bytes(1);
        // a sample count larger than the body
        bad[26..28].copy_from_slice(&50u16.to_le_bytes());
        bad.extend(skm_bytes(2));
        let mut scan = DatagramReader::new(Cursor::new(bad)).unwrap();
        assert!(scan.next().unwrap().is_err());
        assert_eq!(scan.next().unwrap().unwrap().header().time_sec, 2);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let mut bytes = skm_bytes(1);
        bytes[4..8].copy_from_slice(b"#ZZZ");
        bytes.extend(skm_bytes(2));
        let scan = DatagramReader::new(Cursor::new(bytes)).unwrap();
        let all: Vec<_> = scan.collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].header().time_sec, 2);
    }
}
