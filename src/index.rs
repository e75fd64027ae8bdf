//! Indexing KMALL files
//!
//! A [`FileIndex`] lists every datagram of a file by time, offset, size and
//! type. It is built from headers alone with a peek and skip loop, so no body
//! is decoded. Other passes (navigation, ping checks, compression) seek to the
//! indexed offsets instead of walking the file again.
use crate::codec::{read_declared, read_fixed};
use crate::parser::multibeam::{MultibeamBody, Partition};
use crate::parser::{DatagramKind, HEADER_SIZE};
use crate::scanner::{DatagramReader, ScanOptions, ScanReport};
use crate::{Error, Result};
use binrw::io::BufReader;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

/// One row of the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Header time, seconds since the epoch
    pub time: f64,
    /// Offset of the datagram in the file
    pub offset: u64,
    /// Declared datagram length
    pub size: u32,
    /// Type tag, e.g. `#MRZ`
    pub kind: String,
}

impl IndexEntry {
    /// The known kind of the datagram, if any
    pub fn datagram_kind(&self) -> Option<DatagramKind> {
        let code: [u8; 4] = self.kind.as_bytes().try_into().ok()?;
        DatagramKind::from_code(&code)
    }
}

/// Size statistics of one datagram type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeStats {
    pub count: usize,
    /// Sum of the datagram sizes in bytes
    pub total: u64,
    pub min: u32,
    pub max: u32,
}

/// The datagrams of one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileIndex {
    pub entries: Vec<IndexEntry>,
    /// Recoveries and the fatal error, if any, met while indexing
    pub report: ScanReport,
}

impl FileIndex {
    /// Index a stream from its current position
    pub fn build<R: Read + Seek>(reader: R) -> Result<FileIndex> {
        FileIndex::build_with(reader, ScanOptions::default(), None)
    }

    /// Index a file
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileIndex> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        FileIndex::build(reader)
    }

    /// Index a stream, checking `cancel` before each datagram
    ///
    /// A fatal scan error ends the pass early; the rows found so far are
    /// kept and the error is recorded in the report. Cancellation is an
    /// error of its own.
    #[instrument(skip_all)]
    pub fn build_with<R: Read + Seek>(
        reader: R,
        options: ScanOptions,
        cancel: Option<&AtomicBool>,
    ) -> Result<FileIndex> {
        let mut scan = DatagramReader::with_options(reader, options)?;
        let mut index = FileIndex::default();
        loop {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(Error::Cancelled);
            }
            match scan.next_identified() {
                Ok(Some(p)) => {
                    index.report.datagrams += 1;
                    if p.kind().is_none() {
                        index.report.unknown += 1;
                    }
                    index.entries.push(IndexEntry {
                        time: p.header.timestamp(),
                        offset: p.offset,
                        size: p.header.num_bytes_dgm,
                        kind: p.header.type_str(),
                    });
                    scan.skip_current()?;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, rows = index.entries.len(), "indexing stopped early");
                    index.report.fatal = Some(e.to_string());
                    break;
                }
            }
        }
        index.report.events = scan.take_events();
        info!(
            rows = index.entries.len(),
            recovered = index.report.recovered(),
            "indexed"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order rows by file offset
    pub fn sort_by_offset(&mut self) {
        self.entries.sort_by_key(|e| e.offset);
    }

    /// Order rows by time, keeping file order between equal times
    pub fn sort_by_time(&mut self) {
        self.entries.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Offsets of every datagram of `kind`
    pub fn offsets_of(&self, kind: DatagramKind) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.datagram_kind() == Some(kind))
            .map(|e| e.offset)
    }

    /// Count and size statistics per type tag
    pub fn stats(&self) -> BTreeMap<String, TypeStats> {
        let mut stats: BTreeMap<String, TypeStats> = BTreeMap::new();
        for e in &self.entries {
            stats
                .entry(e.kind.clone())
                .and_modify(|s| {
                    s.count += 1;
                    s.total += u64::from(e.size);
                    s.min = s.min.min(e.size);
                    s.max = s.max.max(e.size);
                })
                .or_insert(TypeStats {
                    count: 1,
                    total: u64::from(e.size),
                    min: e.size,
                    max: e.size,
                });
        }
        stats
    }

    /// Write `time offset size type` rows separated by tabs
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for e in &self.entries {
            writeln!(writer, "{:.6}\t{}\t{}\t{}", e.time, e.offset, e.size, e.kind)?;
        }
        Ok(())
    }
}

/// A datagram whose trailing length disagrees with its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerMismatch {
    pub offset: u64,
    /// Length in the header
    pub declared: u32,
    /// Length in the trailer
    pub found: u32,
}

impl From<TrailerMismatch> for Error {
    fn from(m: TrailerMismatch) -> Error {
        Error::LengthMismatch {
            offset: m.offset,
            declared: u64::from(m.declared),
            actual: u64::from(m.found),
        }
    }
}

/// Compare the trailing length of every indexed datagram with its header
pub fn check_trailers<R: Read + Seek>(
    reader: &mut R,
    index: &FileIndex,
) -> Result<Vec<TrailerMismatch>> {
    let mut mismatches = Vec::new();
    for e in &index.entries {
        reader.seek(SeekFrom::Start(e.offset + u64::from(e.size) - 4))?;
        let found: u32 = read_fixed(reader)?;
        if found != e.size {
            let m = TrailerMismatch {
                offset: e.offset,
                declared: e.size,
                found,
            };
            warn!(error = %Error::from(m), "trailing length check failed");
            mismatches.push(m);
        }
    }
    Ok(mismatches)
}

/// Whether every ping has all of its receive fans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingCompleteness {
    /// Distinct ping counters seen
    pub pings_seen: usize,
    /// Counters missing between the smallest and largest seen
    pub pings_missed: u64,
    pub first_ping: Option<u16>,
    pub last_ping: Option<u16>,
    /// Pings with fewer or more fans than `rxFansPerPing`
    pub incomplete: Vec<u16>,
    /// Multibeam datagrams whose body could not be read
    pub undecodable: usize,
}

impl PingCompleteness {
    /// Pings seen plus pings missed
    pub fn pings_total(&self) -> u64 {
        self.pings_seen as u64 + self.pings_missed
    }
}

/// Check ping counters and receive fans of the multibeam datagrams
///
/// Only the header, partition and body of each `#MRZ` (or `#CZ0`/`#CZ1`) are
/// read.
pub fn check_pings<R: Read + Seek>(reader: &mut R, index: &FileIndex) -> Result<PingCompleteness> {
    // ping counter -> (fans per ping, fan indices seen)
    let mut pings: BTreeMap<u16, (u8, BTreeSet<u8>)> = BTreeMap::new();
    let mut undecodable = 0;
    let multibeam = [
        DatagramKind::RangeAndDepth,
        DatagramKind::CompressedWithImagery,
        DatagramKind::CompressedSoundingsOnly,
    ];
    for e in &index.entries {
        if !e.datagram_kind().is_some_and(|k| multibeam.contains(&k)) {
            continue;
        }
        reader.seek(SeekFrom::Start(e.offset + HEADER_SIZE))?;
        let body = match read_multibeam_body(reader) {
            Ok(body) => body,
            Err(err) => {
                warn!(offset = e.offset, error = %err, "multibeam body failed to decode");
                undecodable += 1;
                continue;
            }
        };
        let (fans, seen) = pings
            .entry(body.ping_cnt)
            .or_insert_with(|| (body.rx_fans_per_ping, BTreeSet::new()));
        *fans = body.rx_fans_per_ping;
        seen.insert(body.rx_fan_index);
    }

    let counters: Vec<u16> = pings.keys().copied().collect();
    let pings_missed = counters
        .windows(2)
        .map(|w| u64::from(w[1] - w[0]).saturating_sub(1))
        .sum();
    let incomplete = pings
        .iter()
        .filter(|(_, (fans, seen))| seen.len() != usize::from(*fans))
        .map(|(&ping, _)| ping)
        .collect::<Vec<_>>();
    if !incomplete.is_empty() {
        warn!(pings = incomplete.len(), "pings with missing receive fans");
    }
    Ok(PingCompleteness {
        pings_seen: counters.len(),
        pings_missed,
        first_ping: counters.first().copied(),
        last_ping: counters.last().copied(),
        incomplete,
        undecodable,
    })
}

fn read_multibeam_body<R: Read + Seek>(reader: &mut R) -> Result<MultibeamBody> {
    let _partition: Partition = read_fixed(reader)?;
    read_declared(reader, "MRZ body")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::multibeam::test::sample_mrz;
    use crate::parser::sensor::test::sample_skm;
    use crate::parser::Record;
    use std::io::Cursor;

    fn mrz(ping: u16, fans: u8, fan: u8, t: u32) -> Vec<u8> {
        let mut m = sample_mrz(1);
        m.body.ping_cnt = ping;
        m.body.rx_fans_per_ping = fans;
        m.body.rx_fan_index = fan;
        m.header.time_sec = t;
        m.to_bytes().unwrap()
    }

    #[test]
    fn rows_stats_and_sorting() {
        let a = sample_skm(30).to_bytes().unwrap();
        let b = mrz(1, 1, 0, 20);
        let c = sample_skm(10).to_bytes().unwrap();
        let bytes = [a.clone(), b.clone(), c.clone()].concat();
        let mut index = FileIndex::build(Cursor::new(bytes)).unwrap();
        assert_eq!(index.len(), 3);
        let offsets: Vec<u64> = index.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, a.len() as u64, (a.len() + b.len()) as u64]);
        assert_eq!(index.entries[1].kind, "#MRZ");
        assert_eq!(index.entries[1].datagram_kind(), Some(DatagramKind::RangeAndDepth));

        let stats = index.stats();
        assert_eq!(stats["#SKM"].count, 2);
        assert_eq!(stats["#SKM"].total, (a.len() + c.len()) as u64);
        assert_eq!(stats["#MRZ"].min, b.len() as u32);

        index.sort_by_time();
        let kinds: Vec<&str> = index.entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["#SKM", "#MRZ", "#SKM"]);
        assert_eq!(index.entries[0].offset, (a.len() + b.len()) as u64);
        index.sort_by_offset();
        assert_eq!(index.entries[0].offset, 0);

        let mut tsv = Vec::new();
        index.write_tsv(&mut tsv).unwrap();
        let text = String::from_utf8(tsv).unwrap();
        assert_eq!(text.lines().count(), 3);
        let first: Vec<&str> = text.lines().next().unwrap().split('\t').collect();
        let size = a.len().to_string();
        assert_eq!(first[1..], ["0", size.as_str(), "#SKM"]);
    }

    #[test]
    fn cancelled_pass_stops() {
        let cancel = AtomicBool::new(true);
        let bytes = sample_skm(1).to_bytes().unwrap();
        assert!(matches!(
            FileIndex::build_with(Cursor::new(bytes), ScanOptions::default(), Some(&cancel)),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn truncated_file_keeps_rows_found() {
        let mut bytes = sample_skm(1).to_bytes().unwrap();
        let second = sample_skm(2).to_bytes().unwrap();
        bytes.extend(&second[..40]);
        let index = FileIndex::build(Cursor::new(bytes)).unwrap();
        assert_eq!(index.len(), 1);
        assert!(!index.report.is_complete());
    }

    #[test]
    fn trailer_mismatch_is_reported() {
        let mut bytes = sample_skm(1).to_bytes().unwrap();
        let n = bytes.len();
        bytes[n - 1] = 0x7f;
        let mut reader = Cursor::new(bytes);
        let index = FileIndex::build(&mut reader).unwrap();
        let bad = check_trailers(&mut reader, &index).unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].declared as usize, n);
        assert!(matches!(Error::from(bad[0]), Error::LengthMismatch { offset: 0, .. }));
    }

    #[test]
    fn bad_body_word_is_counted_and_skipped() {
        let mut bad = mrz(4, 1, 0, 1);
        bad[24..26].copy_from_slice(&1u16.to_le_bytes());
        let bytes = [bad, mrz(5, 1, 0, 2), sample_skm(3).to_bytes().unwrap()].concat();
        let mut reader = Cursor::new(bytes);
        let index = FileIndex::build(&mut reader).unwrap();
        let pings = check_pings(&mut reader, &index).unwrap();
        assert_eq!(pings.undecodable, 1);
        assert_eq!(pings.pings_seen, 1);
        assert_eq!(pings.first_ping, Some(5));
    }

    #[test]
    fn missing_pings_and_fans() {
        let bytes = [
            mrz(5, 2, 0, 1),
            mrz(5, 2, 1, 1),
            mrz(6, 2, 0, 2),
            mrz(9, 2, 0, 3),
            mrz(9, 2, 1, 3),
        ]
        .concat();
        let mut reader = Cursor::new(bytes);
        let index = FileIndex::build(&mut reader).unwrap();
        let pings = check_pings(&mut reader, &index).unwrap();
        assert_eq!(pings.pings_seen, 3);
        assert_eq!(pings.pings_missed, 2);
        assert_eq!(pings.pings_total(), 5);
        assert_eq!(pings.incomplete, vec![6]);
        assert_eq!((pings.first_ping, pings.last_ping), (Some(5), Some(9)));
    }
}
