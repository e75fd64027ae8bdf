//! Whole file compression
//!
//! `#MRZ` datagrams are replaced by `#CZ0`/`#CZ1` on the way out and expanded
//! again on the way back; everything else is copied byte for byte. Damaged
//! stretches of the input are skipped by the scanner and not copied.
use super::{compress_mrz, CompressionOptions};
use crate::parser::{Datagram, DatagramKind, Record};
use crate::scanner::{DatagramReader, ScanReport};
use crate::{Error, Result};
use binrw::io::BufReader;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

/// What a file conversion did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    /// Datagrams compressed or expanded
    pub converted: usize,
    /// Datagrams copied unchanged
    pub copied: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub report: ScanReport,
}

impl Conversion {
    /// Output size as a fraction of the input size
    pub fn ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            return 1.0;
        }
        self.bytes_out as f64 / self.bytes_in as f64
    }
}

/// A path next to `input` with the given extension that does not exist yet
///
/// `survey.kmall` becomes `survey.0z`, then `survey_1.0z`, `survey_2.0z` and
/// so on if those are taken.
pub fn output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut candidate = input.with_file_name(format!("{stem}.{extension}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = input.with_file_name(format!("{stem}_{n}.{extension}"));
        n += 1;
    }
    candidate
}

/// Which way a stream is being converted
#[derive(Debug, Clone, Copy)]
enum Direction {
    Compress(CompressionOptions),
    Decompress,
}

impl Direction {
    /// Whether a datagram of this kind is decoded rather than copied
    fn converts(self, kind: Option<DatagramKind>) -> bool {
        match self {
            Direction::Compress(_) => kind == Some(DatagramKind::RangeAndDepth),
            Direction::Decompress => matches!(
                kind,
                Some(DatagramKind::CompressedWithImagery | DatagramKind::CompressedSoundingsOnly)
            ),
        }
    }

    fn convert(self, datagram: &Datagram) -> Result<Option<Vec<u8>>> {
        match (self, datagram) {
            (Direction::Compress(options), Datagram::RangeAndDepth(mrz)) => {
                Ok(Some(compress_mrz(mrz, &options)?.to_bytes()?))
            }
            (Direction::Decompress, Datagram::Compressed(cz)) => Ok(Some(cz.expand()?.to_bytes()?)),
            _ => Ok(None),
        }
    }
}

fn convert<R, W>(
    reader: R,
    writer: &mut W,
    direction: Direction,
    cancel: Option<&AtomicBool>,
) -> Result<Conversion>
where
    R: Read + Seek,
    W: Write,
{
    let mut scan = DatagramReader::new(reader)?;
    let mut out = Conversion {
        bytes_in: scan.len(),
        ..Default::default()
    };

    loop {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(Error::Cancelled);
        }
        let peeked = match scan.next_identified() {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "conversion stopped early");
                out.report.fatal = Some(e.to_string());
                break;
            }
        };

        let Some((_, raw)) = scan.read_current_raw()? else {
            break;
        };
        out.report.datagrams += 1;
        if peeked.kind().is_none() {
            out.report.unknown += 1;
        }
        if direction.converts(peeked.kind()) {
            let converted = Datagram::read(&mut Cursor::new(&raw)).and_then(|d| direction.convert(&d));
            match converted {
                Ok(Some(bytes)) => {
                    writer.write_all(&bytes)?;
                    out.bytes_out += bytes.len() as u64;
                    out.converted += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(offset = peeked.offset, error = %e, "copying datagram unchanged");
                    out.report.record_errors += 1;
                }
            }
        }
        writer.write_all(&raw)?;
        out.bytes_out += raw.len() as u64;
        out.copied += 1;
    }
    writer.flush()?;
    out.report.events = scan.take_events();
    Ok(out)
}

/// Replace every `#MRZ` of a stream by its compressed form
///
/// `cancel` is checked before each datagram.
pub fn compress_stream<R: Read + Seek, W: Write>(
    reader: R,
    writer: &mut W,
    options: &CompressionOptions,
    cancel: Option<&AtomicBool>,
) -> Result<Conversion> {
    convert(reader, writer, Direction::Compress(*options), cancel)
}

/// Expand every `#CZ0`/`#CZ1` of a stream back to `#MRZ`
pub fn decompress_stream<R: Read + Seek, W: Write>(
    reader: R,
    writer: &mut W,
    cancel: Option<&AtomicBool>,
) -> Result<Conversion> {
    convert(reader, writer, Direction::Decompress, cancel)
}

/// Compress `input` into a new file next to it, returning the path written
#[instrument(skip(options))]
pub fn compress_file(input: &Path, options: &CompressionOptions) -> Result<(PathBuf, Conversion)> {
    let output = output_path(input, options.level.suffix());
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(&output)?);
    let conversion = compress_stream(reader, &mut writer, options, None)?;
    info!(output = %output.display(), ratio = conversion.ratio(), "compressed");
    Ok((output, conversion))
}

/// Expand `input` into a new `.kmall` file next to it
#[instrument]
pub fn decompress_file(input: &Path) -> Result<(PathBuf, Conversion)> {
    let output = output_path(input, "kmall");
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(&output)?);
    let conversion = decompress_stream(reader, &mut writer, None)?;
    info!(output = %output.display(), "decompressed");
    Ok((output, conversion))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::CompressionLevel;
    use crate::parser::multibeam::test::sample_mrz;
    use crate::parser::sensor::test::sample_skm;

    fn sample_file() -> Vec<u8> {
        [
            sample_skm(1).to_bytes().unwrap(),
            sample_mrz(1).to_bytes().unwrap(),
            sample_skm(2).to_bytes().unwrap(),
        ]
        .concat()
    }

    #[test]
    fn compress_then_decompress_restores_the_layout() {
        let original = sample_file();
        let mut packed = Vec::new();
        let c = compress_stream(
            Cursor::new(original.clone()),
            &mut packed,
            &CompressionOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!((c.converted, c.copied), (1, 2));
        assert_eq!(c.bytes_out, packed.len() as u64);

        let kinds: Vec<_> = DatagramReader::new(Cursor::new(packed.clone()))
            .unwrap()
            .map(|d| d.unwrap().kind().unwrap())
            .collect();
        assert_eq!(
            kinds,
            [
                DatagramKind::KmBinary,
                DatagramKind::CompressedWithImagery,
                DatagramKind::KmBinary
            ]
        );

        let mut restored = Vec::new();
        let d = decompress_stream(Cursor::new(packed), &mut restored, None).unwrap();
        assert_eq!((d.converted, d.copied), (1, 2));
        // only the reflectivity of the non-detect differs, the framing is identical
        assert_eq!(restored.len(), original.len());
        let skm = sample_skm(1).to_bytes().unwrap();
        assert_eq!(restored[..skm.len()], original[..skm.len()]);
    }

    #[test]
    fn soundings_only_drops_the_image() {
        let mut packed = Vec::new();
        let options = CompressionOptions {
            level: CompressionLevel::SoundingsOnly,
            ..Default::default()
        };
        compress_stream(Cursor::new(sample_file()), &mut packed, &options, None).unwrap();
        let mut restored = Vec::new();
        decompress_stream(Cursor::new(packed), &mut restored, None).unwrap();
        let mrz = DatagramReader::new(Cursor::new(restored))
            .unwrap()
            .filter_map(|d| match d.unwrap() {
                Datagram::RangeAndDepth(m) => Some(m),
                _ => None,
            })
            .next()
            .unwrap();
        assert!(mrz.seabed_image.is_empty());
    }

    #[test]
    fn garbage_between_datagrams_is_dropped() {
        let mut bytes = sample_skm(1).to_bytes().unwrap();
        bytes.extend([0x55u8; 9]);
        bytes.extend(sample_mrz(1).to_bytes().unwrap());
        let mut packed = Vec::new();
        let c = compress_stream(
            Cursor::new(bytes),
            &mut packed,
            &CompressionOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(c.report.recovered(), 1);
        assert_eq!(c.report.skipped_bytes(), 9);
        assert_eq!(c.converted, 1);
    }

    #[test]
    fn cancelled_pass_stops() {
        let cancel = AtomicBool::new(true);
        let mut packed = Vec::new();
        let res = compress_stream(
            Cursor::new(sample_file()),
            &mut packed,
            &CompressionOptions::default(),
            Some(&cancel),
        );
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(packed.is_empty());
    }

    #[test]
    fn output_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("line.kmall");
        assert_eq!(output_path(&input, "0z"), dir.path().join("line.0z"));
        std::fs::write(dir.path().join("line.0z"), b"").unwrap();
        std::fs::write(dir.path().join("line_1.0z"), b"").unwrap();
        assert_eq!(output_path(&input, "0z"), dir.path().join("line_2.0z"));
    }
}
