//! Per transmit sector summary of the multibeam pings
use crate::index::FileIndex;
use crate::parser::multibeam::{Mrz, SectorPing};
use crate::parser::{DatagramKind, Record};
use binrw::io::BufReader;
use std::io::{stdout, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Detection method of soundings without a valid detection
const NO_DETECTION: u8 = 0;

fn write_row<W: Write>(writer: &mut W, ping: u16, part: &SectorPing) -> std::io::Result<()> {
    let s = &part.soundings;
    let valid: Vec<f32> = s
        .detection_method
        .iter()
        .zip(&s.z_re_ref_point_m)
        .filter(|&(&m, _)| m != NO_DETECTION)
        .map(|(_, &z)| z)
        .collect();
    let mean_depth = if valid.is_empty() {
        f32::NAN
    } else {
        valid.iter().sum::<f32>() / valid.len() as f32
    };
    writeln!(
        writer,
        "{:.6}\t{}\t{}\t{}\t{}\t{}\t{:.3}",
        part.time,
        ping,
        part.sector.tx_sector_numb,
        part.sector.centre_freq_hz,
        s.len(),
        valid.len(),
        mean_depth
    )
}

/// Write one row per transmit sector of every `#MRZ`
///
/// Columns are `time ping sector centre_freq soundings valid mean_depth`.
/// Returns the number of `#MRZ` datagrams that failed to decode.
pub fn write_sectors<R: Read + Seek, W: Write>(
    reader: &mut R,
    index: &FileIndex,
    writer: &mut W,
) -> crate::Result<usize> {
    let mut errors = 0;
    for offset in index.offsets_of(DatagramKind::RangeAndDepth) {
        reader.seek(SeekFrom::Start(offset))?;
        let mrz = match Mrz::read(reader) {
            Ok(mrz) => mrz,
            Err(e) => {
                warn!(offset, error = %e, "skipping undecodable multibeam datagram");
                errors += 1;
                continue;
            }
        };
        for part in mrz.split_by_sector() {
            write_row(writer, mrz.body.ping_cnt, &part)?;
        }
    }
    Ok(errors)
}

pub fn sectors(path: &Path, output: Option<PathBuf>) -> crate::Result<()> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let index = FileIndex::build(&mut reader)?;

    let errors = match output {
        Some(out) => {
            let mut writer = std::fs::File::create(out)?;
            write_sectors(&mut reader, &index, &mut writer)?
        }
        None => {
            let mut writer = stdout().lock();
            let n = write_sectors(&mut reader, &index, &mut writer)?;
            writer.flush()?;
            n
        }
    };
    if errors > 0 {
        eprintln!("{}: skipped {errors} undecodable pings", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::multibeam::test::sample_mrz;
    use std::io::Cursor;

    #[test]
    fn one_row_per_sector() {
        let mut bad = sample_mrz(1).to_bytes().unwrap();
        bad[24..26].copy_from_slice(&1u16.to_le_bytes());
        let bytes = [bad, sample_mrz(1).to_bytes().unwrap()].concat();
        let mut reader = Cursor::new(bytes);
        let index = FileIndex::build(&mut reader).unwrap();
        let mut out = Vec::new();
        let errors = write_sectors(&mut reader, &index, &mut out).unwrap();
        assert_eq!(errors, 1);

        let text = String::from_utf8(out).unwrap();
        let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
        assert_eq!(rows.len(), 2);
        // sector 0 fires soundings 0 to 2, sounding 2 has no detection
        assert_eq!(rows[0][1..3], ["7", "0"]);
        assert_eq!(rows[0][4..7], ["3", "2", "50.500"]);
        assert_eq!(rows[1][2], "1");
        assert_eq!(rows[1][4..7], ["2", "2", "53.500"]);
    }
}
