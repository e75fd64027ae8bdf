//! Attitude and position extraction
//!
//! Navigation comes from `#SKM` (attitude, one datagram per batch of KM binary
//! samples) and `#SPO` (position fixes). Both are decoded at the offsets of a
//! [`FileIndex`], so only the datagrams needed are read.
use crate::index::FileIndex;
use crate::model::{datetime, Attitude, Position};
use crate::parser::sensor::{Skm, Spo};
use crate::parser::{DatagramKind, Record};
use crate::Result;
use std::io::{Read, Seek, SeekFrom};
use tracing::{instrument, warn};

/// Gaps between attitude samples at least this long are reported
pub const ATTITUDE_GAP_S: f64 = 1.0;

/// Attitude samples of one `#SKM`
pub fn attitude_of(skm: &Skm, source: &str) -> Vec<Attitude> {
    skm.samples
        .rows()
        .map(|s| {
            let time = s.time();
            Attitude {
                source: source.to_string(),
                timestamp: datetime(time),
                time,
                roll: f64::from(s.roll_deg),
                pitch: f64::from(s.pitch_deg),
                heading: f64::from(s.heading_deg),
                heave: f64::from(s.heave_m),
                status: s.status,
            }
        })
        .collect()
}

/// The position fix of one `#SPO`
pub fn position_of(spo: &Spo, source: &str) -> Position {
    let time = spo.fix.sensor_time();
    Position {
        source: source.to_string(),
        timestamp: datetime(time),
        time,
        latitude: spo.fix.corrected_lat_deg,
        longitude: spo.fix.corrected_long_deg,
        ellipsoid_height: f64::from(spo.fix.ellipsoid_height_re_ref_point_m),
        quality: f64::from(spo.fix.pos_fix_quality_m),
    }
}

/// Records decoded from one kind of datagram
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub records: Vec<T>,
    /// Datagrams that failed to decode and were skipped
    pub errors: usize,
}

/// Decode the datagrams of `kind`, warning about and skipping those that fail
fn extract<R, D, T>(
    reader: &mut R,
    index: &FileIndex,
    kind: DatagramKind,
    mut convert: impl FnMut(D, &mut Vec<T>),
) -> Result<Extracted<T>>
where
    R: Read + Seek,
    D: Record,
{
    let mut out = Extracted {
        records: Vec::new(),
        errors: 0,
    };
    for offset in index.offsets_of(kind) {
        reader.seek(SeekFrom::Start(offset))?;
        match D::read(reader) {
            Ok(datagram) => convert(datagram, &mut out.records),
            Err(e) => {
                warn!(offset, %kind, error = %e, "skipping undecodable datagram");
                out.errors += 1;
            }
        }
    }
    Ok(out)
}

/// Decode every `#SKM` in the index
#[instrument(skip_all, fields(source = %source))]
pub fn extract_attitude<R: Read + Seek>(
    reader: &mut R,
    index: &FileIndex,
    source: &str,
) -> Result<Extracted<Attitude>> {
    extract(reader, index, DatagramKind::KmBinary, |skm: Skm, out| {
        out.extend(attitude_of(&skm, source))
    })
}

/// Decode every `#SPO` in the index
#[instrument(skip_all, fields(source = %source))]
pub fn extract_positions<R: Read + Seek>(
    reader: &mut R,
    index: &FileIndex,
    source: &str,
) -> Result<Extracted<Position>> {
    extract(reader, index, DatagramKind::Position, |spo: Spo, out| {
        out.push(position_of(&spo, source))
    })
}

/// Spacing of a series of sample times
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapStats {
    /// Smallest absolute interval
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample rate implied by the mean interval
    pub rate_hz: f64,
    /// Intervals of at least the gap threshold
    pub gaps: usize,
}

/// Interval statistics of `times`, `None` with fewer than two samples
pub fn gap_stats(times: &[f64], threshold: f64) -> Option<GapStats> {
    if times.len() < 2 {
        return None;
    }
    let dt: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = dt.iter().sum::<f64>() / dt.len() as f64;
    Some(GapStats {
        min: dt.iter().map(|d| d.abs()).fold(f64::INFINITY, f64::min),
        max: dt.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        rate_hz: if mean > 0.0 { 1.0 / mean } else { f64::INFINITY },
        gaps: dt.iter().filter(|&&d| d >= threshold).count(),
    })
}
