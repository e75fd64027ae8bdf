//! File verification
//!
//! Checks a KMALL file the way a surveyor would before processing it: which
//! datagrams it holds, whether their framing is intact, whether pings are
//! missing and whether the attitude stream has gaps.
use crate::index::{check_pings, check_trailers, FileIndex, PingCompleteness, TrailerMismatch};
use crate::nav::{extract_attitude, gap_stats, GapStats, ATTITUDE_GAP_S};
use crate::params::{describe_key, describe_section, Parameters};
use crate::parser::install::ParameterText;
use crate::parser::{DatagramKind, Record};
use crate::Result;
use binrw::io::BufReader;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{instrument, warn};

/// Findings for one file
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub source: String,
    pub index: FileIndex,
    pub trailers: Vec<TrailerMismatch>,
    pub pings: PingCompleteness,
    /// Spacing of attitude samples, if there are at least two
    pub attitude: Option<GapStats>,
    /// `#SKM` datagrams that failed to decode
    pub attitude_errors: usize,
    /// Settings from the first `#IIP`, if there is one that decodes
    pub installation: Option<Parameters>,
}

impl VerifyReport {
    /// True if nothing was found wrong
    pub fn is_clean(&self) -> bool {
        self.index.report.is_complete()
            && self.index.report.recovered() == 0
            && self.trailers.is_empty()
            && self.pings.pings_missed == 0
            && self.pings.incomplete.is_empty()
            && self.pings.undecodable == 0
            && self.attitude_errors == 0
    }
}

/// Verify the file at `path`
pub fn verify_file<P: AsRef<Path>>(path: P) -> Result<VerifyReport> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    verify(&mut reader, &path.display().to_string())
}

/// Verify a stream
#[instrument(skip(reader))]
pub fn verify<R: Read + Seek>(reader: &mut R, source: &str) -> Result<VerifyReport> {
    let index = FileIndex::build(&mut *reader)?;
    let trailers = check_trailers(reader, &index)?;
    let pings = check_pings(reader, &index)?;

    let attitude = extract_attitude(reader, &index, source)?;
    let times: Vec<f64> = attitude.records.iter().map(|a| a.time).collect();

    let installation = match index.offsets_of(DatagramKind::InstallationParameters).next() {
        Some(offset) => {
            reader.seek(SeekFrom::Start(offset))?;
            match ParameterText::read(reader) {
                Ok(iip) => Some(iip.parameters()),
                Err(e) => {
                    warn!(offset, error = %e, "installation parameters failed to decode");
                    None
                }
            }
        }
        None => None,
    };

    Ok(VerifyReport {
        source: source.to_string(),
        installation,
        trailers,
        pings,
        attitude: gap_stats(&times, ATTITUDE_GAP_S),
        attitude_errors: attitude.errors,
        index,
    })
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.source)?;
        writeln!(f, "  Packet types:")?;
        writeln!(f, "    type\tcount\tsize\tmin\tmax")?;
        for (kind, s) in self.index.stats() {
            writeln!(
                f,
                "    {kind}\t{}\t{}\t{}\t{}",
                s.count, s.total, s.min, s.max
            )?;
        }
        let report = &self.index.report;
        if report.recovered() > 0 {
            writeln!(
                f,
                "  Resynchronised {} times, {} bytes skipped",
                report.recovered(),
                report.skipped_bytes()
            )?;
        }
        if let Some(fatal) = &report.fatal {
            writeln!(f, "  Stopped early: {fatal}")?;
        }
        writeln!(f, "  Trailing length mismatches: {}", self.trailers.len())?;
        for m in &self.trailers {
            writeln!(
                f,
                "    offset {}: header {} trailer {}",
                m.offset, m.declared, m.found
            )?;
        }
        match (self.pings.first_ping, self.pings.last_ping) {
            (Some(first), Some(last)) => writeln!(
                f,
                "  Pings {first}..{last}: {} of {} seen, {} missed, {} missing fans",
                self.pings.pings_seen,
                self.pings.pings_total(),
                self.pings.pings_missed,
                self.pings.incomplete.len()
            )?,
            _ => writeln!(f, "  No pings in file")?,
        }
        match &self.attitude {
            Some(a) => writeln!(
                f,
                "  Attitude gaps min: {:.3}, max: {:.3}, mean: {:.3} ({:.3} Hz), >= {ATTITUDE_GAP_S} s: {}",
                a.min, a.max, a.mean, a.rate_hz, a.gaps
            )?,
            None => writeln!(f, "  Not enough attitude samples")?,
        }
        if self.pings.undecodable > 0 {
            writeln!(f, "  Undecodable multibeam datagrams: {}", self.pings.undecodable)?;
        }
        if self.attitude_errors > 0 {
            writeln!(f, "  Undecodable attitude datagrams: {}", self.attitude_errors)?;
        }
        if let Some(params) = &self.installation {
            write_installation(f, params)?;
        }
        Ok(())
    }
}

fn write_installation(f: &mut fmt::Formatter<'_>, params: &Parameters) -> fmt::Result {
    writeln!(f, "  Installation:")?;
    for (section, settings) in &params.sections {
        let name = if section.is_empty() { "(top level)" } else { section };
        match describe_section(section) {
            Some(d) => writeln!(f, "    {name} ({d})")?,
            None => writeln!(f, "    {name}")?,
        }
        for (key, value) in settings {
            // top level keys are often device identifiers themselves
            match describe_key(key).or_else(|| describe_section(key)) {
                Some(d) => writeln!(f, "      {key} = {value} ({d})")?,
                None => writeln!(f, "      {key} = {value}")?,
            }
        }
    }
    if !params.unparsed.is_empty() {
        writeln!(f, "    Unparsed: {}", params.unparsed.join(", "))?;
    }
    Ok(())
}
