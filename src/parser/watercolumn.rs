//! `#MWC` multibeam water column datagrams
use super::header::{DatagramKind, Header};
use super::multibeam::{MultibeamBody, Partition};
use super::Record;
use crate::codec::{
    count_word, ensure_room, read_declared, read_fixed, read_rows, write_declared, write_fixed,
    write_rows,
};
use crate::{Error, Result};
use binrw::{binrw, BinRead, BinWrite, Endian};
use std::io::{Read, Seek, Write};
use tracing::warn;

/// Highest `#MWC` version with a known beam layout
pub const MWC_MAX_VERSION: u8 = 2;

/// Size of one transmit sector entry
pub const WC_SECTOR_SIZE: u16 = 16;

/// Size of the fixed part of a beam entry for an `#MWC` version
pub fn beam_entry_size(version: u8) -> u8 {
    if version >= 1 {
        16
    } else {
        12
    }
}

/// Transmit info (EMdgmMWCtxInfo), stored behind `numBytesTxInfo`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcTxInfo {
    pub num_tx_sectors: u16,
    pub num_bytes_per_tx_sector: u16,
    pub padding: i16,
    pub heave_m: f32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcSectorData {
    pub tilt_angle_re_tx_deg: f32,
    pub centre_freq_hz: f32,
    pub tx_beam_width_along_deg: f32,
    pub tx_sector_num: u16,
    pub padding: i16,
}

columns! {
    /// Transmit sectors of one `#MWC`
    pub struct WcSectors for WcSectorData {
        tilt_angle_re_tx_deg: f32,
        centre_freq_hz: f32,
        tx_beam_width_along_deg: f32,
        tx_sector_num: u16,
        padding: i16,
    }
}

/// Receiver info (EMdgmMWCrxInfo), stored behind `numBytesRxInfo`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcRxInfo {
    pub num_beams: u16,
    pub num_bytes_per_beam_entry: u8,
    /// 0 no phase, 1 low resolution (`i8`), 2 high resolution (`i16`)
    pub phase_flag: u8,
    pub tvg_function_applied: u8,
    pub tvg_offset_db: i8,
    pub sample_freq_hz: f32,
    pub sound_velocity_m_per_sec: f32,
}

/// Fixed part of a beam entry (EMdgmMWCrxBeamData)
#[binrw]
#[brw(little)]
#[br(import(version: u8))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcBeamInfo {
    pub beam_point_ang_re_vertical_deg: f32,
    pub start_range_sample_num: u16,
    pub detected_range_in_samples: u16,
    pub beam_tx_sector_num: u16,
    /// Rewritten by the encoder from the amplitude array
    pub num_sample_data: u16,
    #[br(if(version >= 1))]
    pub detected_range_in_samples_high_resolution: Option<f32>,
}

/// Per-sample phase of one beam
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Phase {
    #[default]
    Off,
    /// 180/128 degree resolution
    Low(Vec<i8>),
    /// 0.01 degree resolution
    High(Vec<i16>),
}

impl Phase {
    fn flag(&self) -> u8 {
        match self {
            Phase::Off => 0,
            Phase::Low(_) => 1,
            Phase::High(_) => 2,
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Phase::Off => None,
            Phase::Low(v) => Some(v.len()),
            Phase::High(v) => Some(v.len()),
        }
    }
}

/// One receive beam with its samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcBeam {
    pub info: WcBeamInfo,
    /// Sample amplitudes in 0.5 dB
    pub amplitude: Vec<i8>,
    pub phase: Phase,
}

/// `#MWC`: multibeam water column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mwc {
    pub header: Header,
    pub partition: Partition,
    pub body: MultibeamBody,
    pub tx_info: WcTxInfo,
    pub sectors: WcSectors,
    pub rx_info: WcRxInfo,
    pub beams: Vec<WcBeam>,
}

fn read_beam<R: Read + Seek>(
    reader: &mut R,
    version: u8,
    phase_flag: u8,
    end: u64,
) -> Result<WcBeam> {
    let info = WcBeamInfo::read_options(reader, Endian::Little, (version,))?;
    let n = usize::from(info.num_sample_data);
    ensure_room(reader, end, n, 1)?;
    let amplitude = read_rows(reader, n)?;
    let phase = match phase_flag {
        0 => Phase::Off,
        1 => {
            ensure_room(reader, end, n, 1)?;
            Phase::Low(read_rows(reader, n)?)
        }
        2 => {
            ensure_room(reader, end, n, 2)?;
            Phase::High(read_rows(reader, n)?)
        }
        other => return Err(Error::Parse(format!("MWC phase flag {other} is not 0, 1 or 2"))),
    };
    Ok(WcBeam {
        info,
        amplitude,
        phase,
    })
}

impl Record for Mwc {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let version = header.dgm_version;
        if version > MWC_MAX_VERSION {
            return Err(Error::UnsupportedVersion {
                kind: DatagramKind::WaterColumn.name(),
                version,
            });
        }
        let partition = read_fixed(reader)?;
        let body = read_declared(reader, "MWC body")?;
        let tx_info: WcTxInfo = read_declared(reader, "MWC tx info")?;
        let num_sectors = usize::from(tx_info.num_tx_sectors);
        ensure_room(reader, end, num_sectors, usize::from(WC_SECTOR_SIZE))?;
        let sectors = read_rows::<WcSectorData, _>(reader, num_sectors)?.into();

        let rx_info: WcRxInfo = read_declared(reader, "MWC rx info")?;
        if rx_info.num_bytes_per_beam_entry != beam_entry_size(version) {
            warn!(
                version,
                declared = rx_info.num_bytes_per_beam_entry,
                used = beam_entry_size(version),
                "beam entry size disagrees with datagram version"
            );
        }
        let num_beams = usize::from(rx_info.num_beams);
        ensure_room(reader, end, num_beams, usize::from(beam_entry_size(version)))?;
        let beams = (0..num_beams)
            .map(|_| read_beam(reader, version, rx_info.phase_flag, end))
            .collect::<Result<Vec<_>>>()?;

        Ok(Mwc {
            header,
            partition,
            body,
            tx_info,
            sectors,
            rx_info,
            beams,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let version = self.header.dgm_version;
        if version > MWC_MAX_VERSION {
            return Err(Error::UnsupportedVersion {
                kind: DatagramKind::WaterColumn.name(),
                version,
            });
        }
        let mut tx_info = self.tx_info.clone();
        tx_info.num_tx_sectors = count_word("water column sectors", self.sectors.len())?;
        tx_info.num_bytes_per_tx_sector = WC_SECTOR_SIZE;

        let mut rx_info = self.rx_info.clone();
        rx_info.num_beams = count_word("water column beams", self.beams.len())?;
        rx_info.num_bytes_per_beam_entry = beam_entry_size(version);
        if let Some(first) = self.beams.first() {
            rx_info.phase_flag = first.phase.flag();
        }

        write_fixed(writer, &self.partition)?;
        write_declared(writer, &self.body)?;
        write_declared(writer, &tx_info)?;
        write_rows(writer, &self.sectors.rows().collect::<Vec<_>>())?;
        write_declared(writer, &rx_info)?;

        for beam in &self.beams {
            if beam.phase.flag() != rx_info.phase_flag {
                return Err(Error::CountMismatch {
                    what: "beams sharing the datagram phase flag",
                    expected: usize::from(rx_info.phase_flag),
                    actual: usize::from(beam.phase.flag()),
                });
            }
            if let Some(n) = beam.phase.len() {
                if n != beam.amplitude.len() {
                    return Err(Error::CountMismatch {
                        what: "phase samples per beam",
                        expected: beam.amplitude.len(),
                        actual: n,
                    });
                }
            }
            let present = beam.info.detected_range_in_samples_high_resolution.is_some();
            if present != (version >= 1) {
                return Err(Error::CountMismatch {
                    what: "version-dependent beam fields",
                    expected: usize::from(version >= 1),
                    actual: usize::from(present),
                });
            }
            let mut info = beam.info.clone();
            info.num_sample_data = count_word("water column samples", beam.amplitude.len())?;
            info.write_options(writer, Endian::Little, ())?;
            write_rows(writer, &beam.amplitude)?;
            match &beam.phase {
                Phase::Off => {}
                Phase::Low(p) => write_rows(writer, p)?,
                Phase::High(p) => write_rows(writer, p)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn sample_mwc(version: u8, phase: fn(usize) -> Phase) -> Mwc {
        let beams = (0..4u16)
            .map(|b| {
                let n = usize::from(b) + 2;
                WcBeam {
                    info: WcBeamInfo {
                        beam_point_ang_re_vertical_deg: -30.0 + 20.0 * f32::from(b),
                        detected_range_in_samples: 100 + b,
                        detected_range_in_samples_high_resolution: (version >= 1)
                            .then(|| 100.25 + f32::from(b)),
                        ..Default::default()
                    },
                    amplitude: (0..n).map(|s| -(s as i8)).collect(),
                    phase: phase(n),
                }
            })
            .collect();
        Mwc {
            header: Header::new(DatagramKind::WaterColumn, version, 1_600_000_000, 0),
            tx_info: WcTxInfo {
                heave_m: 0.3,
                ..Default::default()
            },
            sectors: vec![WcSectorData {
                centre_freq_hz: 200_000.0,
                ..Default::default()
            }]
            .into(),
            rx_info: WcRxInfo {
                sample_freq_hz: 12_000.0,
                sound_velocity_m_per_sec: 1480.0,
                ..Default::default()
            },
            beams,
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_without_phase() {
        for version in 0..=MWC_MAX_VERSION {
            let mwc = sample_mwc(version, |_| Phase::Off);
            let bytes = mwc.to_bytes().unwrap();
            let back = Mwc::read(&mut Cursor::new(&bytes)).unwrap();
            assert_eq!(back.beams, mwc.beams_with_counts());
            assert_eq!(back.rx_info.num_bytes_per_beam_entry, beam_entry_size(version));
            assert_eq!(back.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn phase_arrays_follow_amplitudes() {
        let low = sample_mwc(0, |n| Phase::Low(vec![3; n]));
        let back = Mwc::read(&mut Cursor::new(low.to_bytes().unwrap())).unwrap();
        assert_eq!(back.rx_info.phase_flag, 1);
        assert_eq!(back.beams[3].phase, Phase::Low(vec![3; 5]));

        let high = sample_mwc(1, |n| Phase::High(vec![-300; n]));
        let back = Mwc::read(&mut Cursor::new(high.to_bytes().unwrap())).unwrap();
        assert_eq!(back.rx_info.phase_flag, 2);
        assert_eq!(back.beams[0].phase, Phase::High(vec![-300; 2]));
    }

    #[test]
    fn phase_length_must_match_amplitude() {
        let mwc = sample_mwc(0, |n| Phase::Low(vec![0; n + 1]));
        assert!(matches!(
            mwc.to_bytes(),
            Err(Error::CountMismatch { what: "phase samples per beam", .. })
        ));
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = sample_mwc(0, |_| Phase::Off).to_bytes().unwrap();
        bytes[8] = 3;
        assert!(matches!(
            Mwc::read(&mut Cursor::new(bytes)),
            Err(Error::UnsupportedVersion { version: 3, .. })
        ));
    }

    impl Mwc {
        fn beams_with_counts(&self) -> Vec<WcBeam> {
            self.beams
                .iter()
                .cloned()
                .map(|mut b| {
                    b.info.num_sample_data = b.amplitude.len() as u16;
                    b
                })
                .collect()
        }
    }
}
