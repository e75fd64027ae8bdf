//! Multibeam (M) datagrams: `#MRZ` range and depth, and the pieces it shares
//! with `#MWC` and `#CHE`
use super::header::{DatagramKind, Header};
use super::Record;
use crate::codec::{
    count_word, ensure_room, read_declared, read_fixed, read_rows, write_declared, write_fixed,
    write_rows,
};
use crate::{Error, Result};
use binrw::{binrw, BinRead, BinWrite, Endian};
use std::io::{Read, Seek, Write};
use tracing::warn;

/// Highest `#MRZ` version with a known sector and sounding layout
pub const MRZ_MAX_VERSION: u8 = 3;

/// Size of one sounding entry
pub const SOUNDING_SIZE: u16 = 120;

/// Size of one extra detection class entry
pub const EXTRA_DET_CLASS_SIZE: u16 = 4;

/// Size of one transmit sector entry for an `#MRZ` version
pub fn sector_info_size(version: u8) -> u16 {
    if version >= 1 {
        48
    } else {
        36
    }
}

/// Datagram partitioning, always 1 of 1 once stored in a file
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub num_of_dgms: u16,
    pub dgm_num: u16,
}

impl Default for Partition {
    fn default() -> Self {
        Partition {
            num_of_dgms: 1,
            dgm_num: 1,
        }
    }
}

/// Common body of all multibeam datagrams (EMdgmMbody)
///
/// Stored behind a `numBytesCmnPart` size word.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultibeamBody {
    /// Ping counter, shared by every fan and swath of one ping
    pub ping_cnt: u16,
    pub rx_fans_per_ping: u8,
    pub rx_fan_index: u8,
    pub swaths_per_ping: u8,
    pub swath_along_position: u8,
    pub tx_transducer_ind: u8,
    pub rx_transducer_ind: u8,
    pub num_rx_transducers: u8,
    pub algorithm_type: u8,
}

/// Ping information (EMdgmMRZ_pingInfo), stored behind `numBytesInfoData`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingInfo {
    pub padding0: u16,
    pub ping_rate_hz: f32,
    pub beam_spacing: u8,
    pub depth_mode: u8,
    pub sub_depth_mode: u8,
    pub distance_btw_swath: u8,
    pub detection_mode: u8,
    pub pulse_form: u8,
    /// Documented as a ping rate but always zero in practice; carried as is
    pub padding1: u16,
    pub frequency_mode_hz: f32,
    pub freq_range_low_lim_hz: f32,
    pub freq_range_high_lim_hz: f32,
    pub max_total_tx_pulse_length_sec: f32,
    pub max_eff_tx_pulse_length_sec: f32,
    pub max_eff_tx_band_width_hz: f32,
    pub abs_coeff_db_per_km: f32,
    pub port_sector_edge_deg: f32,
    pub starb_sector_edge_deg: f32,
    pub port_mean_cov_deg: f32,
    pub stbd_mean_cov_deg: f32,
    pub port_mean_cov_m: i16,
    pub starb_mean_cov_m: i16,
    pub mode_and_stabilisation: u8,
    pub runtime_filter1: u8,
    pub runtime_filter2: u16,
    pub pipe_tracking_status: u32,
    pub transmit_array_size_used_deg: f32,
    pub receive_array_size_used_deg: f32,
    pub transmit_power_db: f32,
    pub sl_ramp_up_time_remaining: u16,
    pub padding2: u16,
    pub yaw_angle_deg: f32,
    /// Rewritten by the encoder from the sector list
    pub num_tx_sectors: u16,
    /// Rewritten by the encoder from the datagram version
    pub num_bytes_per_tx_sector: u16,
    pub heading_vessel_deg: f32,
    pub sound_speed_at_tx_depth_m_per_sec: f32,
    pub tx_transducer_depth_m: f32,
    pub z_water_level_re_ref_point_m: f32,
    pub x_kmall_to_all_m: f32,
    pub y_kmall_to_all_m: f32,
    pub lat_long_info: u8,
    pub pos_sensor_status: u8,
    pub attitude_sensor_status: u8,
    pub padding3: u8,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub ellipsoid_height_re_ref_point_m: f32,
}

/// One transmit sector (EMdgmMRZ_txSectorInfo)
///
/// No size field; the layout is fixed by the datagram version. The last three
/// fields exist from version 1.
#[binrw]
#[brw(little)]
#[br(import(version: u8))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxSectorInfo {
    pub tx_sector_numb: u8,
    pub tx_arr_number: u8,
    pub tx_sub_array: u8,
    pub padding0: u8,
    pub sector_transmit_delay_sec: f32,
    pub tilt_angle_re_tx_deg: f32,
    pub tx_nominal_source_level_db: f32,
    pub tx_focus_range_m: f32,
    pub centre_freq_hz: f32,
    pub signal_band_width_hz: f32,
    pub total_signal_length_sec: f32,
    pub pulse_shading: u8,
    pub signal_wave_form: u8,
    pub padding1: u16,
    #[br(if(version >= 1))]
    pub high_voltage_level_db: Option<f32>,
    #[br(if(version >= 1))]
    pub sector_tracking_corr_db: Option<f32>,
    #[br(if(version >= 1))]
    pub effective_signal_length_sec: Option<f32>,
}

columns! {
    /// Transmit sectors of one `#MRZ`, one column per field
    pub struct TxSectors for TxSectorInfo {
        tx_sector_numb: u8,
        tx_arr_number: u8,
        tx_sub_array: u8,
        padding0: u8,
        sector_transmit_delay_sec: f32,
        tilt_angle_re_tx_deg: f32,
        tx_nominal_source_level_db: f32,
        tx_focus_range_m: f32,
        centre_freq_hz: f32,
        signal_band_width_hz: f32,
        total_signal_length_sec: f32,
        pulse_shading: u8,
        signal_wave_form: u8,
        padding1: u16,
        high_voltage_level_db: Option<f32>,
        sector_tracking_corr_db: Option<f32>,
        effective_signal_length_sec: Option<f32>,
    }
}

/// Receiver information (EMdgmMRZ_rxInfo), stored behind `numBytesRxInfo`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RxInfo {
    pub num_soundings_max_main: u16,
    pub num_soundings_valid_main: u16,
    pub num_bytes_per_sounding: u16,
    pub wc_sample_rate: f32,
    pub seabed_image_sample_rate: f32,
    pub bs_normal_db: f32,
    pub bs_oblique_db: f32,
    pub extra_detection_alarm_flag: u16,
    pub num_extra_detections: u16,
    pub num_extra_detection_classes: u16,
    pub num_bytes_per_class: u16,
}

impl RxInfo {
    /// Soundings in the datagram, main plus extra detections
    pub fn num_soundings(&self) -> usize {
        usize::from(self.num_soundings_max_main) + usize::from(self.num_extra_detections)
    }
}

/// Extra detection class (EMdgmMRZ_extraDetClassInfo)
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraDetClassInfo {
    pub num_extra_det_in_class: u16,
    pub padding: i8,
    pub alarm_flag: u8,
}

columns! {
    /// Extra detection classes of one `#MRZ`
    pub struct ExtraDetClasses for ExtraDetClassInfo {
        num_extra_det_in_class: u16,
        padding: i8,
        alarm_flag: u8,
    }
}

/// One bottom detection (EMdgmMRZ_sounding)
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sounding {
    pub sounding_index: u16,
    pub tx_sector_numb: u8,
    /// 0 normal, 1 extra, 2 rejected
    pub detection_type: u8,
    /// 0 no valid detection, 1 amplitude, 2 phase
    pub detection_method: u8,
    pub rejection_info1: u8,
    pub rejection_info2: u8,
    pub post_processing_info: u8,
    pub detection_class: u8,
    pub detection_confidence_level: u8,
    pub padding: u16,
    pub range_factor: f32,
    pub quality_factor: f32,
    pub detection_uncertainty_ver_m: f32,
    pub detection_uncertainty_hor_m: f32,
    pub detection_window_length_sec: f32,
    pub echo_length_sec: f32,
    pub wc_beam_numb: u16,
    pub wc_range_samples: u16,
    pub wc_nom_beam_angle_across_deg: f32,
    pub mean_abs_coeff_db_per_km: f32,
    pub reflectivity1_db: f32,
    pub reflectivity2_db: f32,
    pub receiver_sensitivity_applied_db: f32,
    pub source_level_applied_db: f32,
    pub bs_calibration_db: f32,
    pub tvg_db: f32,
    pub beam_angle_re_rx_deg: f32,
    pub beam_angle_correction_deg: f32,
    pub two_way_travel_time_sec: f32,
    pub two_way_travel_time_correction_sec: f32,
    pub delta_latitude_deg: f32,
    pub delta_longitude_deg: f32,
    pub z_re_ref_point_m: f32,
    pub y_re_ref_point_m: f32,
    pub x_re_ref_point_m: f32,
    pub beam_inc_angle_adj_deg: f32,
    pub real_time_clean_info: u16,
    pub si_start_range_samples: u16,
    pub si_centre_sample: u16,
    /// Seabed image samples belonging to this sounding
    pub si_num_samples: u16,
}

columns! {
    /// The sounding table of one `#MRZ`
    pub struct Soundings for Sounding {
        sounding_index: u16,
        tx_sector_numb: u8,
        detection_type: u8,
        detection_method: u8,
        rejection_info1: u8,
        rejection_info2: u8,
        post_processing_info: u8,
        detection_class: u8,
        detection_confidence_level: u8,
        padding: u16,
        range_factor: f32,
        quality_factor: f32,
        detection_uncertainty_ver_m: f32,
        detection_uncertainty_hor_m: f32,
        detection_window_length_sec: f32,
        echo_length_sec: f32,
        wc_beam_numb: u16,
        wc_range_samples: u16,
        wc_nom_beam_angle_across_deg: f32,
        mean_abs_coeff_db_per_km: f32,
        reflectivity1_db: f32,
        reflectivity2_db: f32,
        receiver_sensitivity_applied_db: f32,
        source_level_applied_db: f32,
        bs_calibration_db: f32,
        tvg_db: f32,
        beam_angle_re_rx_deg: f32,
        beam_angle_correction_deg: f32,
        two_way_travel_time_sec: f32,
        two_way_travel_time_correction_sec: f32,
        delta_latitude_deg: f32,
        delta_longitude_deg: f32,
        z_re_ref_point_m: f32,
        y_re_ref_point_m: f32,
        x_re_ref_point_m: f32,
        beam_inc_angle_adj_deg: f32,
        real_time_clean_info: u16,
        si_start_range_samples: u16,
        si_centre_sample: u16,
        si_num_samples: u16,
    }
}

impl Soundings {
    /// Number of seabed image samples the table announces
    pub fn total_image_samples(&self) -> usize {
        self.si_num_samples.iter().map(|&n| usize::from(n)).sum()
    }
}

/// `#MRZ`: multibeam range and depth for one receiver fan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mrz {
    pub header: Header,
    pub partition: Partition,
    pub body: MultibeamBody,
    pub ping_info: PingInfo,
    pub sectors: TxSectors,
    pub rx_info: RxInfo,
    pub extra_det_classes: ExtraDetClasses,
    pub soundings: Soundings,
    /// Seabed image samples in 0.1 dB, `Σ si_num_samples` of them
    pub seabed_image: Vec<i16>,
}

/// The part of an `#MRZ` belonging to one transmit sector
#[derive(Debug, Clone, PartialEq)]
pub struct SectorPing {
    /// Header time plus the sector transmit delay
    pub time: f64,
    pub sector: TxSectorInfo,
    pub soundings: Soundings,
}

/// Fail unless `version` has a known sector and sounding layout
pub(crate) fn check_mrz_version(version: u8) -> Result<()> {
    if version > MRZ_MAX_VERSION {
        return Err(Error::UnsupportedVersion {
            kind: DatagramKind::RangeAndDepth.name(),
            version,
        });
    }
    Ok(())
}

/// The multibeam prefix shared by `#MRZ` and its compressed forms
///
/// Everything up to and including the extra detection classes.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MrzPrefix {
    pub partition: Partition,
    pub body: MultibeamBody,
    pub ping_info: PingInfo,
    pub sectors: TxSectors,
    pub rx_info: RxInfo,
    pub extra_det_classes: ExtraDetClasses,
}

impl MrzPrefix {
    pub(crate) fn read<R: Read + Seek>(reader: &mut R, version: u8, end: u64) -> Result<Self> {
        check_mrz_version(version)?;
        let partition = read_fixed(reader)?;
        let body = read_declared(reader, "MRZ body")?;
        let ping_info: PingInfo = read_declared(reader, "MRZ ping info")?;

        let sector_size = sector_info_size(version);
        if ping_info.num_bytes_per_tx_sector != sector_size {
            warn!(
                version,
                declared = ping_info.num_bytes_per_tx_sector,
                used = sector_size,
                "sector info size disagrees with datagram version"
            );
        }
        let num_sectors = usize::from(ping_info.num_tx_sectors);
        ensure_room(reader, end, num_sectors, usize::from(sector_size))?;
        let mut sectors = TxSectors::with_capacity(num_sectors);
        for _ in 0..num_sectors {
            sectors.push(TxSectorInfo::read_options(
                reader,
                Endian::Little,
                (version,),
            )?);
        }

        let rx_info: RxInfo = read_declared(reader, "MRZ rx info")?;
        if rx_info.num_bytes_per_sounding != SOUNDING_SIZE {
            warn!(
                declared = rx_info.num_bytes_per_sounding,
                used = SOUNDING_SIZE,
                "sounding size disagrees with datagram version"
            );
        }
        let num_classes = usize::from(rx_info.num_extra_detection_classes);
        ensure_room(reader, end, num_classes, usize::from(EXTRA_DET_CLASS_SIZE))?;
        let extra_det_classes = read_rows::<ExtraDetClassInfo, _>(reader, num_classes)?.into();

        Ok(MrzPrefix {
            partition,
            body,
            ping_info,
            sectors,
            rx_info,
            extra_det_classes,
        })
    }

    /// Write the prefix, recomputing the counts it can derive itself
    ///
    /// `num_soundings` is checked against the sounding counts in `rx_info`.
    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        version: u8,
        num_soundings: usize,
    ) -> Result<()> {
        check_mrz_version(version)?;
        for sector in self.sectors.rows() {
            let fields = [
                sector.high_voltage_level_db,
                sector.sector_tracking_corr_db,
                sector.effective_signal_length_sec,
            ];
            let present = fields.iter().filter(|f| f.is_some()).count();
            let expected = if version >= 1 { 3 } else { 0 };
            if present != expected {
                return Err(Error::CountMismatch {
                    what: "version-dependent sector info fields",
                    expected,
                    actual: present,
                });
            }
        }

        let mut ping_info = self.ping_info.clone();
        ping_info.num_tx_sectors = count_word("transmit sectors", self.sectors.len())?;
        ping_info.num_bytes_per_tx_sector = sector_info_size(version);

        let mut rx_info = self.rx_info.clone();
        rx_info.num_bytes_per_sounding = SOUNDING_SIZE;
        rx_info.num_extra_detection_classes =
            count_word("extra detection classes", self.extra_det_classes.len())?;
        rx_info.num_bytes_per_class = EXTRA_DET_CLASS_SIZE;
        if rx_info.num_soundings() != num_soundings {
            return Err(Error::CountMismatch {
                what: "soundings (numSoundingsMaxMain + numExtraDetections)",
                expected: rx_info.num_soundings(),
                actual: num_soundings,
            });
        }

        write_fixed(writer, &self.partition)?;
        write_declared(writer, &self.body)?;
        write_declared(writer, &ping_info)?;
        for sector in self.sectors.rows() {
            sector.write_options(writer, Endian::Little, ())?;
        }
        write_declared(writer, &rx_info)?;
        write_rows(writer, &self.extra_det_classes.rows().collect::<Vec<_>>())?;
        Ok(())
    }
}

/// Read `rx_info.num_soundings()` soundings
pub(crate) fn read_soundings<R: Read + Seek>(
    reader: &mut R,
    rx_info: &RxInfo,
    end: u64,
) -> Result<Soundings> {
    let count = rx_info.num_soundings();
    ensure_room(reader, end, count, usize::from(SOUNDING_SIZE))?;
    Ok(read_rows::<Sounding, _>(reader, count)?.into())
}

/// Read the seabed image samples announced by `soundings`
pub(crate) fn read_seabed_image<R: Read + Seek>(
    reader: &mut R,
    soundings: &Soundings,
    end: u64,
) -> Result<Vec<i16>> {
    let count = soundings.total_image_samples();
    ensure_room(reader, end, count, 2)?;
    read_rows(reader, count)
}

impl Mrz {
    pub(crate) fn prefix(&self) -> MrzPrefix {
        MrzPrefix {
            partition: self.partition,
            body: self.body.clone(),
            ping_info: self.ping_info.clone(),
            sectors: self.sectors.clone(),
            rx_info: self.rx_info.clone(),
            extra_det_classes: self.extra_det_classes.clone(),
        }
    }

    pub(crate) fn from_parts(
        header: Header,
        prefix: MrzPrefix,
        soundings: Soundings,
        seabed_image: Vec<i16>,
    ) -> Mrz {
        Mrz {
            header,
            partition: prefix.partition,
            body: prefix.body,
            ping_info: prefix.ping_info,
            sectors: prefix.sectors,
            rx_info: prefix.rx_info,
            extra_det_classes: prefix.extra_det_classes,
            soundings,
            seabed_image,
        }
    }

    /// Split the record by transmit sector
    ///
    /// Each part holds the sector's info, the soundings fired by that sector
    /// and the header time shifted by the sector's transmit delay.
    pub fn split_by_sector(&self) -> Vec<SectorPing> {
        let t0 = self.header.timestamp();
        self.sectors
            .rows()
            .map(|sector| {
                let numb = sector.tx_sector_numb;
                SectorPing {
                    time: t0 + f64::from(sector.sector_transmit_delay_sec),
                    soundings: self.soundings.filter(|s| s.tx_sector_numb == numb),
                    sector,
                }
            })
            .collect()
    }
}

impl Record for Mrz {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let prefix = MrzPrefix::read(reader, header.dgm_version, end)?;
        let soundings = read_soundings(reader, &prefix.rx_info, end)?;
        let seabed_image = read_seabed_image(reader, &soundings, end)?;
        Ok(Mrz::from_parts(header, prefix, soundings, seabed_image))
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let expected = self.soundings.total_image_samples();
        if self.seabed_image.len() != expected {
            return Err(Error::CountMismatch {
                what: "seabed image samples (Σ SInumSamples)",
                expected,
                actual: self.seabed_image.len(),
            });
        }
        self.prefix()
            .write(writer, self.header.dgm_version, self.soundings.len())?;
        write_rows(writer, &self.soundings.rows().collect::<Vec<_>>())?;
        write_rows(writer, &self.seabed_image)?;
        Ok(())
    }
}
