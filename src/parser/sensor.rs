//! Sensor (S) datagrams and the `#CPO`/`#CHE` compatibility datagrams
//!
//! Sensor datagrams carry the decoded values and, for most types, the raw
//! sensor string in a fixed-width text field.
use super::header::Header;
use super::multibeam::MultibeamBody;
use super::Record;
use crate::codec::{
    count_word, ensure_room, read_declared, read_fixed, read_rows, read_text, skip_declared,
    write_declared, write_fixed, write_rows, write_text,
};
use crate::Result;
use binrw::binrw;
use std::io::{Read, Seek, Write};

/// Width of the raw sensor text in `#SPO` and `#CPO`
pub const POSITION_TEXT_WIDTH: usize = 250;
/// Width of the raw sensor text in `#SCL`
pub const CLOCK_TEXT_WIDTH: usize = 64;
/// Width of the raw sensor text in `#SDE` and `#SHI`
pub const DEPTH_TEXT_WIDTH: usize = 32;

/// Size of one `#SKM` sample, KM binary plus delayed heave
pub const SKM_SAMPLE_SIZE: u16 = 132;
/// Size of one `#SVT` sample
pub const SVT_SAMPLE_SIZE: u16 = 24;
/// Size of one `#SVP` point
pub const SVP_POINT_SIZE: usize = 20;

/// Common part of sensor datagrams (EMdgmScommon), behind `numBytesCmnPart`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorCommon {
    /// Sensor system number, see the installation parameters
    pub sensor_system: u16,
    pub sensor_status: u16,
    pub padding: u16,
}

/// Decoded position fix shared by `#SPO` and `#CPO`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionFix {
    pub time_from_sensor_sec: u32,
    pub time_from_sensor_nanosec: u32,
    pub pos_fix_quality_m: f32,
    pub corrected_lat_deg: f64,
    pub corrected_long_deg: f64,
    pub speed_over_ground_m_per_sec: f32,
    pub course_over_ground_deg: f32,
    pub ellipsoid_height_re_ref_point_m: f32,
}

impl PositionFix {
    /// Sensor time in seconds since the epoch
    pub fn sensor_time(&self) -> f64 {
        f64::from(self.time_from_sensor_sec) + f64::from(self.time_from_sensor_nanosec) / 1.0e9
    }
}

/// `#SPO` position, also the layout of `#CPO`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spo {
    pub header: Header,
    pub common: SensorCommon,
    pub fix: PositionFix,
    /// Position string as received from the sensor
    pub pos_data_from_sensor: String,
}

/// `#CPO` compatibility position; same layout as `#SPO`
pub type Cpo = Spo;

impl Record for Spo {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let common = read_declared(reader, "sensor common part")?;
        let fix = read_fixed(reader)?;
        // Writers pad the text to its full width, but only as far as the record allows
        let remaining = end.saturating_sub(reader.stream_position()?) as usize;
        let pos_data_from_sensor = read_text(reader, remaining.min(POSITION_TEXT_WIDTH))?;
        Ok(Spo {
            header,
            common,
            fix,
            pos_data_from_sensor,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_declared(writer, &self.common)?;
        write_fixed(writer, &self.fix)?;
        write_text(writer, &self.pos_data_from_sensor, POSITION_TEXT_WIDTH)
    }
}

/// Info part of `#SKM` (EMdgmSKMinfo), behind `numBytesInfoPart`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkmInfo {
    pub sensor_system: u8,
    pub sensor_status: u8,
    pub sensor_input_format: u16,
    /// Rewritten by the encoder
    pub num_samples_array: u16,
    /// Rewritten by the encoder
    pub num_bytes_per_sample: u16,
    pub sensor_data_contents: u16,
}

/// One KM binary attitude sample (`#KMB`)
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmBinary {
    pub dgm_type: [u8; 4],
    pub num_bytes_dgm: u16,
    pub dgm_version: u16,
    pub time_sec: u32,
    pub time_nanosec: u32,
    pub status: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub ellipsoid_height_m: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub heading_deg: f32,
    pub heave_m: f32,
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    pub vel_north: f32,
    pub vel_east: f32,
    pub vel_down: f32,
    pub latitude_error_m: f32,
    pub longitude_error_m: f32,
    pub ellipsoid_height_error_m: f32,
    pub roll_error_deg: f32,
    pub pitch_error_deg: f32,
    pub heading_error_deg: f32,
    pub heave_error_m: f32,
    pub north_acceleration: f32,
    pub east_acceleration: f32,
    pub down_acceleration: f32,
}

impl KmBinary {
    /// Sample time in seconds since the epoch
    pub fn time(&self) -> f64 {
        f64::from(self.time_sec) + f64::from(self.time_nanosec) / 1.0e9
    }
}

columns! {
    /// KM binary samples of one `#SKM`
    pub struct KmBinarySamples for KmBinary {
        dgm_type: [u8; 4],
        num_bytes_dgm: u16,
        dgm_version: u16,
        time_sec: u32,
        time_nanosec: u32,
        status: u32,
        latitude_deg: f64,
        longitude_deg: f64,
        ellipsoid_height_m: f32,
        roll_deg: f32,
        pitch_deg: f32,
        heading_deg: f32,
        heave_m: f32,
        roll_rate: f32,
        pitch_rate: f32,
        yaw_rate: f32,
        vel_north: f32,
        vel_east: f32,
        vel_down: f32,
        latitude_error_m: f32,
        longitude_error_m: f32,
        ellipsoid_height_error_m: f32,
        roll_error_deg: f32,
        pitch_error_deg: f32,
        heading_error_deg: f32,
        heave_error_m: f32,
        north_acceleration: f32,
        east_acceleration: f32,
        down_acceleration: f32,
    }
}

/// Delayed heave following each KM binary sample
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmDelayedHeave {
    pub time_sec: u32,
    pub time_nanosec: u32,
    pub delayed_heave_m: f32,
}

columns! {
    pub struct DelayedHeaves for KmDelayedHeave {
        time_sec: u32,
        time_nanosec: u32,
        delayed_heave_m: f32,
    }
}

/// `#SKM` attitude and attitude velocity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skm {
    pub header: Header,
    pub info: SkmInfo,
    pub samples: KmBinarySamples,
    pub delayed_heave: DelayedHeaves,
}

impl Record for Skm {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let info: SkmInfo = read_declared(reader, "SKM info")?;
        let n = usize::from(info.num_samples_array);
        ensure_room(reader, end, n, usize::from(SKM_SAMPLE_SIZE))?;
        let mut samples = KmBinarySamples::with_capacity(n);
        let mut delayed_heave = DelayedHeaves::with_capacity(n);
        for _ in 0..n {
            samples.push(read_fixed(reader)?);
            delayed_heave.push(read_fixed(reader)?);
            skip_declared(
                reader,
                "SKM sample",
                u64::from(info.num_bytes_per_sample),
                u64::from(SKM_SAMPLE_SIZE),
            )?;
        }
        Ok(Skm {
            header,
            info,
            samples,
            delayed_heave,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        if self.samples.len() != self.delayed_heave.len() {
            return Err(crate::Error::CountMismatch {
                what: "delayed heave entries per KM binary sample",
                expected: self.samples.len(),
                actual: self.delayed_heave.len(),
            });
        }
        let mut info = self.info.clone();
        info.num_samples_array = count_word("SKM samples", self.samples.len())?;
        info.num_bytes_per_sample = SKM_SAMPLE_SIZE;
        write_declared(writer, &info)?;
        for (kmb, heave) in self.samples.rows().zip(self.delayed_heave.rows()) {
            write_fixed(writer, &kmb)?;
            write_fixed(writer, &heave)?;
        }
        Ok(())
    }
}

/// Common part of `#SVP`, behind `numBytesCmnPart`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvpCommon {
    /// Rewritten by the encoder
    pub num_samples: u16,
    /// `S00` sound velocity profile, `S01` CTD profile
    pub sensor_format: [u8; 4],
    pub time_sec: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvpPoint {
    pub depth_m: f32,
    pub sound_velocity_m_per_sec: f32,
    pub padding: u32,
    pub temp_c: f32,
    pub salinity: f32,
}

columns! {
    /// Depth points of one `#SVP`
    pub struct SvpPoints for SvpPoint {
        depth_m: f32,
        sound_velocity_m_per_sec: f32,
        padding: u32,
        temp_c: f32,
        salinity: f32,
    }
}

/// `#SVP` sound velocity profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Svp {
    pub header: Header,
    pub common: SvpCommon,
    pub points: SvpPoints,
}

impl Record for Svp {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let common: SvpCommon = read_declared(reader, "SVP common part")?;
        let n = usize::from(common.num_samples);
        ensure_room(reader, end, n, SVP_POINT_SIZE)?;
        let points = read_rows::<SvpPoint, _>(reader, n)?.into();
        Ok(Svp {
            header,
            common,
            points,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let mut common = self.common.clone();
        common.num_samples = count_word("SVP points", self.points.len())?;
        write_declared(writer, &common)?;
        write_rows(writer, &self.points.rows().collect::<Vec<_>>())
    }
}

/// Info part of `#SVT`, behind `numBytesInfoPart`
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvtInfo {
    pub sensor_status: u16,
    pub sensor_input_format: u16,
    /// Rewritten by the encoder
    pub num_samples_array: u16,
    /// Rewritten by the encoder
    pub num_bytes_per_sample: u16,
    pub sensor_data_contents: u16,
    pub filter_time_sec: f32,
    pub sound_velocity_m_per_sec_offset: f32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvtSample {
    pub time_sec: u32,
    pub time_nanosec: u32,
    pub sound_velocity_m_per_sec: f32,
    pub temp_c: f32,
    pub pressure_pa: f32,
    pub salinity: f32,
}

columns! {
    pub struct SvtSamples for SvtSample {
        time_sec: u32,
        time_nanosec: u32,
        sound_velocity_m_per_sec: f32,
        temp_c: f32,
        pressure_pa: f32,
        salinity: f32,
    }
}

/// `#SVT` sound velocity at the transducer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Svt {
    pub header: Header,
    pub info: SvtInfo,
    pub samples: SvtSamples,
}

impl Record for Svt {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let info: SvtInfo = read_declared(reader, "SVT info")?;
        let n = usize::from(info.num_samples_array);
        ensure_room(reader, end, n, usize::from(SVT_SAMPLE_SIZE))?;
        let mut samples = SvtSamples::with_capacity(n);
        for _ in 0..n {
            samples.push(read_fixed(reader)?);
            skip_declared(
                reader,
                "SVT sample",
                u64::from(info.num_bytes_per_sample),
                u64::from(SVT_SAMPLE_SIZE),
            )?;
        }
        Ok(Svt {
            header,
            info,
            samples,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let mut info = self.info.clone();
        info.num_samples_array = count_word("SVT samples", self.samples.len())?;
        info.num_bytes_per_sample = SVT_SAMPLE_SIZE;
        write_declared(writer, &info)?;
        write_rows(writer, &self.samples.rows().collect::<Vec<_>>())
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockData {
    /// Offset in seconds from the installation parameters
    pub offset_sec: f32,
    /// Clock deviation from the PU, nanoseconds
    pub clock_dev_pu_nanosec: i32,
}

/// `#SCL` clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scl {
    pub header: Header,
    pub common: SensorCommon,
    pub data: ClockData,
    pub data_from_sensor: String,
}

impl Record for Scl {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, _end: u64) -> Result<Self> {
        Ok(Scl {
            header,
            common: read_declared(reader, "sensor common part")?,
            data: read_fixed(reader)?,
            data_from_sensor: read_text(reader, CLOCK_TEXT_WIDTH)?,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_declared(writer, &self.common)?;
        write_fixed(writer, &self.data)?;
        write_text(writer, &self.data_from_sensor, CLOCK_TEXT_WIDTH)
    }
}

/// Packed: the doubles follow the three floats directly
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthData {
    pub depth_used_m: f32,
    pub offset: f32,
    pub scale: f32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// `#SDE` depth
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sde {
    pub header: Header,
    pub common: SensorCommon,
    pub data: DepthData,
    pub data_from_sensor: String,
}

impl Record for Sde {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, _end: u64) -> Result<Self> {
        Ok(Sde {
            header,
            common: read_declared(reader, "sensor common part")?,
            data: read_fixed(reader)?,
            data_from_sensor: read_text(reader, DEPTH_TEXT_WIDTH)?,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_declared(writer, &self.common)?;
        write_fixed(writer, &self.data)?;
        write_text(writer, &self.data_from_sensor, DEPTH_TEXT_WIDTH)
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeightData {
    pub sensor_type: u16,
    pub padding: u16,
    pub height_used_m: f32,
}

/// `#SHI` height
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shi {
    pub header: Header,
    pub common: SensorCommon,
    pub data: HeightData,
    pub data_from_sensor: String,
}

impl Record for Shi {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, _end: u64) -> Result<Self> {
        Ok(Shi {
            header,
            common: read_declared(reader, "sensor common part")?,
            data: read_fixed(reader)?,
            data_from_sensor: read_text(reader, DEPTH_TEXT_WIDTH)?,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_declared(writer, &self.common)?;
        write_fixed(writer, &self.data)?;
        write_text(writer, &self.data_from_sensor, DEPTH_TEXT_WIDTH)
    }
}

/// `#CHE` compatibility heave, sent ahead of `#MWC` in compatibility mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Che {
    pub header: Header,
    pub body: MultibeamBody,
    /// Heave at the transducer
    pub heave_m: f32,
}

impl Record for Che {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, _end: u64) -> Result<Self> {
        Ok(Che {
            header,
            body: read_declared(reader, "CHE body")?,
            heave_m: read_fixed(reader)?,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_declared(writer, &self.body)?;
        write_fixed(writer, &self.heave_m)
    }
}
