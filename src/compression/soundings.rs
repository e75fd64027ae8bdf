//! Column-major sounding blocks
//!
//! The sounding table is written one column at a time, little endian, in
//! [`Sounding`](crate::parser::multibeam::Sounding) field order, and the
//! result is lz4 compressed. Two columns are folded when the data allows it:
//!
//! * detection type, detection method and transmit sector become one byte,
//!   `type * 100 + method * 10 + sector`, stored where the detection type
//!   column would be;
//! * the mean absorption coefficient is stored once per transmit sector when
//!   it is constant within each sector.
//!
//! Reflectivity of non-detects (detection method 0) is not kept. It is
//! replaced by the most common valid value before compression and comes back
//! as [`NON_DETECT_REFLECTIVITY_DB`].
//!
//! Columns are not delta coded: each one keeps its exact bytes and lz4 finds
//! the repetition that column-major order lines up. Apart from the non-detect
//! reflectivity a sounding block is therefore lossless, at the cost of a
//! lower ratio than quantising the floating point columns would give.
use super::{corrupt, pack, unpack};
use crate::codec::{read_fixed, read_rows, write_fixed, write_rows};
use crate::parser::multibeam::Soundings;
use crate::{Error, Result};
use binrw::{BinRead, BinWrite};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek, Write};
use tracing::trace;

/// Reflectivity given to non-detects on decompression
pub const NON_DETECT_REFLECTIVITY_DB: f32 = -999.0;

const PACKED_DETECTION: u8 = 0b01;
const MEAN_ABS_COEFF_PER_SECTOR: u8 = 0b10;

/// Smallest number of raw bytes a sounding can occupy in a block
const MIN_PACKED_SOUNDING: u64 = 112;

fn is_non_detect(method: u8) -> bool {
    method == 0
}

/// Most common value, the smaller one on ties
fn mode(values: impl Iterator<Item = f32>) -> f32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(bits, n)| (f32::from_bits(bits), n))
        .max_by(|(a, na), (b, nb)| na.cmp(nb).then_with(|| b.total_cmp(a)))
        .map(|(v, _)| v)
        .unwrap_or(0.0)
}

/// Reflectivity column with non-detects replaced by the mode of the rest
fn substitute_non_detects(values: &[f32], methods: &[u8]) -> Vec<f32> {
    let valid = values
        .iter()
        .zip(methods)
        .filter(|(_, m)| !is_non_detect(**m))
        .map(|(&v, _)| v);
    let fill = mode(valid);
    values
        .iter()
        .zip(methods)
        .map(|(&v, &m)| if is_non_detect(m) { fill } else { v })
        .collect()
}

fn packed_detection(s: &Soundings) -> Option<Vec<u8>> {
    s.detection_type
        .iter()
        .zip(&s.detection_method)
        .zip(&s.tx_sector_numb)
        .map(|((&t, &m), &sector)| {
            if m > 9 || sector > 9 {
                return None;
            }
            u8::try_from(u32::from(t) * 100 + u32::from(m) * 10 + u32::from(sector)).ok()
        })
        .collect()
}

fn mean_abs_coeff_by_sector(s: &Soundings) -> Option<BTreeMap<u8, f32>> {
    let mut by_sector = BTreeMap::new();
    for (&sector, &coeff) in s.tx_sector_numb.iter().zip(&s.mean_abs_coeff_db_per_km) {
        match by_sector.insert(sector, coeff) {
            Some(prev) if prev.to_bits() != coeff.to_bits() => return None,
            _ => {}
        }
    }
    Some(by_sector)
}

fn put<T, W>(writer: &mut W, column: &[T]) -> Result<()>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
    W: Write + Seek,
{
    write_rows(writer, column)
}

fn take<T, R>(reader: &mut R, n: usize) -> Result<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    read_rows(reader, n)
}

/// Lay out the sounding table by column, before lz4
pub fn to_columns(s: &Soundings) -> Result<Vec<u8>> {
    let n = s.len();
    let count = u32::try_from(n).map_err(|_| Error::CountMismatch {
        what: "soundings in a compressed block",
        expected: u32::MAX as usize,
        actual: n,
    })?;
    let packed = packed_detection(s);
    let per_sector = mean_abs_coeff_by_sector(s);
    let mut flags = 0;
    if packed.is_some() {
        flags |= PACKED_DETECTION;
    }
    if per_sector.is_some() {
        flags |= MEAN_ABS_COEFF_PER_SECTOR;
    }

    let mut w = Cursor::new(Vec::with_capacity(n * 120 + 5));
    write_fixed(&mut w, &count)?;
    write_fixed(&mut w, &flags)?;
    put(&mut w, &s.sounding_index)?;
    match &packed {
        Some(bytes) => put(&mut w, bytes)?,
        None => {
            put(&mut w, &s.tx_sector_numb)?;
            put(&mut w, &s.detection_type)?;
            put(&mut w, &s.detection_method)?;
        }
    }
    put(&mut w, &s.rejection_info1)?;
    put(&mut w, &s.rejection_info2)?;
    put(&mut w, &s.post_processing_info)?;
    put(&mut w, &s.detection_class)?;
    put(&mut w, &s.detection_confidence_level)?;
    put(&mut w, &s.padding)?;
    put(&mut w, &s.range_factor)?;
    put(&mut w, &s.quality_factor)?;
    put(&mut w, &s.detection_uncertainty_ver_m)?;
    put(&mut w, &s.detection_uncertainty_hor_m)?;
    put(&mut w, &s.detection_window_length_sec)?;
    put(&mut w, &s.echo_length_sec)?;
    put(&mut w, &s.wc_beam_numb)?;
    put(&mut w, &s.wc_range_samples)?;
    put(&mut w, &s.wc_nom_beam_angle_across_deg)?;
    match &per_sector {
        Some(by_sector) => {
            let k = u8::try_from(by_sector.len())
                .map_err(|_| corrupt("more than 255 transmit sectors"))?;
            write_fixed(&mut w, &k)?;
            for (sector, coeff) in by_sector {
                write_fixed(&mut w, sector)?;
                write_fixed(&mut w, coeff)?;
            }
        }
        None => put(&mut w, &s.mean_abs_coeff_db_per_km)?,
    }
    put(
        &mut w,
        &substitute_non_detects(&s.reflectivity1_db, &s.detection_method),
    )?;
    put(
        &mut w,
        &substitute_non_detects(&s.reflectivity2_db, &s.detection_method),
    )?;
    put(&mut w, &s.receiver_sensitivity_applied_db)?;
    put(&mut w, &s.source_level_applied_db)?;
    put(&mut w, &s.bs_calibration_db)?;
    put(&mut w, &s.tvg_db)?;
    put(&mut w, &s.beam_angle_re_rx_deg)?;
    put(&mut w, &s.beam_angle_correction_deg)?;
    put(&mut w, &s.two_way_travel_time_sec)?;
    put(&mut w, &s.two_way_travel_time_correction_sec)?;
    put(&mut w, &s.delta_latitude_deg)?;
    put(&mut w, &s.delta_longitude_deg)?;
    put(&mut w, &s.z_re_ref_point_m)?;
    put(&mut w, &s.y_re_ref_point_m)?;
    put(&mut w, &s.x_re_ref_point_m)?;
    put(&mut w, &s.beam_inc_angle_adj_deg)?;
    put(&mut w, &s.real_time_clean_info)?;
    put(&mut w, &s.si_start_range_samples)?;
    put(&mut w, &s.si_centre_sample)?;
    put(&mut w, &s.si_num_samples)?;
    trace!(n, flags, "sounding columns laid out");
    Ok(w.into_inner())
}

fn read_columns(raw: &[u8]) -> Result<Soundings> {
    let mut r = Cursor::new(raw);
    let n = read_fixed::<u32, _>(&mut r)? as usize;
    let flags: u8 = read_fixed(&mut r)?;
    if flags & !(PACKED_DETECTION | MEAN_ABS_COEFF_PER_SECTOR) != 0 {
        return Err(corrupt(format!("unknown sounding block flags {flags:#04x}")));
    }
    if (n as u64).saturating_mul(MIN_PACKED_SOUNDING) > raw.len() as u64 {
        return Err(corrupt(format!(
            "{n} soundings cannot fit in {} bytes",
            raw.len()
        )));
    }

    let sounding_index = take(&mut r, n)?;
    let (tx_sector_numb, detection_type, detection_method) = if flags & PACKED_DETECTION != 0 {
        let packed: Vec<u8> = take(&mut r, n)?;
        (
            packed.iter().map(|p| p % 10).collect(),
            packed.iter().map(|p| p / 100).collect(),
            packed.iter().map(|p| (p / 10) % 10).collect::<Vec<u8>>(),
        )
    } else {
        (take(&mut r, n)?, take(&mut r, n)?, take(&mut r, n)?)
    };
    let rejection_info1 = take(&mut r, n)?;
    let rejection_info2 = take(&mut r, n)?;
    let post_processing_info = take(&mut r, n)?;
    let detection_class = take(&mut r, n)?;
    let detection_confidence_level = take(&mut r, n)?;
    let padding = take(&mut r, n)?;
    let range_factor = take(&mut r, n)?;
    let quality_factor = take(&mut r, n)?;
    let detection_uncertainty_ver_m = take(&mut r, n)?;
    let detection_uncertainty_hor_m = take(&mut r, n)?;
    let detection_window_length_sec = take(&mut r, n)?;
    let echo_length_sec = take(&mut r, n)?;
    let wc_beam_numb = take(&mut r, n)?;
    let wc_range_samples = take(&mut r, n)?;
    let wc_nom_beam_angle_across_deg = take(&mut r, n)?;
    let mean_abs_coeff_db_per_km = if flags & MEAN_ABS_COEFF_PER_SECTOR != 0 {
        let k: u8 = read_fixed(&mut r)?;
        let mut by_sector = BTreeMap::new();
        for _ in 0..k {
            let sector: u8 = read_fixed(&mut r)?;
            let coeff: f32 = read_fixed(&mut r)?;
            by_sector.insert(sector, coeff);
        }
        tx_sector_numb
            .iter()
            .map(|sector| {
                by_sector.get(sector).copied().ok_or_else(|| {
                    corrupt(format!("no absorption coefficient for sector {sector}"))
                })
            })
            .collect::<Result<Vec<f32>>>()?
    } else {
        take(&mut r, n)?
    };
    let restore = |values: Vec<f32>| -> Vec<f32> {
        values
            .into_iter()
            .zip(&detection_method)
            .map(|(v, &m)| if is_non_detect(m) { NON_DETECT_REFLECTIVITY_DB } else { v })
            .collect()
    };
    let reflectivity1_db = restore(take(&mut r, n)?);
    let reflectivity2_db = restore(take(&mut r, n)?);

    let soundings = Soundings {
        sounding_index,
        tx_sector_numb,
        detection_type,
        detection_method,
        rejection_info1,
        rejection_info2,
        post_processing_info,
        detection_class,
        detection_confidence_level,
        padding,
        range_factor,
        quality_factor,
        detection_uncertainty_ver_m,
        detection_uncertainty_hor_m,
        detection_window_length_sec,
        echo_length_sec,
        wc_beam_numb,
        wc_range_samples,
        wc_nom_beam_angle_across_deg,
        mean_abs_coeff_db_per_km,
        reflectivity1_db,
        reflectivity2_db,
        receiver_sensitivity_applied_db: take(&mut r, n)?,
        source_level_applied_db: take(&mut r, n)?,
        bs_calibration_db: take(&mut r, n)?,
        tvg_db: take(&mut r, n)?,
        beam_angle_re_rx_deg: take(&mut r, n)?,
        beam_angle_correction_deg: take(&mut r, n)?,
        two_way_travel_time_sec: take(&mut r, n)?,
        two_way_travel_time_correction_sec: take(&mut r, n)?,
        delta_latitude_deg: take(&mut r, n)?,
        delta_longitude_deg: take(&mut r, n)?,
        z_re_ref_point_m: take(&mut r, n)?,
        y_re_ref_point_m: take(&mut r, n)?,
        x_re_ref_point_m: take(&mut r, n)?,
        beam_inc_angle_adj_deg: take(&mut r, n)?,
        real_time_clean_info: take(&mut r, n)?,
        si_start_range_samples: take(&mut r, n)?,
        si_centre_sample: take(&mut r, n)?,
        si_num_samples: take(&mut r, n)?,
    };
    let used = r.position();
    if used != raw.len() as u64 {
        return Err(corrupt(format!(
            "sounding block has {} trailing bytes",
            raw.len() as u64 - used
        )));
    }
    Ok(soundings)
}

/// Rebuild a sounding table from its column layout
///
/// Non-detect reflectivity comes back as [`NON_DETECT_REFLECTIVITY_DB`].
pub fn from_columns(raw: &[u8]) -> Result<Soundings> {
    read_columns(raw).map_err(|e| match e {
        Error::TruncatedRead => corrupt("sounding block ends inside a column"),
        other => other,
    })
}

/// Compress a sounding table into an lz4 block
pub fn compress_soundings(s: &Soundings) -> Result<Vec<u8>> {
    Ok(pack(&to_columns(s)?))
}

/// Undo [`compress_soundings`]
pub fn decompress_soundings(block: &[u8]) -> Result<Soundings> {
    from_columns(&unpack(block)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::multibeam::test::sample_mrz;

    #[test]
    fn columns_restore_everything_but_non_detect_reflectivity() {
        let original = sample_mrz(1).soundings;
        let back = decompress_soundings(&compress_soundings(&original).unwrap()).unwrap();
        assert_eq!(back.len(), original.len());

        // sounding 2 is the only non-detect
        assert_eq!(back.detection_method[2], 0);
        assert_eq!(back.reflectivity1_db[2], NON_DETECT_REFLECTIVITY_DB);
        assert_eq!(back.reflectivity2_db[2], NON_DETECT_REFLECTIVITY_DB);
        assert_ne!(original.reflectivity1_db[2], NON_DETECT_REFLECTIVITY_DB);

        let mut expected = original.clone();
        expected.reflectivity1_db[2] = NON_DETECT_REFLECTIVITY_DB;
        expected.reflectivity2_db[2] = NON_DETECT_REFLECTIVITY_DB;
        assert_eq!(back, expected);
    }

    #[test]
    fn floating_columns_keep_their_bits() {
        let mut original = sample_mrz(1).soundings;
        original.z_re_ref_point_m = vec![1.0e-7, 12_345.678, -0.0, f32::MAX, 3.0e-41];
        original.two_way_travel_time_sec[4] = 0.123_456_79;
        let back = decompress_soundings(&compress_soundings(&original).unwrap()).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back.z_re_ref_point_m), bits(&original.z_re_ref_point_m));
        assert_eq!(
            bits(&back.two_way_travel_time_sec),
            bits(&original.two_way_travel_time_sec)
        );
    }

    #[test]
    fn folded_columns_are_used_when_possible() {
        let s = sample_mrz(0).soundings;
        let raw = to_columns(&s).unwrap();
        assert_eq!(raw[4], PACKED_DETECTION | MEAN_ABS_COEFF_PER_SECTOR);
        // packing saves 2 bytes per sounding, the per-sector table 4 bytes
        // per sounding at the cost of a count and 5 bytes per sector
        let unfolded = 5 + s.len() * 120;
        assert_eq!(raw.len(), unfolded - s.len() * 2 - s.len() * 4 + 1 + 2 * 5);
    }

    #[test]
    fn unfoldable_columns_are_stored_whole() {
        let mut s = sample_mrz(0).soundings;
        s.tx_sector_numb[0] = 12;
        s.mean_abs_coeff_db_per_km[1] = 99.0;
        let raw = to_columns(&s).unwrap();
        assert_eq!(raw[4], 0);
        assert_eq!(raw.len(), 5 + s.len() * 120);
        let back = from_columns(&raw).unwrap();
        assert_eq!(back.tx_sector_numb, s.tx_sector_numb);
        assert_eq!(back.mean_abs_coeff_db_per_km, s.mean_abs_coeff_db_per_km);
    }

    #[test]
    fn mode_prefers_frequent_then_smaller() {
        assert_eq!(mode([3.0, 1.0, 3.0, 1.0, 2.0].into_iter()), 1.0);
        assert_eq!(mode([5.0, 5.0, -1.0].into_iter()), 5.0);
        assert_eq!(mode(std::iter::empty()), 0.0);
        let filled = substitute_non_detects(&[1.0, 7.0, 2.0, 2.0], &[1, 0, 1, 1]);
        assert_eq!(filled, vec![1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn damaged_blocks_are_corruption() {
        let raw = to_columns(&sample_mrz(0).soundings).unwrap();
        let mut short = raw.clone();
        short.pop();
        assert!(matches!(from_columns(&short), Err(Error::CompressionCorruption(_))));
        let mut long = raw.clone();
        long.push(0);
        assert!(matches!(from_columns(&long), Err(Error::CompressionCorruption(_))));
        let mut huge = raw.clone();
        huge[..4].copy_from_slice(&1_000_000u32.to_le_bytes());
        assert!(matches!(from_columns(&huge), Err(Error::CompressionCorruption(_))));
        assert!(matches!(
            decompress_soundings(&[0xff; 12]),
            Err(Error::CompressionCorruption(_))
        ));
    }
}
