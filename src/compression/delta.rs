//! Adaptive delta codec for numeric arrays
//!
//! An array is quantised to 8, 16 or 32 bit unsigned integers between its
//! minimum and maximum. Either the values themselves or their first
//! differences are stored, whichever spans the smaller range. Layout:
//!
//! | field   | type  | notes                                          |
//! |---------|-------|------------------------------------------------|
//! | first   | `f32` | first input value                              |
//! | min     | `f32` | minimum of the stored series                   |
//! | max     | `f32` | maximum of the stored series                   |
//! | count   | `i32` | stored values; negative marks differences      |
//! | width   | `u8`  | bytes per packed integer: 1, 2 or 4            |
//! | packed  | ...   | `count.abs()` little-endian unsigned integers  |
use crate::codec::{read_fixed, write_fixed};
use crate::{Error, Result};
use binrw::binrw;
use std::io::Cursor;

/// Size of the fixed head in front of the packed integers
pub const HEAD_SIZE: usize = 17;

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Head {
    first: f32,
    min: f32,
    max: f32,
    count: i32,
    width: u8,
}

/// Integer width chosen for a range and target resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

impl Width {
    /// Narrowest width whose step is finer than `resolution`
    pub fn choose(range: f64, resolution: f64) -> Width {
        if range / 255.0 < resolution {
            Width::U8
        } else if range / 65535.0 < resolution {
            Width::U16
        } else {
            Width::U32
        }
    }

    /// Number of quantisation steps
    pub fn levels(self) -> f64 {
        match self {
            Width::U8 => f64::from(u8::MAX),
            Width::U16 => f64::from(u16::MAX),
            Width::U32 => f64::from(u32::MAX),
        }
    }

    /// Bytes per packed integer, as stored in the width selector
    pub fn bytes(self) -> u8 {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }

    fn from_selector(selector: u8) -> Result<Width> {
        match selector {
            1 => Ok(Width::U8),
            2 => Ok(Width::U16),
            4 => Ok(Width::U32),
            other => Err(Error::CompressionCorruption(format!(
                "delta width selector {other} is not 1, 2 or 4"
            ))),
        }
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Encode `values` so that each decoded value is within `resolution`
///
/// Values are `f32` because the head and the arrays this codec serves are
/// `f32` on the wire; quantisation itself runs in `f64`. The first value is
/// stored exactly in both modes.
///
/// In difference mode the per-step errors add up along the array.
pub fn encode_array(values: &[f32], resolution: f32) -> Result<Vec<u8>> {
    if !(resolution > 0.0 && resolution.is_finite()) {
        return Err(Error::Parse(format!(
            "delta resolution must be positive, got {resolution}"
        )));
    }
    let raw: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    let diffs: Vec<f64> = raw.windows(2).map(|w| w[1] - w[0]).collect();

    let (raw_lo, raw_hi) = bounds(&raw);
    let (diff_lo, diff_hi) = bounds(&diffs);
    let differential = raw.len() > 1 && diff_hi - diff_lo < raw_hi - raw_lo;
    let series = if differential { &diffs } else { &raw };

    // The decoder only sees the f32 bounds, so quantise against those
    let (min, max) = if series.is_empty() {
        (0.0f32, 0.0f32)
    } else {
        let (lo, hi) = bounds(series);
        (lo as f32, hi as f32)
    };
    let range = f64::from(max) - f64::from(min);
    let width = Width::choose(range, f64::from(resolution));
    let levels = width.levels();
    let scale = if range > 0.0 { levels / range } else { 1.0 };

    let count = i32::try_from(series.len()).map_err(|_| Error::CountMismatch {
        what: "delta encoded values",
        expected: i32::MAX as usize,
        actual: series.len(),
    })?;
    let head = Head {
        first: values.first().copied().unwrap_or(0.0),
        min,
        max,
        count: if differential { -count } else { count },
        width: width.bytes(),
    };

    let mut out = Cursor::new(Vec::with_capacity(
        HEAD_SIZE + series.len() * usize::from(width.bytes()),
    ));
    write_fixed(&mut out, &head)?;
    let mut out = out.into_inner();
    for &v in series {
        let q = ((v - f64::from(min)) * scale).round().clamp(0.0, levels) as u32;
        match width {
            Width::U8 => out.push(q as u8),
            Width::U16 => out.extend_from_slice(&(q as u16).to_le_bytes()),
            Width::U32 => out.extend_from_slice(&q.to_le_bytes()),
        }
    }
    Ok(out)
}

/// Decode an array written by [`encode_array`]
///
/// The buffer must hold exactly one encoded array.
pub fn decode_array(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut cursor = Cursor::new(bytes);
    let head: Head = read_fixed(&mut cursor).map_err(|_| {
        Error::CompressionCorruption(format!(
            "delta block of {} bytes is shorter than its head",
            bytes.len()
        ))
    })?;
    let width = Width::from_selector(head.width)?;
    let stored = head.count.unsigned_abs() as usize;
    let packed = &bytes[HEAD_SIZE..];
    let expected = stored.checked_mul(usize::from(width.bytes()));
    if expected != Some(packed.len()) {
        return Err(Error::CompressionCorruption(format!(
            "delta block announces {stored} values of {} bytes but carries {} bytes",
            width.bytes(),
            packed.len()
        )));
    }

    let min = f64::from(head.min);
    let range = f64::from(head.max) - min;
    let step = if range > 0.0 { range / width.levels() } else { 1.0 };
    let series = packed
        .chunks_exact(usize::from(width.bytes()))
        .map(|c| {
            let q = match width {
                Width::U8 => u32::from(c[0]),
                Width::U16 => u32::from(u16::from_le_bytes([c[0], c[1]])),
                Width::U32 => u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
            };
            min + f64::from(q) * step
        });

    if head.count < 0 {
        let mut acc = f64::from(head.first);
        let mut out = Vec::with_capacity(stored + 1);
        out.push(head.first);
        for d in series {
            acc += d;
            out.push(acc as f32);
        }
        Ok(out)
    } else {
        // the head carries the first value exactly
        let mut out = Vec::with_capacity(stored);
        if stored > 0 {
            out.push(head.first);
        }
        out.extend(series.skip(1).map(|v| v as f32));
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn width_of(encoded: &[u8]) -> u8 {
        encoded[16]
    }

    fn count_of(encoded: &[u8]) -> i32 {
        i32::from_le_bytes([encoded[12], encoded[13], encoded[14], encoded[15]])
    }

    #[test]
    fn small_noisy_series_within_resolution() {
        let values = [10.0f32, 10.02, 9.98, 10.01];
        let encoded = encode_array(&values, 0.01).unwrap();
        assert_eq!(width_of(&encoded), 1);
        let decoded = decode_array(&encoded).unwrap();
        assert_eq!(decoded.len(), values.len());
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() <= 0.01, "{a} decoded as {b}");
        }
    }

    #[test]
    fn first_value_is_exact_in_absolute_mode() {
        let values = [0.3f32, 1000.0, 0.0, 500.0, -700.0];
        let encoded = encode_array(&values, 50.0).unwrap();
        assert!(count_of(&encoded) > 0);
        let decoded = decode_array(&encoded).unwrap();
        assert_eq!(decoded.len(), values.len());
        assert_eq!(decoded[0], values[0]);
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() <= 1700.0 / 255.0, "{a} decoded as {b}");
        }
    }

    #[test]
    fn ramp_uses_differences_and_errors_accumulate() {
        let values: Vec<f32> = (0..200)
            .map(|i| i as f32 * 0.5 + if i % 2 == 0 { 0.003 } else { 0.0 })
            .collect();
        let encoded = encode_array(&values, 0.01).unwrap();
        assert_eq!(count_of(&encoded), -199);
        let decoded = decode_array(&encoded).unwrap();
        assert_eq!(decoded.len(), 200);
        // step error is at most the difference range over 255 levels
        let step = 0.006 / 255.0 + 1e-4;
        for (k, (a, b)) in values.iter().zip(&decoded).enumerate() {
            assert!(
                f64::from((a - b).abs()) <= step * k as f64 + 1e-3,
                "element {k}: {a} decoded as {b}"
            );
        }
    }

    #[test]
    fn width_falls_back_to_sixteen_bits() {
        // alternating values make the raw range the smaller one
        let values = [0.0f32, 10.0, 0.0, 10.0, 5.0];
        let encoded = encode_array(&values, 0.001).unwrap();
        assert_eq!(count_of(&encoded), 5);
        assert_eq!(width_of(&encoded), 2);
        let decoded = decode_array(&encoded).unwrap();
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() <= 10.0 / 65535.0 + 1e-6);
        }
        assert_eq!(Width::choose(10.0, 1e-6), Width::U32);
    }

    #[test]
    fn constant_and_tiny_arrays() {
        assert_eq!(decode_array(&encode_array(&[], 1.0).unwrap()).unwrap(), Vec::<f32>::new());
        assert_eq!(decode_array(&encode_array(&[3.5], 1.0).unwrap()).unwrap(), vec![3.5]);
        let flat = [7.25f32; 6];
        let encoded = encode_array(&flat, 0.1).unwrap();
        assert_eq!(count_of(&encoded), 6);
        assert_eq!(decode_array(&encoded).unwrap(), flat.to_vec());
    }

    #[test]
    fn corrupt_blocks_fail_loudly() {
        let encoded = encode_array(&[1.0, 2.0, 4.0], 0.1).unwrap();
        assert!(matches!(
            decode_array(&encoded[..10]),
            Err(Error::CompressionCorruption(_))
        ));
        assert!(matches!(
            decode_array(&encoded[..encoded.len() - 1]),
            Err(Error::CompressionCorruption(_))
        ));
        let mut bad_width = encoded.clone();
        bad_width[16] = 3;
        assert!(matches!(
            decode_array(&bad_width),
            Err(Error::CompressionCorruption(_))
        ));
        assert!(encode_array(&[1.0], 0.0).is_err());
    }
}
