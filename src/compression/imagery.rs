//! Seabed image blocks: delta coded, then lz4
use super::delta::{decode_array, encode_array};
use super::{corrupt, pack, unpack};
use crate::Result;

/// Compress seabed image samples (0.1 dB counts) to within `resolution` counts
pub fn compress_imagery(samples: &[i16], resolution: f32) -> Result<Vec<u8>> {
    let values: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
    Ok(pack(&encode_array(&values, resolution)?))
}

/// Undo [`compress_imagery`], checking the sample count
pub fn decompress_imagery(block: &[u8], expected: usize) -> Result<Vec<i16>> {
    let values = decode_array(&unpack(block)?)?;
    if values.len() != expected {
        return Err(corrupt(format!(
            "seabed image block holds {} samples, soundings announce {expected}",
            values.len()
        )));
    }
    Ok(values
        .into_iter()
        .map(|v| v.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
        .collect())
}
