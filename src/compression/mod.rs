//! Compressed `#MRZ` records
//!
//! `#CZ0` keeps the sounding table and the seabed image, `#CZ1` keeps the
//! soundings only. Soundings are stored column by column and lz4 compressed;
//! the seabed image goes through the adaptive [`delta`] codec first.
pub mod cz;
pub mod delta;
pub mod file;
pub mod imagery;
pub mod soundings;

pub use cz::{compress_mrz, CompressedMrz};
pub use delta::{decode_array, encode_array};
pub use file::{compress_file, decompress_file, Conversion};

use crate::parser::DatagramKind;
use crate::{Error, Result};

/// How much of an `#MRZ` survives compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// `#CZ0`: soundings and seabed image
    #[default]
    WithImagery,
    /// `#CZ1`: soundings only, image sample counts zeroed
    SoundingsOnly,
}

impl CompressionLevel {
    /// Level from its command line number
    pub fn from_level(level: u8) -> Option<CompressionLevel> {
        match level {
            0 => Some(CompressionLevel::WithImagery),
            1 => Some(CompressionLevel::SoundingsOnly),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            CompressionLevel::WithImagery => 0,
            CompressionLevel::SoundingsOnly => 1,
        }
    }

    /// Datagram type written at this level
    pub fn kind(self) -> DatagramKind {
        match self {
            CompressionLevel::WithImagery => DatagramKind::CompressedWithImagery,
            CompressionLevel::SoundingsOnly => DatagramKind::CompressedSoundingsOnly,
        }
    }

    /// Level that produced a compressed datagram type
    pub fn from_kind(kind: DatagramKind) -> Option<CompressionLevel> {
        match kind {
            DatagramKind::CompressedWithImagery => Some(CompressionLevel::WithImagery),
            DatagramKind::CompressedSoundingsOnly => Some(CompressionLevel::SoundingsOnly),
            _ => None,
        }
    }

    /// File name suffix for files compressed at this level
    pub fn suffix(self) -> &'static str {
        match self {
            CompressionLevel::WithImagery => "0z",
            CompressionLevel::SoundingsOnly => "1z",
        }
    }
}

/// Options for [`compress_mrz`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionOptions {
    pub level: CompressionLevel,
    /// Target resolution of the seabed image, in counts of 0.1 dB
    pub imagery_resolution: f32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        CompressionOptions {
            level: CompressionLevel::WithImagery,
            imagery_resolution: 1.0,
        }
    }
}

pub(crate) fn corrupt(msg: impl Into<String>) -> Error {
    Error::CompressionCorruption(msg.into())
}

/// lz4 compress `raw` with its size prepended
pub(crate) fn pack(raw: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(raw)
}

/// Undo [`pack`]
///
/// The prepended size is bounded by what lz4 can expand the block to before
/// anything is allocated for it.
pub(crate) fn unpack(block: &[u8]) -> Result<Vec<u8>> {
    let Some(size) = block.get(..4) else {
        return Err(corrupt(format!(
            "lz4 block of {} bytes has no size prefix",
            block.len()
        )));
    };
    let size = u32::from_le_bytes([size[0], size[1], size[2], size[3]]) as usize;
    let bound = (block.len() - 4).saturating_mul(255).saturating_add(16);
    if size > bound {
        return Err(corrupt(format!(
            "lz4 block announces {size} bytes from {} compressed bytes",
            block.len() - 4
        )));
    }
    let raw = lz4_flex::decompress_size_prepended(block)
        .map_err(|e| corrupt(format!("lz4 decompression failed: {e}")))?;
    if raw.len() != size {
        return Err(corrupt(format!(
            "lz4 block decompressed to {} bytes, expected {size}",
            raw.len()
        )));
    }
    Ok(raw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn levels_and_suffixes() {
        assert_eq!(CompressionLevel::from_level(0), Some(CompressionLevel::WithImagery));
        assert_eq!(CompressionLevel::from_level(2), None);
        assert_eq!(CompressionLevel::SoundingsOnly.suffix(), "1z");
        assert_eq!(CompressionLevel::SoundingsOnly.kind().name(), "#CZ1");
        assert_eq!(
            CompressionLevel::from_kind(DatagramKind::CompressedWithImagery),
            Some(CompressionLevel::WithImagery)
        );
        assert_eq!(CompressionOptions::default().imagery_resolution, 1.0);
    }

    #[test]
    fn lz4_blocks_round_trip_and_reject_garbage() {
        let raw: Vec<u8> = (0..4000u32).map(|i| (i % 7) as u8).collect();
        let block = pack(&raw);
        assert!(block.len() < raw.len());
        assert_eq!(unpack(&block).unwrap(), raw);

        assert!(matches!(unpack(&[1, 2]), Err(Error::CompressionCorruption(_))));
        let mut huge = block.clone();
        huge[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(unpack(&huge), Err(Error::CompressionCorruption(_))));
        let mut cut = block.clone();
        cut.truncate(block.len() / 2);
        assert!(matches!(unpack(&cut), Err(Error::CompressionCorruption(_))));
    }
}
