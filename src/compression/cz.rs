//! `#CZ0` and `#CZ1` datagrams
//!
//! A compressed datagram keeps the `#MRZ` header (with its own tag) and
//! everything up to the extra detection classes unchanged. The sounding table
//! and, for `#CZ0`, the seabed image follow as length-prefixed blocks:
//!
//! | field            | type      | present |
//! |------------------|-----------|---------|
//! | soundings length | `u32`     | always  |
//! | soundings block  | bytes     | always  |
//! | image length     | `u32`     | `#CZ0`  |
//! | image block      | bytes     | `#CZ0`  |
use super::imagery::{compress_imagery, decompress_imagery};
use super::soundings::{compress_soundings, decompress_soundings};
use super::{corrupt, CompressionLevel, CompressionOptions};
use crate::codec::{ensure_room, read_bytes, read_fixed, write_fixed};
use crate::parser::multibeam::{
    ExtraDetClasses, MrzPrefix, Mrz, MultibeamBody, Partition, PingInfo,
    RxInfo, TxSectors, SOUNDING_SIZE,
};
use crate::parser::{DatagramKind, Header, Record, HEADER_SIZE, TRAILER_SIZE};
use crate::{Error, Result};
use std::io::{Cursor, Read, Seek, Write};
use tracing::debug;

/// A compressed `#MRZ`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedMrz {
    /// Header with a `#CZ0` or `#CZ1` tag and the compressed length
    pub header: Header,
    pub partition: Partition,
    pub body: MultibeamBody,
    pub ping_info: PingInfo,
    pub sectors: TxSectors,
    pub rx_info: RxInfo,
    pub extra_det_classes: ExtraDetClasses,
    /// lz4 compressed sounding columns
    pub soundings_block: Vec<u8>,
    /// lz4 compressed delta coded seabed image, `#CZ0` only
    pub imagery_block: Option<Vec<u8>>,
}

fn block_len(block: &[u8]) -> Result<u32> {
    u32::try_from(block.len()).map_err(|_| Error::CountMismatch {
        what: "compressed block length",
        expected: u32::MAX as usize,
        actual: block.len(),
    })
}

fn read_block<R: Read + Seek>(reader: &mut R, end: u64) -> Result<Vec<u8>> {
    let len: u32 = read_fixed(reader)?;
    ensure_room(reader, end, len as usize, 1)?;
    read_bytes(reader, len as usize)
}

fn write_block<W: Write + Seek>(writer: &mut W, block: &[u8]) -> Result<()> {
    write_fixed(writer, &block_len(block)?)?;
    writer.write_all(block)?;
    Ok(())
}

/// Compress an `#MRZ` at the level given in `options`
pub fn compress_mrz(mrz: &Mrz, options: &CompressionOptions) -> Result<CompressedMrz> {
    let samples = mrz.soundings.total_image_samples();
    if mrz.seabed_image.len() != samples {
        return Err(Error::CountMismatch {
            what: "seabed image samples (Σ SInumSamples)",
            expected: samples,
            actual: mrz.seabed_image.len(),
        });
    }

    let (soundings_block, imagery_block) = match options.level {
        CompressionLevel::WithImagery => (
            compress_soundings(&mrz.soundings)?,
            Some(compress_imagery(
                &mrz.seabed_image,
                options.imagery_resolution,
            )?),
        ),
        CompressionLevel::SoundingsOnly => {
            let mut soundings = mrz.soundings.clone();
            soundings.si_num_samples.iter_mut().for_each(|n| *n = 0);
            (compress_soundings(&soundings)?, None)
        }
    };

    let mut compressed = CompressedMrz {
        header: Header {
            dgm_type: options.level.kind().code(),
            ..mrz.header.clone()
        },
        partition: mrz.partition,
        body: mrz.body.clone(),
        ping_info: mrz.ping_info.clone(),
        sectors: mrz.sectors.clone(),
        rx_info: mrz.rx_info.clone(),
        extra_det_classes: mrz.extra_det_classes.clone(),
        soundings_block,
        imagery_block,
    };
    compressed.header.num_bytes_dgm = compressed.compressed_length()?;
    debug!(
        ping = mrz.body.ping_cnt,
        soundings = mrz.soundings.len(),
        from = mrz.soundings.len() * usize::from(SOUNDING_SIZE) + 2 * samples,
        to = compressed.blocks_length(),
        "compressed MRZ"
    );
    Ok(compressed)
}

impl CompressedMrz {
    /// The level this datagram was compressed at
    pub fn level(&self) -> Option<CompressionLevel> {
        self.header.kind().and_then(CompressionLevel::from_kind)
    }

    fn prefix(&self) -> MrzPrefix {
        MrzPrefix {
            partition: self.partition,
            body: self.body.clone(),
            ping_info: self.ping_info.clone(),
            sectors: self.sectors.clone(),
            rx_info: self.rx_info.clone(),
            extra_det_classes: self.extra_det_classes.clone(),
        }
    }

    fn prefix_length(&self) -> Result<u64> {
        let mut buf = Cursor::new(Vec::new());
        self.prefix().write(
            &mut buf,
            self.header.dgm_version,
            self.rx_info.num_soundings(),
        )?;
        Ok(buf.into_inner().len() as u64)
    }

    /// Bytes taken by the blocks and their length words
    fn blocks_length(&self) -> u64 {
        let image = self
            .imagery_block
            .as_ref()
            .map_or(0, |b| 4 + b.len() as u64);
        4 + self.soundings_block.len() as u64 + image
    }

    fn compressed_length(&self) -> Result<u32> {
        let total = HEADER_SIZE + self.prefix_length()? + self.blocks_length() + TRAILER_SIZE;
        u32::try_from(total).map_err(|_| Error::CountMismatch {
            what: "datagram length",
            expected: u32::MAX as usize,
            actual: total as usize,
        })
    }

    /// Length of the `#MRZ` this datagram expands to
    ///
    /// The compressed length minus the blocks, plus 120 bytes per sounding
    /// and 2 bytes per seabed image sample. The image sample counts live in
    /// the sounding block, which is decompressed for this.
    pub fn expanded_length(&self) -> Result<u64> {
        let soundings = decompress_soundings(&self.soundings_block)?;
        self.expanded_from(soundings.len(), soundings.total_image_samples())
    }

    fn expanded_from(&self, soundings: usize, samples: usize) -> Result<u64> {
        let kept = u64::from(self.header.num_bytes_dgm)
            .checked_sub(self.blocks_length())
            .ok_or_else(|| corrupt("compressed length is shorter than its blocks"))?;
        Ok(kept + soundings as u64 * u64::from(SOUNDING_SIZE) + 2 * samples as u64)
    }

    /// Decompress back into an `#MRZ`
    ///
    /// Non-detect reflectivity is not restored, and the seabed image is
    /// only as exact as the resolution it was compressed with.
    pub fn expand(&self) -> Result<Mrz> {
        let level = self
            .level()
            .ok_or_else(|| Error::UnknownDatagramType(self.header.type_str()))?;
        let soundings = decompress_soundings(&self.soundings_block)?;
        if soundings.len() != self.rx_info.num_soundings() {
            return Err(corrupt(format!(
                "sounding block holds {} soundings, rx info announces {}",
                soundings.len(),
                self.rx_info.num_soundings()
            )));
        }
        let samples = soundings.total_image_samples();
        let seabed_image = match (level, &self.imagery_block) {
            (CompressionLevel::WithImagery, Some(block)) => decompress_imagery(block, samples)?,
            (CompressionLevel::SoundingsOnly, None) if samples == 0 => Vec::new(),
            (CompressionLevel::SoundingsOnly, None) => {
                return Err(corrupt(format!(
                    "#CZ1 soundings announce {samples} image samples"
                )))
            }
            _ => return Err(corrupt("image block does not match the compression level")),
        };

        let mut mrz = Mrz::from_parts(self.header.clone(), self.prefix(), soundings, seabed_image);
        mrz.header.dgm_type = DatagramKind::RangeAndDepth.code();
        let expanded = self.expanded_from(mrz.soundings.len(), mrz.seabed_image.len())?;
        mrz.header.num_bytes_dgm = u32::try_from(expanded).map_err(|_| Error::CountMismatch {
            what: "datagram length",
            expected: u32::MAX as usize,
            actual: expanded as usize,
        })?;
        Ok(mrz)
    }
}

impl Record for CompressedMrz {
    fn header(&self) -> &Header {
        &self.header
    }

    fn decode_body<R: Read + Seek>(reader: &mut R, header: Header, end: u64) -> Result<Self> {
        let level = header
            .kind()
            .and_then(CompressionLevel::from_kind)
            .ok_or_else(|| Error::UnknownDatagramType(header.type_str()))?;
        let prefix = MrzPrefix::read(reader, header.dgm_version, end)?;
        let soundings_block = read_block(reader, end)?;
        let imagery_block = match level {
            CompressionLevel::WithImagery => Some(read_block(reader, end)?),
            CompressionLevel::SoundingsOnly => None,
        };
        Ok(CompressedMrz {
            header,
            partition: prefix.partition,
            body: prefix.body,
            ping_info: prefix.ping_info,
            sectors: prefix.sectors,
            rx_info: prefix.rx_info,
            extra_det_classes: prefix.extra_det_classes,
            soundings_block,
            imagery_block,
        })
    }

    fn encode_body<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let expects_image = matches!(self.level(), Some(CompressionLevel::WithImagery));
        if expects_image != self.imagery_block.is_some() {
            return Err(corrupt("image block does not match the compression level"));
        }
        self.prefix()
            .write(writer, self.header.dgm_version, self.rx_info.num_soundings())?;
        write_block(writer, &self.soundings_block)?;
        if let Some(block) = &self.imagery_block {
            write_block(writer, block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::soundings::NON_DETECT_REFLECTIVITY_DB;
    use crate::parser::multibeam::test::sample_mrz;
    use crate::parser::Datagram;

    fn options(level: CompressionLevel) -> CompressionOptions {
        CompressionOptions {
            level,
            ..Default::default()
        }
    }

    /// Offset of the first sounding in an encoded `#MRZ`
    fn soundings_offset(mrz: &Mrz) -> usize {
        mrz.to_bytes().unwrap().len()
            - TRAILER_SIZE as usize
            - 2 * mrz.seabed_image.len()
            - usize::from(SOUNDING_SIZE) * mrz.soundings.len()
    }

    #[test]
    fn cz0_keeps_prefix_bytes_and_image() {
        let mrz = sample_mrz(1);
        let original = mrz.to_bytes().unwrap();
        let cz = compress_mrz(&mrz, &options(CompressionLevel::WithImagery)).unwrap();
        let cz_bytes = cz.to_bytes().unwrap();
        assert_eq!(&cz_bytes[4..8], b"#CZ0");
        assert_eq!(cz.header.num_bytes_dgm as usize, cz_bytes.len());
        assert_eq!(cz.expanded_length().unwrap() as usize, original.len());

        let back = match Datagram::read(&mut Cursor::new(&cz_bytes)).unwrap() {
            Datagram::Compressed(c) => c,
            other => panic!("decoded as {:?}", other.kind()),
        };
        assert_eq!(back.soundings_block, cz.soundings_block);
        assert_eq!(back.imagery_block, cz.imagery_block);
        assert_eq!(back.to_bytes().unwrap(), cz_bytes);
        let expanded = back.expand().unwrap();
        assert_eq!(expanded.header.kind(), Some(DatagramKind::RangeAndDepth));
        assert_eq!(expanded.header.num_bytes_dgm as usize, original.len());
        assert_eq!(expanded.soundings.total_image_samples(), 15);
        assert_eq!(expanded.seabed_image, mrz.seabed_image);

        let expanded_bytes = expanded.to_bytes().unwrap();
        let prefix_end = soundings_offset(&mrz);
        assert_eq!(expanded_bytes[..prefix_end], original[..prefix_end]);

        let mut expected = mrz.soundings.clone();
        expected.reflectivity1_db[2] = NON_DETECT_REFLECTIVITY_DB;
        expected.reflectivity2_db[2] = NON_DETECT_REFLECTIVITY_DB;
        assert_eq!(expanded.soundings, expected);
    }

    #[test]
    fn cz0_ramp_image_within_resolution() {
        let mut mrz = sample_mrz(1);
        // a smooth ramp makes the differences the narrower series
        mrz.seabed_image = (0..15i16).map(|i| -300 + 4 * i + i % 3).collect();
        let cz = compress_mrz(&mrz, &options(CompressionLevel::WithImagery)).unwrap();
        let image = crate::compression::unpack(cz.imagery_block.as_ref().unwrap()).unwrap();
        assert!(i32::from_le_bytes([image[12], image[13], image[14], image[15]]) < 0);

        let bytes = cz.to_bytes().unwrap();
        let expanded = CompressedMrz::read(&mut Cursor::new(&bytes))
            .unwrap()
            .expand()
            .unwrap();
        assert_eq!(expanded.seabed_image.len(), 15);
        for (a, b) in mrz.seabed_image.iter().zip(&expanded.seabed_image) {
            assert!((a - b).abs() <= 1, "{a} came back as {b}");
        }
    }

    #[test]
    fn cz1_drops_image_and_zeroes_sample_counts() {
        let mrz = sample_mrz(0);
        let original_len = mrz.to_bytes().unwrap().len();
        let cz = compress_mrz(&mrz, &options(CompressionLevel::SoundingsOnly)).unwrap();
        assert!(cz.imagery_block.is_none());
        let bytes = cz.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], b"#CZ1");
        assert_eq!(cz.expanded_length().unwrap() as usize, original_len - 30);

        let expanded = CompressedMrz::read(&mut Cursor::new(&bytes))
            .unwrap()
            .expand()
            .unwrap();
        assert!(expanded.seabed_image.is_empty());
        assert!(expanded.soundings.si_num_samples.iter().all(|&n| n == 0));
        assert_eq!(expanded.to_bytes().unwrap().len(), original_len - 30);
        assert_eq!(expanded.soundings.z_re_ref_point_m, mrz.soundings.z_re_ref_point_m);
    }

    #[test]
    fn image_count_must_match_before_compressing() {
        let mut mrz = sample_mrz(0);
        mrz.seabed_image.truncate(3);
        assert!(matches!(
            compress_mrz(&mrz, &CompressionOptions::default()),
            Err(Error::CountMismatch { expected: 15, actual: 3, .. })
        ));
    }

    #[test]
    fn damaged_blocks_fail_on_expand() {
        let mrz = sample_mrz(2);
        let mut cz = compress_mrz(&mrz, &CompressionOptions::default()).unwrap();
        let mut bad = cz.clone();
        let n = bad.soundings_block.len();
        bad.soundings_block.truncate(n - 3);
        assert!(matches!(bad.expand(), Err(Error::CompressionCorruption(_))));

        cz.imagery_block = None;
        assert!(matches!(cz.expand(), Err(Error::CompressionCorruption(_))));
        assert!(cz.to_bytes().is_err());
    }

    #[test]
    fn block_running_past_datagram_is_truncation() {
        let cz = compress_mrz(&sample_mrz(0), &CompressionOptions::default()).unwrap();
        let mut bytes = cz.to_bytes().unwrap();
        // the image length word sits right before the image block and trailer
        let image = cz.imagery_block.as_ref().unwrap().len();
        let at = bytes.len() - TRAILER_SIZE as usize - image - 4;
        bytes[at..at + 4].copy_from_slice(&(image as u32 + 100).to_le_bytes());
        assert!(matches!(
            CompressedMrz::read(&mut Cursor::new(&bytes)),
            Err(Error::TruncatedRead)
        ));
    }
}
