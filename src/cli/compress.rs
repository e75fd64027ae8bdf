//! Compress and decompress KMALL files
use crate::compression::{
    compress_file, decompress_file, CompressionLevel, CompressionOptions, Conversion,
};
use crate::Result;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use tracing::error;

fn each_file<F>(paths: &[PathBuf], mut convert: F) -> Result<()>
where
    F: FnMut(&Path) -> Result<(PathBuf, Conversion)>,
{
    let mut writer = stdout().lock();
    let mut failed = 0;
    for path in paths {
        match convert(path) {
            Ok((output, c)) => {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{:.3}",
                    path.display(),
                    output.display(),
                    c.converted,
                    c.copied,
                    c.ratio()
                )?;
                if let Some(fatal) = &c.report.fatal {
                    eprintln!("{}: stopped early: {fatal}", path.display());
                }
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "conversion failed");
                failed += 1;
            }
        }
    }
    match failed {
        0 => Ok(()),
        n => Err(super::failed_files(n, paths.len())),
    }
}

pub fn compress(paths: &[PathBuf], level: u8, resolution: f32) -> Result<()> {
    let options = CompressionOptions {
        level: CompressionLevel::from_level(level).unwrap_or_default(),
        imagery_resolution: resolution,
    };
    each_file(paths, |p| compress_file(p, &options))
}

pub fn decompress(paths: &[PathBuf]) -> Result<()> {
    each_file(paths, decompress_file)
}
