//! Verify KMALL files
use crate::verify::verify_file;
use std::io::{stdout, Write};
use std::path::PathBuf;
use tracing::error;

/// Print a report per file, carrying on past files that cannot be read
pub fn verify(paths: &[PathBuf]) -> crate::Result<()> {
    let mut writer = stdout().lock();
    let mut failed = 0;
    for path in paths {
        match verify_file(path) {
            Ok(report) => write!(writer, "{report}")?,
            Err(e) => {
                error!(path = %path.display(), error = %e, "verify failed");
                writeln!(writer, "File: {}\n  Failed: {e}", path.display())?;
                failed += 1;
            }
        }
    }
    writer.flush()?;
    match failed {
        0 => Ok(()),
        n => Err(super::failed_files(n, paths.len())),
    }
}
