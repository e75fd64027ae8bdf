//! Index a KMALL file
use crate::index::FileIndex;
use std::io::{stdout, Write};
use std::path::PathBuf;

pub fn index(path: PathBuf, output: Option<PathBuf>, by_time: bool) -> crate::Result<()> {
    let mut index = FileIndex::open(&path)?;
    if by_time {
        index.sort_by_time();
    }
    if let Some(fatal) = &index.report.fatal {
        eprintln!("{}: stopped early: {fatal}", path.display());
    }

    match output {
        Some(path) => {
            let mut writer = std::fs::File::create(path)?;
            index.write_tsv(&mut writer)?;
        }
        None => {
            let mut writer = stdout().lock();
            index.write_tsv(&mut writer)?;
            writer.flush()?;
        }
    };
    Ok(())
}
