//! Count datagrams in a given file
use crate::index::{FileIndex, TypeStats};
use std::collections::BTreeMap;
use std::io::{stdout, Write};
use std::path::PathBuf;

fn write_counts<W: Write>(
    writer: &mut W,
    counts: &BTreeMap<String, TypeStats>,
) -> std::io::Result<()> {
    for (key, s) in counts {
        writeln!(writer, "{}\t{}\t{}\t{}\t{}", s.count, key, s.total, s.min, s.max)?;
    }
    Ok(())
}

pub fn count(path: PathBuf, output: Option<PathBuf>) -> crate::Result<()> {
    let counts = FileIndex::open(path)?.stats();

    match output {
        Some(path) => {
            let mut writer = std::fs::File::create(path)?;
            write_counts(&mut writer, &counts)?;
        }
        None => {
            let mut writer = stdout().lock();
            write_counts(&mut writer, &counts)?;
        }
    };
    Ok(())
}
