//! Converting KMALL attitude to Avro files
use crate::index::FileIndex;
use crate::model::ATTITUDE_SCHEMA;
use crate::nav::extract_attitude;

use apache_avro::{Schema, Writer};

use binrw::io::BufReader;
use std::path::Path;

/// Write the attitude samples of a KMALL file to an Avro file
///
/// This is meant to be used from the command line interface:
/// ```console
/// $ kmall attitude <input> <output>
/// ```
pub fn avro(path: &Path, output: &Path) -> crate::Result<()> {
    let schema = Schema::parse_str(ATTITUDE_SCHEMA)?;

    let f = std::fs::File::open(path)?;
    let mut reader = BufReader::new(f);
    let index = FileIndex::build(&mut reader)?;
    let source = path.display().to_string();
    let attitude = extract_attitude(&mut reader, &index, &source)?;
    if attitude.errors > 0 {
        eprintln!(
            "{}: skipped {} undecodable attitude datagrams",
            path.display(),
            attitude.errors
        );
    }

    let g = std::fs::File::create(output)?;
    let mut writer = Writer::new(&schema, g);
    writer.extend_ser(attitude.records)?;
    writer.flush()?;
    Ok(())
}
