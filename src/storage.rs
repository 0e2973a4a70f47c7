use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::{FluviusError, Result};

/// Writes `records` as 2-space indented JSON, replacing any existing file.
pub fn save(records: &[Value], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records).map_err(FluviusError::Serialize)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    debug!(path = %path.display(), records = records.len(), "saved raw response");
    Ok(())
}

/// Reads back a file written by [`save`].
pub fn load(path: &Path) -> Result<Vec<Value>> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(FluviusError::ResponseParse)
}
