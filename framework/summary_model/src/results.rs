use std::io::{BufRead, Write};

use crosswind_core::prelude::{validate_result_value, ResultRecord, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid result on line {line}: {source}")]
    Schema { line: usize, source: SchemaError },
}

/// Write result records as JSON Lines, one record per line.
pub fn store_results<'a, W: Write>(
    records: impl IntoIterator<Item = &'a ResultRecord>,
    writer: &mut W,
) -> Result<(), JsonlError> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read result records written by [store_results], checking each against the result schema.
///
/// Blank lines are skipped. Line numbers in errors start at 1.
pub fn load_results<R: BufRead>(reader: R) -> Result<Vec<ResultRecord>, JsonlError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)?;
        let record = validate_result_value(&value).map_err(|source| JsonlError::Schema {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
