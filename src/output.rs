//! Output formatting and persistence for sync results.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use tracing::debug;

use crate::report::{PassSummary, SyncRecord};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a pass summary using Rust's debug pretty-print format.
pub fn print_pretty(summary: &PassSummary) {
    debug!("{:#?}", summary);
}

/// Logs a sync record as one line of JSON.
pub fn print_json(record: &SyncRecord) -> Result<()> {
    debug!("{}", serde_json::to_string(record)?);
    Ok(())
}

/// Appends [`SyncRecord`]s as rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(path: &str, records: &[SyncRecord]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = records.len(), "Appending CSV records");

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}
