//! Lenient CSV reader for the GTFS stops table.

use std::collections::HashMap;

use csv::{ReaderBuilder, Trim};

use crate::error::ParseError;

/// One data row keyed by header name. Values are trimmed and may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopRecord {
    fields: HashMap<String, String>,
}

impl StopRecord {
    /// The value of `field`, or `None` when absent or blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StopRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// [`parse_stops`] on the blocking pool.
pub async fn parse_stops_async(table: Vec<u8>) -> Result<Vec<StopRecord>, ParseError> {
    Ok(tokio::task::spawn_blocking(move || parse_stops(&table)).await??)
}

/// Parses a stops table. The header row names the fields.
///
/// Blank lines are skipped. Rows shorter or longer than the header are kept:
/// fields are paired up positionally and the excess on either side is dropped.
///
/// # Errors
///
/// Only on read failures of the underlying CSV stream, never on row shape.
#[tracing::instrument(skip_all, fields(bytes = table.len()))]
pub fn parse_stops(table: &[u8]) -> Result<Vec<StopRecord>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(table);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect();

    let mut records = Vec::new();
    for row in rdr.byte_records() {
        let row = row?;
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), String::from_utf8_lossy(v).into_owned()))
                .collect(),
        );
    }

    Ok(records)
}
