//! Pulls the stops table out of a GTFS archive.

use std::io::{self, Cursor, Read};

use bytes::Bytes;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::ExtractError;

pub const STOPS_TABLE: &str = "stops.txt";

/// Upper bound on a decompressed stops table. Real feeds stay in the tens of megabytes.
pub const MAX_STOPS_TABLE_BYTES: u64 = 256 * 1024 * 1024;

/// Returns the decompressed `stops.txt`, or `None` if the archive has no such entry.
pub fn extract_stops_table(archive: &[u8]) -> Result<Option<Vec<u8>>, ExtractError> {
    extract_entry(archive, STOPS_TABLE)
}

/// [`extract_stops_table`] on the blocking pool.
#[tracing::instrument(skip_all, fields(bytes = archive.len()))]
pub async fn extract_stops_table_async(archive: Bytes) -> Result<Option<Vec<u8>>, ExtractError> {
    tokio::task::spawn_blocking(move || extract_stops_table(&archive)).await?
}

/// Walks local file headers front to back, keeping only the entry whose path is
/// exactly `name`. Every other entry is drained, never buffered.
pub fn extract_entry(archive: &[u8], name: &str) -> Result<Option<Vec<u8>>, ExtractError> {
    extract_limited(archive, name, MAX_STOPS_TABLE_BYTES)
}

fn extract_limited(archive: &[u8], name: &str, limit: u64) -> Result<Option<Vec<u8>>, ExtractError> {
    match stream_entry(archive, name, limit) {
        Err(ExtractError::Zip(ZipError::UnsupportedArchive(reason))) => {
            // sizes only in trailing data descriptors; the central directory has them
            debug!(reason, "Archive not streamable, reading central directory");
            central_entry(archive, name, limit)
        }
        other => other,
    }
}

fn stream_entry(archive: &[u8], name: &str, limit: u64) -> Result<Option<Vec<u8>>, ExtractError> {
    let mut reader = Cursor::new(archive);
    while let Some(mut entry) = zip::read::read_zipfile_from_stream(&mut reader)? {
        if entry.name() == name {
            let declared = entry.size();
            return read_bounded(&mut entry, name, declared, limit).map(Some);
        }
        io::copy(&mut entry, &mut io::sink())?;
    }
    Ok(None)
}

fn central_entry(archive: &[u8], name: &str, limit: u64) -> Result<Option<Vec<u8>>, ExtractError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let declared = entry.size();
    read_bounded(&mut entry, name, declared, limit).map(Some)
}

/// Reads at most `limit` bytes. The header's declared size is only a hint:
/// it is checked up front but never trusted for allocation beyond `limit`.
fn read_bounded(
    entry: &mut impl Read,
    name: &str,
    declared: u64,
    limit: u64,
) -> Result<Vec<u8>, ExtractError> {
    let too_large = || ExtractError::TooLarge {
        name: name.to_string(),
        limit,
    };
    if declared > limit {
        return Err(too_large());
    }

    let mut table = Vec::with_capacity(declared as usize);
    entry.take(limit + 1).read_to_end(&mut table)?;
    if table.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn push_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = !0u32;
        for &b in bytes {
            crc ^= u32::from(b);
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
        }
        !crc
    }

    /// Stored entries written the way a non-seekable writer does: general purpose
    /// flag bit 3 set, zero sizes in the local header, a trailing data descriptor.
    fn streamed_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for (name, body) in entries {
            let offset = out.len() as u32;
            let crc = crc32(body);
            let len = body.len() as u32;

            push_u32(&mut out, 0x0403_4b50);
            push_u16(&mut out, 20);
            push_u16(&mut out, 0x0008);
            push_u16(&mut out, 0); // stored
            push_u16(&mut out, 0);
            push_u16(&mut out, 0x0021); // 1980-01-01
            push_u32(&mut out, 0);
            push_u32(&mut out, 0);
            push_u32(&mut out, 0);
            push_u16(&mut out, name.len() as u16);
            push_u16(&mut out, 0);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(body);
            push_u32(&mut out, 0x0807_4b50);
            push_u32(&mut out, crc);
            push_u32(&mut out, len);
            push_u32(&mut out, len);

            push_u32(&mut central, 0x0201_4b50);
            push_u16(&mut central, 20);
            push_u16(&mut central, 20);
            push_u16(&mut central, 0x0008);
            push_u16(&mut central, 0);
            push_u16(&mut central, 0);
            push_u16(&mut central, 0x0021);
            push_u32(&mut central, crc);
            push_u32(&mut central, len);
            push_u32(&mut central, len);
            push_u16(&mut central, name.len() as u16);
            push_u16(&mut central, 0); // extra
            push_u16(&mut central, 0); // comment
            push_u16(&mut central, 0); // disk
            push_u16(&mut central, 0); // internal attributes
            push_u32(&mut central, 0); // external attributes
            push_u32(&mut central, offset);
            central.extend_from_slice(name.as_bytes());
        }

        let central_offset = out.len() as u32;
        let central_size = central.len() as u32;
        out.extend_from_slice(&central);
        push_u32(&mut out, 0x0605_4b50);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, entries.len() as u16);
        push_u16(&mut out, entries.len() as u16);
        push_u32(&mut out, central_size);
        push_u32(&mut out, central_offset);
        push_u16(&mut out, 0);
        out
    }

    /// A lone local header for `stops.txt` whose zip64 extra field claims `size` bytes.
    fn zip64_size_claim(size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, 0x0403_4b50);
        push_u16(&mut out, 45);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0x0021);
        push_u32(&mut out, 0);
        push_u32(&mut out, u32::MAX);
        push_u32(&mut out, u32::MAX);
        push_u16(&mut out, STOPS_TABLE.len() as u16);
        push_u16(&mut out, 20);
        out.extend_from_slice(STOPS_TABLE.as_bytes());
        push_u16(&mut out, 0x0001);
        push_u16(&mut out, 16);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out
    }

    #[test]
    fn test_extracts_only_stops_table() {
        let bytes = archive(&[
            ("agency.txt", b"agency_id,agency_name\n1,TPER\n"),
            ("stops.txt", b"stop_id,stop_name\n1,Maggiore\n"),
            ("routes.txt", b"route_id\n11\n"),
        ]);
        let table = extract_stops_table(&bytes).unwrap().unwrap();
        assert_eq!(table, b"stop_id,stop_name\n1,Maggiore\n");
    }

    #[test]
    fn test_path_must_match_exactly() {
        let bytes = archive(&[
            ("feed/stops.txt", b"stop_id\n1\n"),
            ("stops.txt.bak", b"stop_id\n2\n"),
        ]);
        assert!(extract_stops_table(&bytes).unwrap().is_none());
    }

    #[test]
    fn test_missing_stops_table_is_not_an_error() {
        let bytes = archive(&[("agency.txt", b"agency_id\n1\n")]);
        assert!(extract_stops_table(&bytes).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(extract_stops_table(b"<html>not found</html>").is_err());
    }

    #[test]
    fn test_forged_zip64_size_is_rejected_before_reading() {
        let err = extract_stops_table(&zip64_size_claim(1 << 60)).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { .. }));
    }

    #[test]
    fn test_table_over_limit_is_rejected() {
        let bytes = archive(&[("stops.txt", b"stop_id,stop_name\n1,Maggiore\n")]);
        let err = extract_limited(&bytes, STOPS_TABLE, 8).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { limit: 8, .. }));
        assert!(extract_limited(&bytes, STOPS_TABLE, 64).unwrap().is_some());
    }

    #[test]
    fn test_data_descriptor_entries_fall_back_to_central_directory() {
        let bytes = streamed_archive(&[
            ("agency.txt", b"agency_id,agency_name\n1,TPER\n"),
            ("stops.txt", b"stop_id,stop_name\n1,Maggiore\n"),
        ]);
        let table = extract_stops_table(&bytes).unwrap().unwrap();
        assert_eq!(table, b"stop_id,stop_name\n1,Maggiore\n");

        let err = extract_limited(&bytes, STOPS_TABLE, 8).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { .. }));
    }

    #[test]
    fn test_data_descriptor_archive_without_stops_table() {
        let bytes = streamed_archive(&[("agency.txt", b"agency_id\n1\n")]);
        assert!(extract_stops_table(&bytes).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_async_extraction() {
        let bytes = archive(&[("stops.txt", b"stop_id\n1\n")]);
        let table = extract_stops_table_async(Bytes::from(bytes))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table, b"stop_id\n1\n");
    }
}
