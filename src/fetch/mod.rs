//! Outbound HTTP: the [`HttpClient`] seam and GTFS archive retrieval.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::FetchError;

/// MIME types servers use for zip payloads.
const ARCHIVE_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip",
    "application/x-zip-compressed",
    "application/zip-compressed",
    "application/octet-stream",
    "binary/octet-stream",
    "multipart/x-zip",
];

/// A downloaded feed archive.
#[derive(Debug, Clone)]
pub struct FetchedArchive {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Returns `true` if a `Content-Type` header value denotes a zip archive.
pub fn is_archive_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ARCHIVE_CONTENT_TYPES.contains(&essence.as_str())
}

/// Downloads a feed archive, rejecting non-2xx answers and non-archive payloads.
#[tracing::instrument(skip(client), fields(url = %url))]
pub async fn fetch_archive<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<FetchedArchive, FetchError> {
    let url = url
        .parse()
        .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !is_archive_content_type(&content_type) {
        return Err(FetchError::NotAnArchive(content_type));
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), content_type = %content_type, "Archive downloaded");

    Ok(FetchedArchive {
        bytes,
        content_type,
    })
}
