//! Feed stages of a repository sync: change detection, extraction, parsing.

pub mod cache;
pub mod digest;
pub mod extract;
pub mod parser;

pub use cache::FeedCache;
pub use digest::{digest, digest_archive, has_changed};
pub use extract::{
    MAX_STOPS_TABLE_BYTES, STOPS_TABLE, extract_stops_table, extract_stops_table_async,
};
pub use parser::{StopRecord, parse_stops, parse_stops_async};
