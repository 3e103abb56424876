//! Error types shared by the sync pipeline and the query engine.

use std::fmt;

use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("failed to load repositories from {path}: {source}")]
    Repositories {
        path: String,
        #[source]
        source: StoreError,
    },
}

/// Archive retrieval failures. Soft: only the current repository cycle is aborted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed url '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),
    #[error("content type '{0}' is not an archive")]
    NotAnArchive(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive is unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),
    #[error("{name} is larger than {limit} bytes")]
    TooLarge { name: String, limit: u64 },
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("parsing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown repository '{0}'")]
    UnknownRepository(String),
}

/// The pipeline stage a repository cycle was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Checking,
    Fetching,
    Hashing,
    Extracting,
    Parsing,
    Importing,
    Recording,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Checking => "checking",
            SyncStage::Fetching => "fetching",
            SyncStage::Hashing => "hashing",
            SyncStage::Extracting => "extracting",
            SyncStage::Parsing => "parsing",
            SyncStage::Importing => "importing",
            SyncStage::Recording => "recording",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed repository cycle. Logged and swallowed by the orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("stops table is unreadable: {0}")]
    Parse(#[from] ParseError),
    #[error("{stage} failed: {source}")]
    Store {
        stage: SyncStage,
        #[source]
        source: StoreError,
    },
    #[error("hashing task failed: {0}")]
    Hash(tokio::task::JoinError),
}

impl SyncError {
    pub fn stage(&self) -> SyncStage {
        match self {
            SyncError::Fetch(_) => SyncStage::Fetching,
            SyncError::Hash(_) => SyncStage::Hashing,
            SyncError::Extract(_) => SyncStage::Extracting,
            SyncError::Parse(_) => SyncStage::Parsing,
            SyncError::Store { stage, .. } => *stage,
        }
    }
}
