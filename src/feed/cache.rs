use std::io;
use std::path::{Path, PathBuf};

use super::extract::STOPS_TABLE;

/// On-disk copies of the last fetched archive and extracted table, one directory per repository.
#[derive(Debug, Clone)]
pub struct FeedCache {
    root: PathBuf,
}

impl FeedCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn store_archive(&self, repository_id: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        self.write(repository_id, "feed.zip", bytes).await
    }

    pub async fn store_table(&self, repository_id: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        self.write(repository_id, STOPS_TABLE, bytes).await
    }

    async fn write(&self, repository_id: &str, file: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir = self.root.join(dir_name(repository_id));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Repository ids are free text; keep them from escaping the cache root.
fn dir_name(repository_id: &str) -> String {
    repository_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
