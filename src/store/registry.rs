use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::write_json_file;
use crate::error::StoreError;
use crate::model::{RepositoryDescriptor, SyncStamp};

/// Read access to repository descriptors plus the single write the sync pipeline makes.
#[async_trait]
pub trait RepositoryRegistry: Send + Sync {
    async fn find_by_active(&self, active: bool) -> Result<Vec<RepositoryDescriptor>, StoreError>;

    /// Stores digest and timestamp of a finished sync attempt in one write.
    async fn record_sync(&self, repository_id: &str, stamp: SyncStamp) -> Result<(), StoreError>;
}

/// Repository descriptors loaded from a JSON array on disk.
///
/// ```json
/// [
///   { "_id": "tper", "name": "TPER", "isActive": true, "repositoryUrl": "...",
///     "lastUpdate": null, "hash": "", "repo_data": { "endpoint": "..." } }
/// ]
/// ```
pub struct FileRegistry {
    repositories: RwLock<Vec<RepositoryDescriptor>>,
    path: Option<PathBuf>,
}

impl FileRegistry {
    /// An in-memory registry with nothing to write back to.
    pub fn new(repositories: Vec<RepositoryDescriptor>) -> Self {
        Self {
            repositories: RwLock::new(repositories),
            path: None,
        }
    }

    /// Loads the registry file; every [`record_sync`](RepositoryRegistry::record_sync) rewrites it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let body = tokio::fs::read(&path).await?;
        let repositories: Vec<RepositoryDescriptor> = serde_json::from_slice(&body)?;
        info!(path = %path.display(), repositories = repositories.len(), "Loaded repository registry");

        Ok(Self {
            repositories: RwLock::new(repositories),
            path: Some(path),
        })
    }

    pub async fn get(&self, repository_id: &str) -> Option<RepositoryDescriptor> {
        self.repositories
            .read()
            .await
            .iter()
            .find(|r| r.id == repository_id)
            .cloned()
    }
}

#[async_trait]
impl RepositoryRegistry for FileRegistry {
    async fn find_by_active(&self, active: bool) -> Result<Vec<RepositoryDescriptor>, StoreError> {
        Ok(self
            .repositories
            .read()
            .await
            .iter()
            .filter(|r| r.is_active == active)
            .cloned()
            .collect())
    }

    async fn record_sync(&self, repository_id: &str, stamp: SyncStamp) -> Result<(), StoreError> {
        let mut repositories = self.repositories.write().await;
        let position = repositories
            .iter()
            .position(|r| r.id == repository_id)
            .ok_or_else(|| StoreError::UnknownRepository(repository_id.to_string()))?;

        // The file is written first so memory never runs ahead of disk.
        if let Some(path) = &self.path {
            let mut updated = repositories.clone();
            updated[position].apply(&stamp);
            write_json_file(path, &updated).await?;
        }
        repositories[position].apply(&stamp);
        Ok(())
    }
}
