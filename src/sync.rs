//! Keeps the stop index in line with each repository's published archive.
//!
//! One cycle per repository: fetch, hash, (if changed) extract, parse, import,
//! then record digest and timestamp. Cycles of different repositories run
//! concurrently; a failed cycle is logged and never affects its siblings.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{StoreError, SyncError, SyncStage};
use crate::feed::{
    FeedCache, digest_archive, extract_stops_table_async, has_changed, parse_stops_async,
};
use crate::fetch::{HttpClient, fetch_archive};
use crate::model::{RepositoryDescriptor, SyncStamp};
use crate::store::{ImportReport, RepositoryRegistry, StopStore};

pub const DEFAULT_STALE_CUTOFF_DAYS: i64 = 1;
pub const DEFAULT_SYNC_CONCURRENCY: usize = 4;

/// Whether a repository is due for a refresh.
///
/// Compares UTC calendar days: due when `last_update` is missing or its day is
/// before `now`'s day minus `cutoff_days`.
pub fn is_stale(last_update: Option<DateTime<Utc>>, now: DateTime<Utc>, cutoff_days: i64) -> bool {
    let Some(last_update) = last_update else {
        return true;
    };
    match TimeDelta::try_days(cutoff_days).and_then(|d| now.date_naive().checked_sub_signed(d)) {
        Some(threshold) => last_update.date_naive() < threshold,
        None => false,
    }
}

/// How a repository cycle ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Synced recently enough; nothing fetched.
    Fresh,
    /// Archive digest matches the stored one. Timestamp refreshed only.
    Unchanged { digest: String },
    /// Archive changed but has no stops table. Existing stops are kept.
    NoStopsFound { digest: String },
    Imported { digest: String, report: ImportReport },
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Fresh => "fresh",
            SyncOutcome::Unchanged { .. } => "unchanged",
            SyncOutcome::NoStopsFound { .. } => "no_stops_found",
            SyncOutcome::Imported { .. } => "imported",
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            SyncOutcome::Fresh => None,
            SyncOutcome::Unchanged { digest }
            | SyncOutcome::NoStopsFound { digest }
            | SyncOutcome::Imported { digest, .. } => Some(digest),
        }
    }
}

/// Result of one repository's cycle within a pass.
#[derive(Debug)]
pub struct RepositoryOutcome {
    pub repository_id: String,
    pub repository_name: String,
    pub result: Result<SyncOutcome, SyncError>,
}

pub struct SyncOrchestrator<C> {
    http: C,
    registry: Arc<dyn RepositoryRegistry>,
    stops: StopStore,
    cache: Option<FeedCache>,
    stale_cutoff_days: i64,
    concurrency: usize,
}

impl<C: HttpClient> SyncOrchestrator<C> {
    pub fn new(http: C, registry: Arc<dyn RepositoryRegistry>, stops: StopStore) -> Self {
        Self {
            http,
            registry,
            stops,
            cache: None,
            stale_cutoff_days: DEFAULT_STALE_CUTOFF_DAYS,
            concurrency: DEFAULT_SYNC_CONCURRENCY,
        }
    }

    /// Keep copies of fetched archives and extracted tables on disk.
    pub fn with_cache(mut self, cache: FeedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_stale_cutoff_days(mut self, days: i64) -> Self {
        self.stale_cutoff_days = days;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one pass over every active repository.
    ///
    /// # Errors
    ///
    /// Only if the registry cannot be read. Per-repository failures are
    /// reported in the returned outcomes.
    pub async fn sync_all(&self) -> Result<Vec<RepositoryOutcome>, StoreError> {
        self.sync_all_at(Utc::now()).await
    }

    /// [`sync_all`](Self::sync_all) with an explicit clock.
    pub async fn sync_all_at(&self, now: DateTime<Utc>) -> Result<Vec<RepositoryOutcome>, StoreError> {
        let repositories = self.registry.find_by_active(true).await?;
        info!(repositories = repositories.len(), "Starting sync pass");
        Ok(self.sync_repositories(repositories, now).await)
    }

    /// Syncs the given repositories independently. Inactive ones are ignored.
    pub async fn sync_repositories(
        &self,
        repositories: Vec<RepositoryDescriptor>,
        now: DateTime<Utc>,
    ) -> Vec<RepositoryOutcome> {
        stream::iter(repositories.into_iter().filter(|r| r.is_active))
            .map(|repo| {
                let span = tracing::info_span!(
                    "sync_repository",
                    repository_id = %repo.id,
                    repository_name = %repo.name,
                );
                async move {
                    let result = self.sync_repository(&repo, now).await;
                    match &result {
                        Ok(outcome) => info!(outcome = outcome.as_str(), "Repository cycle done"),
                        Err(e) => error!(stage = %e.stage(), error = %e, "Repository cycle failed"),
                    }
                    RepositoryOutcome {
                        repository_id: repo.id,
                        repository_name: repo.name,
                        result,
                    }
                }
                .instrument(span)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// One repository's cycle. Stages run strictly in order and the registry
    /// is only written after every earlier stage has completed.
    ///
    /// A repository whose recorded digest has no stops behind it in the index
    /// (a memory-only index after a restart) is fetched and imported again
    /// regardless of freshness or digest.
    pub async fn sync_repository(
        &self,
        repo: &RepositoryDescriptor,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let stops_missing = self.stops_missing(repo).await?;
        if stops_missing {
            info!(digest = %repo.hash, "No indexed stops for the recorded digest, re-importing");
        } else if !is_stale(repo.last_update, now, self.stale_cutoff_days) {
            debug!(last_update = ?repo.last_update, "Repository is fresh");
            return Ok(SyncOutcome::Fresh);
        }

        let archive = fetch_archive(&self.http, &repo.repository_url).await?;
        info!(bytes = archive.bytes.len(), content_type = %archive.content_type, "Archive fetched");
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store_archive(&repo.id, &archive.bytes).await {
                warn!(error = %e, "Failed to cache archive");
            }
        }

        let digest = digest_archive(archive.bytes.clone())
            .await
            .map_err(SyncError::Hash)?;
        if !stops_missing && !has_changed(&digest, &repo.hash) {
            info!(digest = %digest, "Archive unchanged");
            self.record(repo, &digest, now).await?;
            return Ok(SyncOutcome::Unchanged { digest });
        }

        let Some(table) = extract_stops_table_async(archive.bytes).await? else {
            warn!(digest = %digest, "Archive has no stops table");
            self.record(repo, &digest, now).await?;
            return Ok(SyncOutcome::NoStopsFound { digest });
        };
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store_table(&repo.id, &table).await {
                warn!(error = %e, "Failed to cache stops table");
            }
        }

        let records = parse_stops_async(table).await?;
        debug!(records = records.len(), "Stops table parsed");

        let report = self
            .stops
            .replace_stops(&repo.id, &records, &repo.live_data)
            .await
            .map_err(|source| SyncError::Store {
                stage: SyncStage::Importing,
                source,
            })?;

        self.record(repo, &digest, now).await?;
        Ok(SyncOutcome::Imported { digest, report })
    }

    async fn stops_missing(&self, repo: &RepositoryDescriptor) -> Result<bool, SyncError> {
        if repo.hash.is_empty() {
            return Ok(false);
        }
        let indexed = self
            .stops
            .index()
            .count_by_owner(&repo.id)
            .await
            .map_err(|source| SyncError::Store {
                stage: SyncStage::Checking,
                source,
            })?;
        Ok(indexed == 0)
    }

    async fn record(
        &self,
        repo: &RepositoryDescriptor,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let stamp = SyncStamp {
            digest: digest.to_string(),
            at: now,
        };
        self.registry
            .record_sync(&repo.id, stamp)
            .await
            .map_err(|source| SyncError::Store {
                stage: SyncStage::Recording,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_just_synced_is_not_stale() {
        let now = Utc::now();
        assert!(!is_stale(Some(now), now, 1));
    }

    #[test]
    fn test_ten_days_old_is_stale() {
        let now = Utc::now();
        assert!(is_stale(Some(now - TimeDelta::days(10)), now, 1));
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        assert!(is_stale(None, Utc::now(), 1));
    }

    #[test]
    fn test_staleness_uses_calendar_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 5, 0).unwrap();
        // yesterday late evening: same day as the cutoff, not before it
        let yesterday = Utc.with_ymd_and_hms(2024, 3, 9, 23, 55, 0).unwrap();
        let two_days_ago = Utc.with_ymd_and_hms(2024, 3, 8, 23, 59, 0).unwrap();

        assert!(!is_stale(Some(yesterday), now, 1));
        assert!(is_stale(Some(two_days_ago), now, 1));
        assert!(is_stale(Some(yesterday), now, 0));
    }

    #[test]
    fn test_absurd_cutoff_never_refreshes() {
        let now = Utc::now();
        assert!(!is_stale(Some(now - TimeDelta::days(3650)), now, i64::MAX));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(SyncOutcome::Fresh.as_str(), "fresh");
        assert_eq!(SyncOutcome::Fresh.digest(), None);
        let unchanged = SyncOutcome::Unchanged {
            digest: "d".to_string(),
        };
        assert_eq!(unchanged.digest(), Some("d"));
    }
}
