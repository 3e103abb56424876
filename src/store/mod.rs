//! Persistence contracts and the replace-import of a repository's stops.
//!
//! [`StopIndex`] and [`RepositoryRegistry`] are the operations this crate needs
//! from a persistence engine. [`MemoryStopIndex`] and [`FileRegistry`] implement
//! them in process, optionally mirrored to JSON files.

mod memory;
mod registry;

pub use memory::MemoryStopIndex;
pub use registry::{FileRegistry, RepositoryRegistry};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::feed::StopRecord;
use crate::model::{Coordinate, GeoPoint, LiveDataDescriptor, Stop};

/// A stop returned by a proximity query.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStop {
    pub stop: Stop,
    pub distance_meters: f64,
}

/// Geospatial stop collection.
#[async_trait]
pub trait StopIndex: Send + Sync {
    /// Removes every stop owned by `reference_id`, returning how many were removed.
    async fn delete_by_owner(&self, reference_id: &str) -> Result<usize, StoreError>;

    async fn insert_many(&self, stops: Vec<Stop>) -> Result<usize, StoreError>;

    /// Stops within `radius_meters` of `center`, nearest first.
    async fn near(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<NearbyStop>, StoreError>;

    async fn find(&self, reference_id: &str, stop_id: &str) -> Result<Option<Stop>, StoreError>;

    async fn count_by_owner(&self, reference_id: &str) -> Result<usize, StoreError>;
}

/// Result of one replace-import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub deleted: usize,
}

/// Validating writer over a [`StopIndex`].
///
/// A replace is a delete followed by a bulk insert. The two are not atomic:
/// between them the repository has no stops in the index.
#[derive(Clone)]
pub struct StopStore {
    index: Arc<dyn StopIndex>,
}

impl StopStore {
    pub fn new(index: Arc<dyn StopIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn StopIndex> {
        &self.index
    }

    /// Replaces the repository's stops with the valid subset of `records`.
    ///
    /// Records without `stop_id`, `stop_name` or a usable `stop_lat`/`stop_lon`
    /// are counted in `skipped` and otherwise ignored.
    #[tracing::instrument(skip(self, records, live_data), fields(records = records.len()))]
    pub async fn replace_stops(
        &self,
        repository_id: &str,
        records: &[StopRecord],
        live_data: &LiveDataDescriptor,
    ) -> Result<ImportReport, StoreError> {
        let mut skipped = 0;
        let mut stops = Vec::with_capacity(records.len());
        for record in records {
            match stop_from_record(repository_id, record, live_data) {
                Some(stop) => stops.push(stop),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped stop records missing required fields");
        }

        let deleted = self.index.delete_by_owner(repository_id).await?;
        let imported = self.index.insert_many(stops).await?;
        info!(deleted, imported, skipped, "Stops replaced");

        Ok(ImportReport {
            imported,
            skipped,
            deleted,
        })
    }
}

/// Builds a stop from a parsed row, or `None` if a required field is missing.
pub fn stop_from_record(
    repository_id: &str,
    record: &StopRecord,
    live_data: &LiveDataDescriptor,
) -> Option<Stop> {
    let stop_id = record.get("stop_id")?;
    let stop_name = record.get("stop_name")?;
    let latitude = record.get("stop_lat")?.parse::<f64>().ok()?;
    let longitude = record.get("stop_lon")?.parse::<f64>().ok()?;
    let coordinate = Coordinate::new(latitude, longitude);
    if !coordinate.is_valid() {
        return None;
    }

    let optional = |field: &str| record.get(field).map(str::to_string);
    Some(Stop {
        reference_id: repository_id.to_string(),
        stop_id: stop_id.to_string(),
        stop_code: optional("stop_code"),
        stop_name: stop_name.to_string(),
        stop_desc: optional("stop_desc"),
        location: GeoPoint::new(coordinate),
        zone: optional("zone_id"),
        stop_url: optional("stop_url"),
        location_type: optional("location_type"),
        parent_station: optional("parent_station"),
        live_data: live_data.clone(),
    })
}

/// Writes `value` as JSON next to `path` and renames it into place.
pub(crate) async fn write_json_file<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
