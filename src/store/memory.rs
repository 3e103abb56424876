use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use geo::{Distance, Haversine};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{NearbyStop, StopIndex, write_json_file};
use crate::error::StoreError;
use crate::model::{Coordinate, Stop};

/// Stops held in memory, grouped by owning repository.
///
/// Opened with [`MemoryStopIndex::open`], the whole collection is rewritten to
/// a JSON snapshot after every mutation so another process (or the next run)
/// can load it.
#[derive(Default)]
pub struct MemoryStopIndex {
    stops: RwLock<HashMap<String, Vec<Stop>>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStopIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` if it exists; later mutations are written back to it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut grouped: HashMap<String, Vec<Stop>> = HashMap::new();

        match tokio::fs::read(&path).await {
            Ok(body) => {
                let stops: Vec<Stop> = serde_json::from_slice(&body)?;
                info!(path = %path.display(), stops = stops.len(), "Loaded stop snapshot");
                for stop in stops {
                    grouped.entry(stop.reference_id.clone()).or_default().push(stop);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stop snapshot yet");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            stops: RwLock::new(grouped),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, stops: &HashMap<String, Vec<Stop>>) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let all: Vec<&Stop> = stops.values().flatten().collect();
        write_json_file(path, &all).await
    }
}

#[async_trait]
impl StopIndex for MemoryStopIndex {
    async fn delete_by_owner(&self, reference_id: &str) -> Result<usize, StoreError> {
        let mut stops = self.stops.write().await;
        let removed = stops.remove(reference_id).map_or(0, |v| v.len());
        if removed > 0 {
            self.persist(&stops).await?;
        }
        Ok(removed)
    }

    async fn insert_many(&self, new_stops: Vec<Stop>) -> Result<usize, StoreError> {
        if new_stops.is_empty() {
            return Ok(0);
        }
        let count = new_stops.len();
        let mut stops = self.stops.write().await;
        for stop in new_stops {
            stops.entry(stop.reference_id.clone()).or_default().push(stop);
        }
        self.persist(&stops).await?;
        Ok(count)
    }

    async fn near(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<NearbyStop>, StoreError> {
        let origin = center.to_point();
        let stops = self.stops.read().await;

        let mut found: Vec<NearbyStop> = stops
            .values()
            .flatten()
            .filter_map(|stop| {
                let distance_meters = Haversine.distance(origin, stop.coordinate().to_point());
                (distance_meters <= radius_meters).then(|| NearbyStop {
                    stop: stop.clone(),
                    distance_meters,
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));

        Ok(found)
    }

    async fn find(&self, reference_id: &str, stop_id: &str) -> Result<Option<Stop>, StoreError> {
        let stops = self.stops.read().await;
        Ok(stops
            .get(reference_id)
            .and_then(|v| v.iter().find(|s| s.stop_id == stop_id))
            .cloned())
    }

    async fn count_by_owner(&self, reference_id: &str) -> Result<usize, StoreError> {
        Ok(self.stops.read().await.get(reference_id).map_or(0, Vec::len))
    }
}
