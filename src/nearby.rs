//! "What's near me": proximity lookup plus a live-arrival call per stop.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use geo::{Distance, Haversine};
use tracing::info;

use crate::error::StoreError;
use crate::fetch::HttpClient;
use crate::live::LiveArrivalClient;
use crate::model::{Coordinate, ResponseAggregate, Stop};
use crate::store::{NearbyStop, StopIndex};

/// Live calls in flight per query.
pub const DEFAULT_LIVE_CONCURRENCY: usize = 8;

pub struct NearbyQueryEngine<C> {
    index: Arc<dyn StopIndex>,
    live: LiveArrivalClient<C>,
    concurrency: usize,
}

impl<C: HttpClient> NearbyQueryEngine<C> {
    pub fn new(index: Arc<dyn StopIndex>, live: LiveArrivalClient<C>) -> Self {
        Self {
            index,
            live,
            concurrency: DEFAULT_LIVE_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Streams one [`ResponseAggregate`] per stop within `radius_meters`.
    ///
    /// Stops are looked up nearest first and their live calls start in that
    /// order, but each aggregate is yielded as soon as its own call finishes.
    /// A failed live call produces an aggregate with no lines.
    ///
    /// # Errors
    ///
    /// Only if the stop index itself cannot be queried.
    #[tracing::instrument(skip(self), fields(lat = center.latitude, lon = center.longitude))]
    pub async fn find_nearby(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<BoxStream<'_, ResponseAggregate>, StoreError> {
        let candidates = self.index.near(center, radius_meters).await?;
        info!(stops = candidates.len(), "Nearby stops found");

        Ok(stream::iter(candidates)
            .map(move |candidate| self.assemble(candidate))
            .buffer_unordered(self.concurrency)
            .boxed())
    }

    /// [`find_nearby`](Self::find_nearby), gathered and ordered nearest first.
    pub async fn collect_nearby(
        &self,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<ResponseAggregate>, StoreError> {
        let mut aggregates: Vec<_> = self
            .find_nearby(center, radius_meters)
            .await?
            .collect()
            .await;
        aggregates.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        Ok(aggregates)
    }

    /// Rebuilds the aggregate of a single stop ("retry this stop").
    ///
    /// `from` is the user's position, if known, for the distance field.
    /// Returns `None` when the stop is no longer indexed.
    #[tracing::instrument(skip(self, from))]
    pub async fn refresh_stop(
        &self,
        repository_id: &str,
        stop_id: &str,
        from: Option<Coordinate>,
    ) -> Result<Option<ResponseAggregate>, StoreError> {
        let Some(stop) = self.index.find(repository_id, stop_id).await? else {
            return Ok(None);
        };
        let distance_meters = from.map_or(0.0, |c| distance(c, &stop));
        Ok(Some(
            self.assemble(NearbyStop {
                stop,
                distance_meters,
            })
            .await,
        ))
    }

    async fn assemble(&self, candidate: NearbyStop) -> ResponseAggregate {
        let mut aggregate = ResponseAggregate::new(&candidate.stop, candidate.distance_meters);
        for announcement in self.live.fetch_arrivals(&candidate.stop).await {
            aggregate.add(announcement);
        }
        aggregate
    }
}

fn distance(from: Coordinate, stop: &Stop) -> f64 {
    Haversine.distance(from.to_point(), stop.coordinate().to_point())
}
