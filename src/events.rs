//! Boundary with the conversational front-end: inbound events and outbound messages.
//!
//! Events arrive as JSON, one per line:
//!
//! ```json
//! {"location": {"coordinate": {"latitude": 44.4938, "longitude": 11.3426}}}
//! {"retry": {"repository": "tper", "stop_id": "S42"}}
//! ```

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::fetch::HttpClient;
use crate::model::{Coordinate, ResponseAggregate};
use crate::nearby::NearbyQueryEngine;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundEvent {
    /// The user shared a position.
    Location { coordinate: Coordinate },
    /// The user asked to refresh one stop of an earlier answer.
    Retry { repository: String, stop_id: String },
}

impl InboundEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// One rendered stop, with the key the front-end needs to offer a retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub repository: String,
    pub stop_id: String,
    pub distance_meters: f64,
    pub text: String,
}

impl From<&ResponseAggregate> for OutboundMessage {
    fn from(aggregate: &ResponseAggregate) -> Self {
        Self {
            repository: aggregate.reference_id.clone(),
            stop_id: aggregate.stop_id.clone(),
            distance_meters: aggregate.distance_meters,
            text: aggregate.render(),
        }
    }
}

/// Answers one event, handing each message to `deliver` as soon as it is ready.
///
/// Returns the number of messages delivered.
pub async fn handle_event<C, F>(
    engine: &NearbyQueryEngine<C>,
    event: InboundEvent,
    radius_meters: f64,
    mut deliver: F,
) -> Result<usize, StoreError>
where
    C: HttpClient,
    F: FnMut(OutboundMessage),
{
    match event {
        InboundEvent::Location { coordinate } => {
            if !coordinate.is_valid() {
                warn!(?coordinate, "Ignoring location outside WGS84 bounds");
                return Ok(0);
            }
            let mut delivered = 0;
            let mut aggregates = engine.find_nearby(coordinate, radius_meters).await?;
            while let Some(aggregate) = aggregates.next().await {
                deliver(OutboundMessage::from(&aggregate));
                delivered += 1;
            }
            Ok(delivered)
        }
        InboundEvent::Retry {
            repository,
            stop_id,
        } => match engine.refresh_stop(&repository, &stop_id, None).await? {
            Some(aggregate) => {
                deliver(OutboundMessage::from(&aggregate));
                Ok(1)
            }
            None => {
                warn!(%repository, %stop_id, "Retry for a stop that is no longer indexed");
                Ok(0)
            }
        },
    }
}
