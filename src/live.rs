//! Real-time arrivals from a repository's REST endpoint.
//!
//! Each stop carries the [`LiveDataDescriptor`] of its repository. The request
//! is built from that descriptor alone: `verb` against `endpoint + method`, a
//! form-urlencoded body with one pair per parameter (in declaration order),
//! and the optional `dev_key` as a query parameter.

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fetch::HttpClient;
use crate::fetch::auth::UrlParam;
use crate::model::{ArrivalAnnouncement, LiveDataDescriptor, ResponseMapping, Stop};

/// Query parameter carrying a descriptor's developer key.
pub const DEV_KEY_PARAM: &str = "dev_key";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Error)]
enum LiveError {
    #[error("invalid endpoint '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(reqwest::StatusCode),
}

pub struct LiveArrivalClient<C> {
    http: C,
}

impl<C: HttpClient> LiveArrivalClient<C> {
    pub fn new(http: C) -> Self {
        Self { http }
    }

    /// Announcements for `stop`. Any failure yields an empty list.
    #[tracing::instrument(
        skip(self, stop),
        fields(repository_id = %stop.reference_id, stop_id = %stop.stop_id)
    )]
    pub async fn fetch_arrivals(&self, stop: &Stop) -> Vec<ArrivalAnnouncement> {
        match self.request_arrivals(stop).await {
            Ok(arrivals) => {
                debug!(arrivals = arrivals.len(), "Live arrivals received");
                arrivals
            }
            Err(e) => {
                warn!(error = %e, "Live arrivals unavailable");
                Vec::new()
            }
        }
    }

    async fn request_arrivals(&self, stop: &Stop) -> Result<Vec<ArrivalAnnouncement>, LiveError> {
        let live = &stop.live_data;
        let req = build_request(live, &stop.stop_id)?;

        let resp = match live.dev_key() {
            Some(key) => {
                let client = UrlParam {
                    inner: &self.http,
                    param_name: DEV_KEY_PARAM,
                    key,
                };
                client.execute(req).await?
            }
            None => self.http.execute(req).await?,
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(LiveError::Status(status));
        }

        let body: Value = resp.json().await?;
        Ok(parse_arrivals(&body, &live.response))
    }
}

fn build_request(live: &LiveDataDescriptor, stop_id: &str) -> Result<reqwest::Request, LiveError> {
    let url = live.url();
    let url = url.parse().map_err(|_| LiveError::InvalidUrl(url))?;
    let mut req = reqwest::Request::new(live.verb.method(), url);

    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(live.form_fields(stop_id))
        .finish();

    let headers = req.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(body.into());

    Ok(req)
}

/// Extracts announcements from `{wrapper: {items: [...]}}`.
///
/// Items missing any of line, terminus or announcement are dropped. A single
/// object in place of the items array is read as a one-element list.
pub fn parse_arrivals(body: &Value, mapping: &ResponseMapping) -> Vec<ArrivalAnnouncement> {
    let items = match body
        .get(mapping.wrapper.as_str())
        .and_then(|w| w.get(mapping.items.as_str()))
    {
        Some(Value::Array(items)) => items.as_slice(),
        Some(item @ Value::Object(_)) => std::slice::from_ref(item),
        _ => {
            debug!("Live response has no arrivals list");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            Some(ArrivalAnnouncement {
                line: text(item.get(mapping.line.as_str())?)?,
                terminus: text(item.get(mapping.terminus.as_str())?)?,
                announcement: text(item.get(mapping.announcement.as_str())?)?,
            })
        })
        .collect()
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
