//! Repository descriptors and the live-arrival descriptor each one carries.
//!
//! The persisted shape is the one administered outside this crate:
//!
//! ```json
//! {
//!   "_id": "tper",
//!   "name": "TPER Bologna",
//!   "isActive": true,
//!   "repositoryUrl": "https://example.org/gtfs.zip",
//!   "lastUpdate": "2024-03-01T04:00:00Z",
//!   "hash": "",
//!   "repo_data": {
//!     "endpoint": "https://example.org/api",
//!     "method": "/arrivals",
//!     "type": "post",
//!     "parameters": [
//!       { "name": "fermata", "type": "stop_id" },
//!       { "name": "formato", "type": "string", "value": "json" }
//!     ]
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A GTFS source plus the REST endpoint that serves its real-time arrivals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub repository_url: String,
    /// `None` when the stored value is absent or cannot be read as a timestamp.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
    /// Digest of the last imported archive; empty before the first import.
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "repo_data")]
    pub live_data: LiveDataDescriptor,
}

impl RepositoryDescriptor {
    /// Applies a completed sync attempt. Digest and timestamp always move together.
    pub fn apply(&mut self, stamp: &SyncStamp) {
        self.hash = stamp.digest.clone();
        self.last_update = Some(stamp.at);
    }
}

/// The pair written at the end of a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStamp {
    pub digest: String,
    pub at: DateTime<Utc>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        // Extended JSON exports wrap dates as {"$date": ...}
        Value::Object(map) => map.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

/// How to call a repository's real-time arrivals endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDataDescriptor {
    pub endpoint: String,
    /// Path suffix appended verbatim to `endpoint`.
    #[serde(default)]
    pub method: String,
    #[serde(rename = "type", default)]
    pub verb: HttpVerb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_key: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    #[serde(default)]
    pub response: ResponseMapping,
}

impl LiveDataDescriptor {
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint, self.method)
    }

    pub fn dev_key(&self) -> Option<&str> {
        self.dev_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Form fields for one stop, in declaration order.
    pub fn form_fields<'a>(&'a self, stop_id: &'a str) -> Vec<(&'a str, &'a str)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.value_for(stop_id)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "get",
            HttpVerb::Post => "post",
            HttpVerb::Put => "put",
            HttpVerb::Patch => "patch",
            HttpVerb::Delete => "delete",
        }
    }

    pub fn method(&self) -> reqwest::Method {
        match self {
            HttpVerb::Get => reqwest::Method::GET,
            HttpVerb::Post => reqwest::Method::POST,
            HttpVerb::Put => reqwest::Method::PUT,
            HttpVerb::Patch => reqwest::Method::PATCH,
            HttpVerb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl TryFrom<String> for HttpVerb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "get" => Ok(HttpVerb::Get),
            "post" => Ok(HttpVerb::Post),
            "put" => Ok(HttpVerb::Put),
            "patch" => Ok(HttpVerb::Patch),
            "delete" => Ok(HttpVerb::Delete),
            other => Err(format!("unsupported http verb '{other}'")),
        }
    }
}

impl From<HttpVerb> for String {
    fn from(verb: HttpVerb) -> Self {
        verb.as_str().to_string()
    }
}

/// The `type` tag that marks a parameter as "fill in the stop identifier".
pub const STOP_ID_KIND: &str = "stop_id";

/// One request parameter of a live-arrival call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParamSpec", into = "RawParamSpec")]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Substituted with the identifier of the stop being queried.
    StopId,
    /// Sent as configured. `kind` is the stored type label, kept for round-trips.
    Literal { kind: String, value: String },
}

impl ParamSpec {
    pub fn stop_id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::StopId,
        }
    }

    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Literal {
                kind: "string".to_string(),
                value: value.into(),
            },
        }
    }

    pub fn value_for<'a>(&'a self, stop_id: &'a str) -> &'a str {
        match &self.kind {
            ParamKind::StopId => stop_id,
            ParamKind::Literal { value, .. } => value,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawParamSpec {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl TryFrom<RawParamSpec> for ParamSpec {
    type Error = String;

    fn try_from(raw: RawParamSpec) -> Result<Self, Self::Error> {
        let kind = if raw.kind == STOP_ID_KIND {
            ParamKind::StopId
        } else {
            let value = raw
                .value
                .ok_or_else(|| format!("parameter '{}' of type '{}' needs a value", raw.name, raw.kind))?;
            ParamKind::Literal {
                kind: raw.kind,
                value,
            }
        };
        Ok(ParamSpec {
            name: raw.name,
            kind,
        })
    }
}

impl From<ParamSpec> for RawParamSpec {
    fn from(spec: ParamSpec) -> Self {
        match spec.kind {
            ParamKind::StopId => RawParamSpec {
                name: spec.name,
                kind: STOP_ID_KIND.to_string(),
                value: None,
            },
            ParamKind::Literal { kind, value } => RawParamSpec {
                name: spec.name,
                kind,
                value: Some(value),
            },
        }
    }
}

/// Field names of a source's arrivals payload:
/// `{ wrapper: { items: [ { line, terminus, announcement }, ... ] } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMapping {
    pub wrapper: String,
    pub items: String,
    pub line: String,
    pub terminus: String,
    pub announcement: String,
}

impl Default for ResponseMapping {
    fn default() -> Self {
        Self {
            wrapper: "response".to_string(),
            items: "arrivals".to_string(),
            line: "line".to_string(),
            terminus: "terminus".to_string(),
            announcement: "announcement".to_string(),
        }
    }
}
