#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gtfs_nearby::fetch::HttpClient;
use gtfs_nearby::model::{
    Coordinate, GeoPoint, HttpVerb, LiveDataDescriptor, ParamSpec, RepositoryDescriptor,
    ResponseMapping, Stop,
};
use zip::write::SimpleFileOptions;

/// Meters per degree of latitude on the haversine sphere.
pub const METERS_PER_DEGREE: f64 = 6_371_008.8 * std::f64::consts::PI / 180.0;

#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn zip(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/zip".to_string(),
            body,
            delay: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: value.to_string().into_bytes(),
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
            delay: None,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Routes requests by `url` or, more specifically, by `url|form-body`.
/// Unrouted requests get a 404.
#[derive(Default)]
pub struct MockHttp {
    routes: Mutex<HashMap<String, Reply>>,
    hits: Mutex<Vec<String>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, key: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(key.to_string(), reply);
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, url: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.starts_with(url))
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let url = req.url().to_string();
        let body = req
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let with_body = format!("{url}|{body}");
        self.hits.lock().unwrap().push(with_body.clone());

        let reply = {
            let routes = self.routes.lock().unwrap();
            routes
                .get(&with_body)
                .or_else(|| routes.get(&url))
                .cloned()
                .unwrap_or_else(|| Reply::status(404))
        };
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        let resp = http::Response::builder()
            .status(reply.status)
            .header("content-type", reply.content_type)
            .body(reply.body)
            .unwrap();
        Ok(reqwest::Response::from(resp))
    }
}

pub fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A stops table with `count` valid rows named `{prefix}{i}`.
pub fn stops_table(prefix: &str, count: usize) -> Vec<u8> {
    let mut table = String::from("stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon\n");
    for i in 0..count {
        table.push_str(&format!(
            "{prefix}{i},{i:03},Stop {prefix}{i},Platform {i},{:.6},{:.6}\n",
            44.49 + i as f64 * 0.001,
            11.34
        ));
    }
    table.into_bytes()
}

/// A GTFS archive around a stops table, with the usual neighbours.
pub fn gtfs_archive(table: &[u8]) -> Vec<u8> {
    archive(&[
        ("agency.txt", b"agency_id,agency_name\n1,Test Transit\n"),
        ("stops.txt", table),
        ("routes.txt", b"route_id,route_short_name\n11,11\n"),
    ])
}

pub const LIVE_URL: &str = "https://live.test/api/arrivals";

pub fn live_data() -> LiveDataDescriptor {
    LiveDataDescriptor {
        endpoint: "https://live.test/api".to_string(),
        method: "/arrivals".to_string(),
        verb: HttpVerb::Post,
        dev_key: None,
        parameters: vec![ParamSpec::stop_id("stop"), ParamSpec::literal("format", "json")],
        response: ResponseMapping::default(),
    }
}

pub fn repository(id: &str, url: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        id: id.to_string(),
        name: format!("Repository {id}"),
        is_active: true,
        repository_url: url.to_string(),
        last_update: None,
        hash: String::new(),
        live_data: live_data(),
    }
}

pub fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
    Coordinate::new(origin.latitude + meters / METERS_PER_DEGREE, origin.longitude)
}

pub fn stop_at(reference_id: &str, stop_id: &str, coordinate: Coordinate) -> Stop {
    Stop {
        reference_id: reference_id.to_string(),
        stop_id: stop_id.to_string(),
        stop_code: None,
        stop_name: format!("Stop {stop_id}"),
        stop_desc: None,
        location: GeoPoint::new(coordinate),
        zone: None,
        stop_url: None,
        location_type: None,
        parent_station: None,
        live_data: live_data(),
    }
}

/// The mock key for a live call about `stop_id` against [`live_data`].
pub fn live_key(stop_id: &str) -> String {
    format!("{LIVE_URL}|stop={stop_id}&format=json")
}
