//! Street-level photos through the imagery proxy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    core::{constants::DEFAULT_FETCH_TIMEOUT, geo::LatLng},
    data::record::{GeoRecord, Source},
    sources::{http, DataSource, FetchQuery},
    Error, Result,
};

/// Most photos the proxy is asked for per viewport
const DEFAULT_LIMIT: u32 = 200;

#[derive(Debug, Serialize)]
struct ImageryRequest {
    /// `west,south,east,north`
    bbox: String,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct ImageryResponse {
    images: Option<Vec<ImageItem>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    id: Value,
    lat: Option<f64>,
    lng: Option<f64>,
    thumb_url: Option<String>,
    captured_at: Option<Value>,
    title: Option<String>,
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_images(payload: &Value) -> Result<Vec<GeoRecord>> {
    let response = ImageryResponse::deserialize(payload)
        .map_err(|e| Error::Malformed(format!("imagery: {}", e)))?;
    if let Some(error) = response.error {
        return Err(Error::Proxy(error));
    }
    let images = response
        .images
        .ok_or_else(|| Error::Malformed("imagery: missing `images`".into()))?;

    let records = images
        .into_iter()
        .filter_map(|image| {
            let id = id_string(&image.id)?;
            let position = LatLng::new(image.lat?, image.lng?);
            if !position.is_valid() {
                return None;
            }
            let mut record = GeoRecord::new(Source::Mapillary, id, position);
            if let Some(title) = image.title {
                record = record.with_name(title);
            }
            if let Some(url) = image.thumb_url {
                record = record.with_property("thumb_url", url);
            }
            // epoch millis or an ISO string, kept as given
            if let Some(captured) = image.captured_at {
                record = record.with_property("captured_at", captured);
            }
            Some(record)
        })
        .collect();
    Ok(records)
}

pub struct ImagerySource {
    proxy_url: String,
    limit: u32,
    timeout: Duration,
}

impl ImagerySource {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            limit: DEFAULT_LIMIT,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DataSource for ImagerySource {
    fn source(&self) -> Source {
        Source::Mapillary
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let b = &query.bounds;
        let request = ImageryRequest {
            bbox: format!(
                "{:.6},{:.6},{:.6},{:.6}",
                b.west(),
                b.south(),
                b.east(),
                b.north()
            ),
            limit: self.limit,
        };
        let payload: Value = http::post_json(&self.proxy_url, &request, self.timeout).await?;
        parse_images(&payload)
    }
}
