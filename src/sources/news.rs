//! Geotagged news events from a GDELT GEO style GeoJSON endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    core::{constants::DEFAULT_FETCH_TIMEOUT, geo::LatLng},
    data::record::{GeoRecord, Source},
    sources::{http, DataSource, FetchQuery},
    Error, Result,
};

/// Rolling window of coverage asked for, in minutes
const DEFAULT_TIMESPAN_MIN: u32 = 24 * 60;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

impl Geometry {
    /// `[lng, lat]` of a Point geometry
    fn point(&self) -> Option<LatLng> {
        if self.kind != "Point" {
            return None;
        }
        let coords = self.coordinates.as_array()?;
        let lng = coords.first()?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        Some(LatLng::new(lat, lng))
    }
}

/// Native id for a feature: its url if any, otherwise its rounded position
fn native_id(properties: &Map<String, Value>, position: LatLng) -> String {
    match properties.get("url").and_then(Value::as_str) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => format!("{:.5},{:.5}", position.lat, position.lng),
    }
}

/// Normalizes point features; other geometries are skipped.
///
/// GeoJSON orders coordinates `[lng, lat]`.
pub fn parse_features(payload: &Value) -> Result<Vec<GeoRecord>> {
    let collection = FeatureCollection::deserialize(payload)
        .map_err(|e| Error::Malformed(format!("news events: {}", e)))?;
    if collection.kind != "FeatureCollection" {
        return Err(Error::Malformed(format!(
            "news events: expected FeatureCollection, got {}",
            collection.kind
        )));
    }

    let mut records = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let Some(position) = feature.geometry.as_ref().and_then(Geometry::point) else {
            continue;
        };
        if !position.is_valid() {
            continue;
        }

        let props = feature.properties;
        let mut record = GeoRecord::new(Source::Gdelt, native_id(&props, position), position);
        if let Some(name) = props.get("name").and_then(Value::as_str) {
            record = record.with_name(name);
        }
        for key in ["url", "date", "html", "shareimage"] {
            if let Some(value) = props.get(key).and_then(Value::as_str) {
                record = record.with_property(key, value);
            }
        }
        if let Some(count) = props.get("count").and_then(Value::as_u64) {
            record = record.with_property("count", count);
        }
        records.push(record);
    }
    Ok(records)
}

pub struct NewsEventsSource {
    endpoint: String,
    topic: String,
    timespan_min: u32,
    timeout: Duration,
}

impl NewsEventsSource {
    pub fn new(endpoint: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            topic: topic.into(),
            timespan_min: DEFAULT_TIMESPAN_MIN,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timespan(mut self, minutes: u32) -> Self {
        self.timespan_min = minutes.max(15);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DataSource for NewsEventsSource {
    fn source(&self) -> Source {
        Source::Gdelt
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let radius_km = (query.radius_m / 1000.0).ceil().max(1.0);
        let params = [
            (
                "query",
                format!(
                    "{} near:{:.4},{:.4},{:.0}km",
                    self.topic, query.center.lat, query.center.lng, radius_km
                ),
            ),
            ("mode", "PointData".to_string()),
            ("format", "GeoJSON".to_string()),
            ("timespan", format!("{}min", self.timespan_min)),
        ];
        let payload: Value = http::get_json(&self.endpoint, &params, self.timeout).await?;
        let records = parse_features(&payload)?;

        // the API's proximity filter is loose
        Ok(records
            .into_iter()
            .filter(|r| query.bounds.contains(&r.position))
            .collect())
    }
}
