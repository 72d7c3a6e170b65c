//! Google Places results, fetched through a backend proxy that holds the key.
//!
//! The proxy takes `{lat, lng, radius, type}` and answers either
//! `{"places": [...]}` with Places Nearby Search results or `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    core::{constants::DEFAULT_FETCH_TIMEOUT, geo::LatLng, state::LayerKind},
    data::record::{GeoRecord, Source},
    sources::{http, DataSource, FetchQuery},
    Error, Result,
};

/// Google caps Nearby Search radius at 50 km
const MAX_RADIUS_M: f64 = 50_000.0;

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    lat: f64,
    lng: f64,
    radius: u32,
    #[serde(rename = "type")]
    place_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    places: Option<Vec<PlaceResult>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    place_id: Option<String>,
    name: Option<String>,
    geometry: Option<PlaceGeometry>,
    rating: Option<f32>,
    user_ratings_total: Option<u32>,
    price_level: Option<u8>,
    vicinity: Option<String>,
    business_status: Option<String>,
    opening_hours: Option<PlaceHours>,
}

#[derive(Debug, Deserialize)]
struct PlaceGeometry {
    location: Option<PlaceLocation>,
}

#[derive(Debug, Deserialize)]
struct PlaceLocation {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlaceHours {
    open_now: Option<bool>,
}

/// Normalizes a proxy payload; an `error` field becomes [`Error::Proxy`]
pub fn parse_places(payload: &Value) -> Result<Vec<GeoRecord>> {
    let response = ProxyResponse::deserialize(payload)
        .map_err(|e| Error::Malformed(format!("places: {}", e)))?;

    if let Some(error) = response.error {
        return Err(Error::Proxy(error));
    }
    let places = response
        .places
        .ok_or_else(|| Error::Malformed("places: missing `places`".into()))?;

    let records = places
        .into_iter()
        .filter(|place| place.business_status.as_deref() != Some("CLOSED_PERMANENTLY"))
        .filter_map(|place| {
            let place_id = place.place_id.filter(|id| !id.is_empty())?;
            let location = place.geometry?.location?;
            let position = LatLng::new(location.lat?, location.lng?);
            if !position.is_valid() {
                return None;
            }
            let mut record = GeoRecord::new(Source::Google, place_id, position);
            if let Some(name) = place.name {
                record = record.with_name(name);
            }
            if let Some(rating) = place.rating {
                record = record.with_rating(rating);
            }
            if let Some(total) = place.user_ratings_total {
                record = record.with_property("user_ratings_total", total);
            }
            if let Some(level) = place.price_level {
                record = record.with_property("price_level", level);
            }
            if let Some(vicinity) = place.vicinity {
                record = record.with_property("address", vicinity);
            }
            if let Some(open_now) = place.opening_hours.and_then(|h| h.open_now) {
                record = record.with_property("open_now", open_now);
            }
            Some(record)
        })
        .collect();
    Ok(records)
}

pub struct PlacesSource {
    proxy_url: String,
    place_type: String,
    timeout: Duration,
}

impl PlacesSource {
    pub fn new(proxy_url: impl Into<String>, place_type: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            place_type: place_type.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Places type for the layers Google covers
    pub fn for_layer(proxy_url: impl Into<String>, layer: LayerKind) -> Option<Self> {
        let place_type = match layer {
            LayerKind::Restaurants => "restaurant",
            LayerKind::Cafes => "cafe",
            LayerKind::Parking => "parking",
            _ => return None,
        };
        Some(Self::new(proxy_url, place_type))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DataSource for PlacesSource {
    fn source(&self) -> Source {
        Source::Google
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let request = ProxyRequest {
            lat: query.center.lat,
            lng: query.center.lng,
            radius: query.radius_m.clamp(1.0, MAX_RADIUS_M).round() as u32,
            place_type: &self.place_type,
        };
        let payload: Value = http::post_json(&self.proxy_url, &request, self.timeout).await?;
        parse_places(&payload)
    }
}
