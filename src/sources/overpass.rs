//! OpenStreetMap points of interest through the Overpass API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    core::{constants::DEFAULT_FETCH_TIMEOUT, geo::LatLng, state::LayerKind},
    data::record::{GeoRecord, Source},
    sources::{http, DataSource, FetchQuery},
    Error, Result,
};

/// Server-side query timeout, in seconds
const QUERY_TIMEOUT_SECS: u32 = 25;

/// A single `[key=value]` or `[key]` filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: Option<String>,
}

impl TagFilter {
    pub fn is(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn has(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
        }
    }

    fn to_ql(&self) -> String {
        match &self.value {
            Some(value) => format!("[\"{}\"=\"{}\"]", escape(&self.key), escape(value)),
            None => format!("[\"{}\"]", escape(&self.key)),
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builds an Overpass QL union of `nwr` statements around a point
#[derive(Debug, Clone, PartialEq)]
pub struct OverpassQuery {
    /// Each entry is one statement; filters inside an entry are ANDed
    statements: Vec<Vec<TagFilter>>,
}

impl OverpassQuery {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
        }
    }

    pub fn any_of(mut self, filters: Vec<TagFilter>) -> Self {
        self.statements.push(filters);
        self
    }

    /// Tag filters for the OSM-backed layers
    pub fn for_layer(layer: LayerKind) -> Option<Self> {
        let query = match layer {
            LayerKind::Restaurants => Self::new()
                .any_of(vec![TagFilter::is("amenity", "restaurant")])
                .any_of(vec![TagFilter::is("amenity", "fast_food"), TagFilter::has("name")]),
            LayerKind::Cafes => Self::new().any_of(vec![TagFilter::is("amenity", "cafe")]),
            LayerKind::Parking => Self::new()
                .any_of(vec![TagFilter::is("amenity", "parking")])
                .any_of(vec![TagFilter::is("amenity", "parking_space")])
                .any_of(vec![TagFilter::has("parking:lane:both")]),
            LayerKind::Historic => Self::new()
                .any_of(vec![TagFilter::has("historic"), TagFilter::has("name")])
                .any_of(vec![TagFilter::has("heritage")]),
            LayerKind::Viewpoints => Self::new().any_of(vec![TagFilter::is("tourism", "viewpoint")]),
            LayerKind::FarmersMarkets => Self::new()
                .any_of(vec![TagFilter::is("amenity", "marketplace")])
                .any_of(vec![TagFilter::is("shop", "farm")]),
            _ => return None,
        };
        Some(query)
    }

    pub fn to_ql(&self, center: LatLng, radius_m: f64) -> String {
        let around = format!(
            "(around:{:.0},{:.6},{:.6})",
            radius_m, center.lat, center.lng
        );
        let body: String = self
            .statements
            .iter()
            .map(|filters| {
                let tags: String = filters.iter().map(TagFilter::to_ql).collect();
                format!("  nwr{}{};\n", tags, around)
            })
            .collect();
        format!(
            "[out:json][timeout:{}];\n(\n{});\nout center tags;",
            QUERY_TIMEOUT_SECS, body
        )
    }
}

impl Default for OverpassQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
    /// Set when the server gave up (timeout, out of memory)
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

/// Normalizes an Overpass JSON payload.
///
/// Nodes use their own coordinates, ways and relations their `center`.
/// Elements without a usable position are skipped.
pub fn parse_elements(payload: &Value) -> Result<Vec<GeoRecord>> {
    let response = OverpassResponse::deserialize(payload)
        .map_err(|e| Error::Malformed(format!("overpass: {}", e)))?;

    if let Some(remark) = &response.remark {
        if response.elements.is_empty() {
            return Err(Error::Malformed(format!("overpass remark: {}", remark)));
        }
        log::warn!("overpass returned partial result: {}", remark);
    }

    let records = response
        .elements
        .into_iter()
        .filter_map(|element| {
            let position = match (element.lat, element.lon, &element.center) {
                (Some(lat), Some(lon), _) => LatLng::new(lat, lon),
                (_, _, Some(center)) => LatLng::new(center.lat, center.lon),
                _ => return None,
            };
            if !position.is_valid() {
                return None;
            }
            Some(to_record(element.kind, element.id, position, element.tags))
        })
        .collect();
    Ok(records)
}

fn to_record(
    kind: String,
    id: u64,
    position: LatLng,
    mut tags: BTreeMap<String, String>,
) -> GeoRecord {
    let mut record = GeoRecord::new(Source::Osm, format!("{}/{}", kind, id), position);
    if let Some(name) = tags.remove("name") {
        record = record.with_name(name);
    }

    let street = tags.get("addr:street").cloned();
    let number = tags.get("addr:housenumber").cloned();
    if let Some(street) = street {
        let address = match number {
            Some(number) => format!("{} {}", number, street),
            None => street,
        };
        record = record.with_property("address", address);
    }

    for (key, value) in tags {
        if !key.starts_with("addr:") {
            record.properties.insert(key, Value::String(value));
        }
    }
    record
}

pub struct OverpassSource {
    endpoint: String,
    query: OverpassQuery,
    timeout: Duration,
}

impl OverpassSource {
    pub fn new(endpoint: impl Into<String>, query: OverpassQuery) -> Self {
        Self {
            endpoint: endpoint.into(),
            query,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn for_layer(endpoint: impl Into<String>, layer: LayerKind) -> Option<Self> {
        OverpassQuery::for_layer(layer).map(|query| Self::new(endpoint, query))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DataSource for OverpassSource {
    fn source(&self) -> Source {
        Source::Osm
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let ql = self.query.to_ql(query.center, query.radius_m);
        log::debug!("overpass query around {:?} r={:.0}m", query.center, query.radius_m);
        let payload: Value = http::post_form(&self.endpoint, &[("data", ql.as_str())], self.timeout).await?;
        parse_elements(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_union_query() {
        let ql = OverpassQuery::for_layer(LayerKind::Cafes)
            .unwrap()
            .to_ql(LatLng::new(47.6062, -122.3321), 2000.0);

        assert!(ql.starts_with("[out:json][timeout:25];"));
        assert!(ql.contains("nwr[\"amenity\"=\"cafe\"](around:2000,47.606200,-122.332100);"));
        assert!(ql.ends_with("out center tags;"));
        assert!(OverpassQuery::for_layer(LayerKind::Vehicles).is_none());
    }

    #[test]
    fn parses_nodes_and_ways() {
        let payload = json!({
            "elements": [
                {"type": "node", "id": 1, "lat": 47.61, "lon": -122.33,
                 "tags": {"name": "Joe's Cafe", "amenity": "cafe",
                          "addr:street": "Pine St", "addr:housenumber": "123"}},
                {"type": "way", "id": 2, "center": {"lat": 47.62, "lon": -122.34},
                 "tags": {"amenity": "parking", "capacity": "40", "fee": "yes"}},
                {"type": "relation", "id": 3, "tags": {"amenity": "parking"}}
            ]
        });

        let records = parse_elements(&payload).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "osm:node/1");
        assert_eq!(records[0].name.as_deref(), Some("Joe's Cafe"));
        assert_eq!(records[0].property_str("address"), Some("123 Pine St"));
        assert!(records[0].properties.get("addr:street").is_none());
        assert_eq!(records[1].id.as_str(), "osm:way/2");
        assert_eq!(records[1].property_str("capacity"), Some("40"));
        assert_eq!(records[1].position, LatLng::new(47.62, -122.34));
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(matches!(
            parse_elements(&json!({"error": "nope"})),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            parse_elements(&json!({"elements": [], "remark": "runtime error: timeout"})),
            Err(Error::Malformed(_))
        ));
    }
}
