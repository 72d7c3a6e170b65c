use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::geo::LatLng;

/// Upstream API a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Google,
    Osm,
    Gdelt,
    Mapillary,
    Gtfs,
    Catalog,
}

impl Source {
    /// Richer commercial metadata outranks crowd-sourced data
    pub fn priority(&self) -> u8 {
        match self {
            Source::Google => 3,
            Source::Mapillary | Source::Gdelt => 2,
            Source::Osm => 1,
            Source::Gtfs | Source::Catalog => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Google => "google",
            Source::Osm => "osm",
            Source::Gdelt => "gdelt",
            Source::Mapillary => "mapillary",
            Source::Gtfs => "gtfs",
            Source::Catalog => "catalog",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-qualified record identifier, e.g. `osm:node/123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(source: Source, native_id: impl std::fmt::Display) -> Self {
        Self(format!("{}:{}", source.as_str(), native_id))
    }

    /// Wraps an already-qualified id
    pub fn from_qualified(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names that carry no information about which place this is
const GENERIC_NAMES: &[&str] = &["cafe", "coffee", "restaurant", "parking", "unnamed"];

/// One normalized point of interest, whatever API produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub id: RecordId,
    pub position: LatLng,
    pub source: Source,
    pub name: Option<String>,
    pub rating: Option<f32>,
    /// Layer-specific descriptive fields (fee, capacity, maxstay, url, ...)
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GeoRecord {
    pub fn new(source: Source, native_id: impl std::fmt::Display, position: LatLng) -> Self {
        Self {
            id: RecordId::new(source, native_id),
            position,
            source,
            name: None,
            rating: None,
            properties: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        self.name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    fn has_property(&self, key: &str) -> bool {
        match self.properties.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// Whether the record carries a real name rather than a category word
    pub fn has_meaningful_name(&self) -> bool {
        match &self.name {
            Some(name) => {
                let lowered = name.to_lowercase();
                !GENERIC_NAMES.contains(&lowered.as_str())
            }
            None => false,
        }
    }

    /// Points for optional metadata; used to pick the best duplicate
    pub fn completeness_score(&self) -> u32 {
        let mut score = 0;
        if self.has_meaningful_name() {
            score += 2;
        }
        if self.rating.map(|r| r > 0.0).unwrap_or(false) {
            score += 1;
        }
        for key in ["capacity", "maxstay", "surface", "fee", "opening_hours"] {
            if self.has_property(key) {
                score += 1;
            }
        }
        score
    }
}
