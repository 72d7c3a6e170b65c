//! Configuration for layer fetching and for the explorer as a whole
//!
//! Layers pick a [`LayerProfile`] preset (or a custom [`LayerConfig`]) that
//! tunes the fetch gate, debounce window, query radius and deduplication.
//! [`ExplorerConfig`] covers endpoints and start-up state and can be loaded
//! from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    core::{constants::*, geo::LatLng, state::LayerKind},
    data::dedup::DedupPolicy,
    Error, Result,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LayerProfile {
    /// Many small venues per block: restaurants, cafés
    #[default]
    Dense,
    /// Few points spread over the city: historic places, viewpoints, markets
    Sparse,
    /// Street and lot parking, heavily duplicated across tags
    Parking,
    /// Geocoded news events
    Events,
    /// Geotagged photos
    Imagery,
    Custom(LayerConfig),
}

impl LayerProfile {
    pub fn resolve(&self) -> LayerConfig {
        match self {
            Self::Dense => LayerConfig {
                min_zoom: 13.0,
                move_threshold_m: 1_000.0,
                min_overlap: 0.6,
                debounce: Duration::from_millis(750),
                fetch_radius_m: 2_000.0,
                fetch_timeout: DEFAULT_FETCH_TIMEOUT,
                dedup: Some(DedupPolicy {
                    delta_deg: DEFAULT_DEDUP_DELTA_DEG,
                    match_names: true,
                }),
            },
            Self::Sparse => LayerConfig {
                min_zoom: 11.0,
                move_threshold_m: 3_000.0,
                min_overlap: 0.4,
                debounce: Duration::from_secs(1),
                fetch_radius_m: 5_000.0,
                fetch_timeout: DEFAULT_FETCH_TIMEOUT,
                dedup: Some(DedupPolicy {
                    delta_deg: DEFAULT_DEDUP_DELTA_DEG,
                    match_names: true,
                }),
            },
            Self::Parking => LayerConfig {
                min_zoom: 14.0,
                move_threshold_m: 800.0,
                min_overlap: 0.6,
                debounce: Duration::from_millis(500),
                fetch_radius_m: 1_500.0,
                fetch_timeout: DEFAULT_FETCH_TIMEOUT,
                dedup: Some(DedupPolicy {
                    delta_deg: 0.0002,
                    match_names: false,
                }),
            },
            Self::Events => LayerConfig {
                min_zoom: 10.0,
                move_threshold_m: 5_000.0,
                min_overlap: 0.4,
                debounce: Duration::from_secs(1),
                fetch_radius_m: 10_000.0,
                fetch_timeout: Duration::from_secs(20),
                dedup: None,
            },
            Self::Imagery => LayerConfig {
                min_zoom: 12.0,
                move_threshold_m: DEFAULT_MOVE_THRESHOLD_M,
                min_overlap: DEFAULT_MIN_OVERLAP,
                debounce: DEFAULT_DEBOUNCE,
                fetch_radius_m: DEFAULT_FETCH_RADIUS_M,
                fetch_timeout: Duration::from_secs(15),
                dedup: Some(DedupPolicy {
                    delta_deg: 0.0001,
                    match_names: false,
                }),
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

/// Per-layer fetch policy
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    /// Layers stay idle below this zoom
    pub min_zoom: f64,
    /// Centre movement that triggers a refetch
    pub move_threshold_m: f64,
    /// Refetch when less than this share of the viewport was already fetched
    pub min_overlap: f64,
    pub debounce: Duration,
    /// Radius queried around the viewport centre
    pub fetch_radius_m: f64,
    pub fetch_timeout: Duration,
    /// `None` disables deduplication for the layer
    pub dedup: Option<DedupPolicy>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            move_threshold_m: DEFAULT_MOVE_THRESHOLD_M,
            min_overlap: DEFAULT_MIN_OVERLAP,
            debounce: DEFAULT_DEBOUNCE,
            fetch_radius_m: DEFAULT_FETCH_RADIUS_M,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            dedup: Some(DedupPolicy::default()),
        }
    }
}

/// One GTFS-Realtime vehicle positions feed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

/// Explorer-wide settings, loadable from JSON.
///
/// Provider API keys never appear here; keyed providers are reached through
/// backend proxies that hold the keys server side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub initial_center: LatLng,
    pub initial_zoom: f64,
    /// Screen size used to derive the initial viewport
    pub screen_px: (f64, f64),
    pub overpass_url: String,
    pub places_proxy_url: Option<String>,
    pub news_events_url: Option<String>,
    pub imagery_proxy_url: Option<String>,
    pub vehicle_feeds: Vec<FeedConfig>,
    pub poll_interval_secs: u64,
    pub feed_timeout_secs: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub enabled_layers: Vec<LayerKind>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            initial_center: LatLng::new(DEFAULT_CENTER.0, DEFAULT_CENTER.1),
            initial_zoom: DEFAULT_ZOOM,
            screen_px: (1200.0, 800.0),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            places_proxy_url: None,
            news_events_url: None,
            imagery_proxy_url: None,
            vehicle_feeds: Vec::new(),
            poll_interval_secs: VEHICLE_POLL_INTERVAL.as_secs(),
            feed_timeout_secs: VEHICLE_FEED_TIMEOUT.as_secs(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            enabled_layers: vec![LayerKind::Restaurants, LayerKind::Transit],
        }
    }
}

impl ExplorerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_center.is_valid() {
            return Err(Error::Config(format!(
                "initial_center out of range: {:?}",
                self.initial_center
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_resolve() {
        let dense = LayerProfile::Dense.resolve();
        let parking = LayerProfile::Parking.resolve();

        assert!(parking.min_zoom > dense.min_zoom);
        assert!(!parking.dedup.as_ref().map(|d| d.match_names).unwrap_or(true));
        assert!(LayerProfile::Events.resolve().dedup.is_none());

        let custom = LayerConfig {
            min_zoom: 9.0,
            ..LayerConfig::default()
        };
        assert_eq!(LayerProfile::Custom(custom.clone()).resolve(), custom);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = ExplorerConfig::from_json_str(
            r#"{
                "initial_zoom": 14,
                "vehicle_feeds": [{"name": "metro", "url": "http://localhost/vp.pb"}],
                "enabled_layers": ["cafes", "parking", "vehicles"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.initial_zoom, 14.0);
        assert_eq!(config.vehicle_feeds.len(), 1);
        assert_eq!(config.enabled_layers.len(), 3);
        assert_eq!(config.poll_interval(), VEHICLE_POLL_INTERVAL);
    }

    #[test]
    fn test_config_rejects_bad_center() {
        let err = ExplorerConfig::from_json_str(
            r#"{"initial_center": {"lat": 123.0, "lng": 0.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
