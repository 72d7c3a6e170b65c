//! # citymap
//!
//! Viewport-driven geodata layers for an interactive city-exploration map.
//!
//! Each layer (restaurants, cafés, parking, historic places, transit, live
//! vehicles, ...) watches the map viewport, decides whether a refetch is
//! worthwhile, pulls records from a third-party API, merges near-duplicates
//! and reconciles the result against the markers already on the map. The map
//! renderer itself stays outside the crate behind the [`MapSurface`] trait.

pub mod background;
pub mod core;
pub mod data;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod sources;
pub use crate::core::constants;

use std::time::Duration;

// Re-export public API
pub use core::{
    config::{ExplorerConfig, LayerConfig, LayerProfile},
    events::{EventBus, MapEvent},
    explorer::Explorer,
    geo::{LatLng, LatLngBounds},
    state::{LayerKind, ToggleStore},
    viewport::Viewport,
};

pub use data::{
    cache::BoundsCache,
    dedup::{DedupPolicy, Deduplicator},
    record::{GeoRecord, RecordId, Source},
};

pub use layers::{
    controller::{FetchState, LayerController, LayerHandle},
    gate::FetchGate,
    manager::LayerManager,
    marker::Marker,
    reconcile::ReconcilePlan,
    surface::{MapSurface, MemorySurface},
};

pub use sources::{DataSource, FetchQuery};

pub use background::vehicles::VehiclePoller;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Feed decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Geolocation unavailable: {0}")]
    Geolocation(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl MapError {
    /// Whether retrying on the next viewport change or poll tick may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            MapError::Network(_) | MapError::Timeout(_) => true,
            MapError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Error type alias for convenience
pub type Error = MapError;
