//! Prelude module for common citymap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use citymap::prelude::*;`

pub use crate::core::{
    config::{ExplorerConfig, FeedConfig, LayerConfig, LayerProfile},
    events::{City, EventBus, MapEvent, Subscription},
    explorer::Explorer,
    geo::{LatLng, LatLngBounds},
    location::{FixedLocator, Geolocator},
    state::{LayerKind, ToggleStore},
    viewport::Viewport,
};

pub use crate::data::{
    cache::BoundsCache,
    record::{GeoRecord, RecordId, Source},
};

pub use crate::layers::{
    controller::{LayerContext, LayerController, LayerHandle, RefreshOutcome},
    manager::LayerManager,
    marker::{Marker, Polyline},
    surface::{MapSurface, MemorySurface},
};

pub use crate::sources::{DataSource, FetchQuery};

pub use crate::background::vehicles::VehiclePoller;

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
