//! Engine-wide defaults for layer fetching, deduplication and live vehicles.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

use std::time::Duration;

/// Map centre used when geolocation is unavailable (downtown Seattle).
pub const DEFAULT_CENTER: (f64, f64) = (47.6062, -122.3321);

/// Zoom the explorer opens at.
pub const DEFAULT_ZOOM: f64 = 13.0;

/// Quiet period after the last pan/zoom before a layer refetches.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

/// Below this zoom city-scale queries return too much to be useful.
pub const DEFAULT_MIN_ZOOM: f64 = 12.0;

/// Centre movement (metres) that justifies a new fetch.
pub const DEFAULT_MOVE_THRESHOLD_M: f64 = 2_000.0;

/// Minimum share of the new viewport already covered by the last fetch.
pub const DEFAULT_MIN_OVERLAP: f64 = 0.5;

/// Radius queried around the viewport centre.
pub const DEFAULT_FETCH_RADIUS_M: f64 = 3_000.0;

/// Per-request timeout for layer fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Proximity delta for treating two records as the same place (~30 m).
pub const DEFAULT_DEDUP_DELTA_DEG: f64 = 0.0003;

/// Live vehicle feeds are polled on this fixed interval.
pub const VEHICLE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Abort a single vehicle feed request after this long.
pub const VEHICLE_FEED_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of bounding boxes kept per layer cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Cached bounding boxes older than this are refetched.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Transit lines are not drawn below this zoom.
pub const TRANSIT_MIN_ZOOM: f64 = 10.0;

/// User agent sent to public APIs (Overpass rejects anonymous clients).
pub const USER_AGENT: &str = "citymap/0.1 (+https://github.com/PoHsuanLai/citymap)";
