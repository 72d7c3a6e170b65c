use serde::{Deserialize, Serialize};

/// Mean Earth radius used for haversine distances, in metres
const EARTH_RADIUS: f64 = 6_371_008.8;
const MAX_LATITUDE: f64 = 85.0511287798;
/// Metres per degree of latitude (close enough everywhere for bbox math)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are finite and within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Calculates the distance to another LatLng in metres (haversine)
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Square bounds of `radius_m` around `center`.
    ///
    /// The longitude half-span is widened by `1 / cos(lat)` so the box stays
    /// roughly square on the ground.
    pub fn around(center: LatLng, radius_m: f64) -> Self {
        let d_lat = radius_m / METERS_PER_DEGREE;
        let cos_lat = center.lat.to_radians().cos().max(0.01);
        let d_lng = radius_m / (METERS_PER_DEGREE * cos_lat);
        Self::from_coords(
            LatLng::clamp_lat(center.lat - d_lat),
            center.lng - d_lng,
            LatLng::clamp_lat(center.lat + d_lat),
            center.lng + d_lng,
        )
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    /// Checks that south <= north and west <= east
    pub fn is_valid(&self) -> bool {
        self.south_west.is_valid()
            && self.north_east.is_valid()
            && self.south() <= self.north()
            && self.west() <= self.east()
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }

    /// Gets the intersection of two bounds
    pub fn intersection(&self, other: &LatLngBounds) -> Option<LatLngBounds> {
        if !self.intersects(other) {
            return None;
        }

        Some(LatLngBounds::from_coords(
            self.south().max(other.south()),
            self.west().max(other.west()),
            self.north().min(other.north()),
            self.east().min(other.east()),
        ))
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    /// Smallest bounds covering every point, `None` for an empty slice
    pub fn from_points(points: &[LatLng]) -> Option<LatLngBounds> {
        let (first, rest) = points.split_first()?;
        let mut bounds = LatLngBounds::new(*first, *first);
        for point in rest {
            bounds.extend(point);
        }
        Some(bounds)
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    /// Gets the span of the bounds
    pub fn span(&self) -> LatLng {
        LatLng::new(
            self.north_east.lat - self.south_west.lat,
            self.north_east.lng - self.south_west.lng,
        )
    }

    /// Area in square degrees, zero for inverted bounds
    pub fn area(&self) -> f64 {
        let span = self.span();
        if span.lat <= 0.0 || span.lng <= 0.0 {
            0.0
        } else {
            span.lat * span.lng
        }
    }

    /// Share of this box covered by `other`, in `[0, 1]`
    pub fn overlap_ratio(&self, other: &LatLngBounds) -> f64 {
        let own = self.area();
        if own == 0.0 {
            return 0.0;
        }
        self.intersection(other)
            .map(|shared| (shared.area() / own).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Returns the union of this bounds with another bounds
    pub fn union(&self, other: &LatLngBounds) -> LatLngBounds {
        let south = self.south_west.lat.min(other.south_west.lat);
        let west = self.south_west.lng.min(other.south_west.lng);
        let north = self.north_east.lat.max(other.north_east.lat);
        let east = self.north_east.lng.max(other.north_east.lng);

        LatLngBounds::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Stable cache key; nearby boxes that round the same share an entry
    pub fn cache_key(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.south(),
            self.west(),
            self.north(),
            self.east()
        )
    }
}
