use crate::core::geo::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};

const MIN_ZOOM: f64 = 0.0;
const MAX_ZOOM: f64 = 22.0;

/// The visible geographic area of the map and its zoom level.
///
/// Viewports are cheap snapshots: the map surface produces a new one on every
/// pan or zoom and layers keep the one they last fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Visible bounding box
    pub bounds: LatLngBounds,
    /// Current zoom level
    pub zoom: f64,
}

impl Viewport {
    /// Creates a new viewport, clamping zoom to the supported range
    pub fn new(bounds: LatLngBounds, zoom: f64) -> Self {
        Self {
            bounds,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Creates a viewport from south/west/north/east coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64, zoom: f64) -> Self {
        Self::new(LatLngBounds::from_coords(south, west, north, east), zoom)
    }

    /// Approximates the viewport visible at `zoom` for a screen of
    /// `width_px` x `height_px` centred on `center`
    pub fn centered(center: LatLng, zoom: f64, width_px: f64, height_px: f64) -> Self {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        // Web Mercator ground resolution at the equator, 256 px tiles
        let meters_per_px =
            156_543.033_92 * center.lat.to_radians().cos().max(0.01) / 2_f64.powf(zoom);
        let half_extent = (width_px.max(height_px) * meters_per_px) / 2.0;
        Self::new(LatLngBounds::around(center, half_extent), zoom)
    }

    pub fn center(&self) -> LatLng {
        self.bounds.center()
    }

    /// Half the diagonal of the viewport, in metres
    pub fn radius_m(&self) -> f64 {
        self.bounds.center().distance_to(&self.bounds.north_east)
    }

    /// Same zoom, bounds shifted so the centre lands on `center`
    pub fn recentered(&self, center: LatLng) -> Self {
        let current = self.center();
        let d_lat = center.lat - current.lat;
        let d_lng = center.lng - current.lng;
        Self::from_coords(
            self.bounds.south() + d_lat,
            self.bounds.west() + d_lng,
            self.bounds.north() + d_lat,
            self.bounds.east() + d_lng,
            self.zoom,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_clamped() {
        let viewport = Viewport::from_coords(47.5, -122.4, 47.7, -122.2, 40.0);
        assert_eq!(viewport.zoom, 22.0);
    }

    #[test]
    fn test_recentered_keeps_span() {
        let viewport = Viewport::from_coords(47.5, -122.4, 47.7, -122.2, 13.0);
        let moved = viewport.recentered(LatLng::new(45.5, -122.6));

        assert!((moved.center().lat - 45.5).abs() < 1e-9);
        assert!((moved.bounds.span().lat - viewport.bounds.span().lat).abs() < 1e-9);
        assert_eq!(moved.zoom, 13.0);
    }

    #[test]
    fn test_centered_shrinks_with_zoom() {
        let center = LatLng::new(47.6062, -122.3321);
        let wide = Viewport::centered(center, 11.0, 1200.0, 800.0);
        let close = Viewport::centered(center, 15.0, 1200.0, 800.0);

        assert!(wide.radius_m() > close.radius_m());
        assert!(close.bounds.contains(&center));
    }
}
