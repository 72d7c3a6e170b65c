use serde::{Deserialize, Serialize};

use crate::{
    core::geo::LatLng,
    data::record::{GeoRecord, RecordId},
    sources::gtfs::Vehicle,
};

/// A renderable point bound one-to-one to a record id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    record_id: RecordId,
    position: LatLng,
    label: String,
    popup_text: Option<String>,
    /// Heading in degrees, for markers drawn as arrows
    rotation: Option<f32>,
}

impl Marker {
    pub fn new(record_id: RecordId, position: LatLng) -> Self {
        Self {
            label: record_id.to_string(),
            record_id,
            position,
            popup_text: None,
            rotation: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_popup(mut self, text: String) -> Self {
        self.popup_text = Some(text);
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = Some(degrees);
        self
    }

    /// Marker for a point of interest; the popup lists name, rating and source
    pub fn from_record(record: &GeoRecord) -> Self {
        let label = record
            .name
            .clone()
            .unwrap_or_else(|| record.id.to_string());

        let mut popup = label.clone();
        if let Some(rating) = record.rating.filter(|r| *r > 0.0) {
            popup.push_str(&format!(" ({:.1}★)", rating));
        }
        for key in ["address", "opening_hours", "fee", "maxstay"] {
            if let Some(value) = record.property_str(key) {
                popup.push_str(&format!("\n{}: {}", key.replace('_', " "), value));
            }
        }
        popup.push_str(&format!("\nsource: {}", record.source));

        Self::new(record.id.clone(), record.position)
            .with_label(label)
            .with_popup(popup)
    }

    /// Marker for a live vehicle, rotated to its bearing when known
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        let route = vehicle.route_id.as_deref().unwrap_or("?");
        let mut popup = format!("Route {}\nVehicle {}", route, vehicle.label());
        if let Some(speed) = vehicle.speed {
            popup.push_str(&format!("\n{:.0} km/h", speed * 3.6));
        }
        if let Some(occupancy) = vehicle.occupancy {
            popup.push_str(&format!("\n{}", occupancy));
        }

        let marker = Self::new(vehicle.id.clone(), vehicle.position)
            .with_label(route.to_string())
            .with_popup(popup);
        match vehicle.bearing {
            Some(bearing) => marker.with_rotation(bearing),
            None => marker,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn set_position(&mut self, position: LatLng) {
        self.position = position;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn popup_text(&self) -> Option<&str> {
        self.popup_text.as_deref()
    }

    pub fn rotation(&self) -> Option<f32> {
        self.rotation
    }
}

/// A renderable line, used for transit routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub id: String,
    pub label: String,
    pub color: String,
    pub points: Vec<LatLng>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::Source;

    #[test]
    fn record_popup_lists_metadata() {
        let record = GeoRecord::new(Source::Google, "abc", LatLng::new(47.61, -122.33))
            .with_name("Joe's Cafe")
            .with_rating(4.5)
            .with_property("address", "123 Pine St");

        let marker = Marker::from_record(&record);

        assert_eq!(marker.label(), "Joe's Cafe");
        assert_eq!(marker.record_id().as_str(), "google:abc");
        let popup = marker.popup_text().unwrap();
        assert!(popup.starts_with("Joe's Cafe (4.5★)"));
        assert!(popup.contains("address: 123 Pine St"));
        assert!(popup.ends_with("source: google"));
    }

    #[test]
    fn unnamed_record_uses_id() {
        let record = GeoRecord::new(Source::Osm, "node/7", LatLng::new(47.61, -122.33));
        assert_eq!(Marker::from_record(&record).label(), "osm:node/7");
    }
}
