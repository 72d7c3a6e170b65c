//! GTFS-Realtime vehicle positions.
//!
//! Only the part of `gtfs-realtime.proto` needed to place vehicles is
//! declared; prost skips every other field on decode.

use std::time::Duration;

use async_trait::async_trait;
use prost::Message;

use crate::{
    core::{config::FeedConfig, constants::VEHICLE_FEED_TIMEOUT, geo::LatLng},
    data::record::{RecordId, Source},
    sources::http,
    Result,
};

pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct FeedMessage {
        #[prost(message, optional, tag = "1")]
        pub header: Option<FeedHeader>,
        #[prost(message, repeated, tag = "2")]
        pub entity: Vec<FeedEntity>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct FeedHeader {
        #[prost(string, optional, tag = "1")]
        pub gtfs_realtime_version: Option<String>,
        #[prost(uint64, optional, tag = "3")]
        pub timestamp: Option<u64>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct FeedEntity {
        #[prost(string, optional, tag = "1")]
        pub id: Option<String>,
        #[prost(bool, optional, tag = "2")]
        pub is_deleted: Option<bool>,
        #[prost(message, optional, tag = "4")]
        pub vehicle: Option<VehiclePosition>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct VehiclePosition {
        #[prost(message, optional, tag = "1")]
        pub trip: Option<TripDescriptor>,
        #[prost(message, optional, tag = "2")]
        pub position: Option<Position>,
        #[prost(uint64, optional, tag = "5")]
        pub timestamp: Option<u64>,
        #[prost(message, optional, tag = "8")]
        pub vehicle: Option<VehicleDescriptor>,
        #[prost(enumeration = "OccupancyStatus", optional, tag = "9")]
        pub occupancy_status: Option<i32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TripDescriptor {
        #[prost(string, optional, tag = "1")]
        pub trip_id: Option<String>,
        #[prost(string, optional, tag = "5")]
        pub route_id: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct VehicleDescriptor {
        #[prost(string, optional, tag = "1")]
        pub id: Option<String>,
        #[prost(string, optional, tag = "2")]
        pub label: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Position {
        #[prost(float, optional, tag = "1")]
        pub latitude: Option<f32>,
        #[prost(float, optional, tag = "2")]
        pub longitude: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub bearing: Option<f32>,
        /// Metres per second
        #[prost(float, optional, tag = "5")]
        pub speed: Option<f32>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum OccupancyStatus {
        Empty = 0,
        ManySeatsAvailable = 1,
        FewSeatsAvailable = 2,
        StandingRoomOnly = 3,
        CrushedStandingRoomOnly = 4,
        Full = 5,
        NotAcceptingPassengers = 6,
        NoDataAvailable = 7,
        NotBoardable = 8,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    ManySeats,
    FewSeats,
    StandingRoom,
    Crowded,
    Full,
    NotAccepting,
}

impl Occupancy {
    fn from_proto(status: proto::OccupancyStatus) -> Option<Self> {
        use proto::OccupancyStatus as S;
        Some(match status {
            S::Empty => Occupancy::Empty,
            S::ManySeatsAvailable => Occupancy::ManySeats,
            S::FewSeatsAvailable => Occupancy::FewSeats,
            S::StandingRoomOnly => Occupancy::StandingRoom,
            S::CrushedStandingRoomOnly => Occupancy::Crowded,
            S::Full => Occupancy::Full,
            S::NotAcceptingPassengers | S::NotBoardable => Occupancy::NotAccepting,
            S::NoDataAvailable => return None,
        })
    }
}

impl std::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Occupancy::Empty => "Empty",
            Occupancy::ManySeats => "Many seats available",
            Occupancy::FewSeats => "Few seats available",
            Occupancy::StandingRoom => "Standing room only",
            Occupancy::Crowded => "Crowded",
            Occupancy::Full => "Full",
            Occupancy::NotAccepting => "Not accepting passengers",
        })
    }
}

/// A vehicle placed on the map by one feed
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    /// `gtfs:{feed}/{vehicle}`, unique across feeds
    pub id: RecordId,
    pub feed: String,
    pub vehicle_id: String,
    pub display_label: Option<String>,
    pub route_id: Option<String>,
    pub trip_id: Option<String>,
    pub position: LatLng,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub occupancy: Option<Occupancy>,
    /// POSIX seconds of the position fix
    pub timestamp: Option<u64>,
}

impl Vehicle {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.vehicle_id)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Decodes a `FeedMessage` and keeps the entities that place a vehicle.
///
/// Deleted entities, entities without a vehicle or position, and positions
/// outside valid coordinate ranges are dropped.
pub fn decode_vehicles(feed: &str, bytes: &[u8]) -> Result<Vec<Vehicle>> {
    let message = proto::FeedMessage::decode(bytes)?;

    let mut vehicles = Vec::with_capacity(message.entity.len());
    for entity in message.entity {
        if entity.is_deleted.unwrap_or(false) {
            continue;
        }
        let Some(vp) = entity.vehicle else {
            continue;
        };
        let Some(pos) = vp.position else {
            continue;
        };
        let (Some(lat), Some(lng)) = (pos.latitude, pos.longitude) else {
            continue;
        };
        let position = LatLng::new(lat as f64, lng as f64);
        if !position.is_valid() {
            continue;
        }

        let descriptor = vp.vehicle.unwrap_or_default();
        let Some(vehicle_id) = non_empty(descriptor.id).or_else(|| non_empty(entity.id)) else {
            continue;
        };
        let trip = vp.trip.unwrap_or_default();
        let occupancy = vp
            .occupancy_status
            .and_then(|v| proto::OccupancyStatus::try_from(v).ok())
            .and_then(Occupancy::from_proto);

        vehicles.push(Vehicle {
            id: RecordId::new(Source::Gtfs, format!("{}/{}", feed, vehicle_id)),
            feed: feed.to_string(),
            vehicle_id,
            display_label: non_empty(descriptor.label),
            route_id: non_empty(trip.route_id),
            trip_id: non_empty(trip.trip_id),
            position,
            bearing: pos.bearing.filter(|b| b.is_finite()),
            speed: pos.speed.filter(|s| s.is_finite() && *s >= 0.0),
            occupancy,
            timestamp: vp.timestamp,
        });
    }
    Ok(vehicles)
}

/// One source of live vehicle positions
#[async_trait]
pub trait VehicleFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Vehicle>>;
}

pub struct HttpVehicleFeed {
    name: String,
    url: String,
    timeout: Duration,
}

impl HttpVehicleFeed {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout: VEHICLE_FEED_TIMEOUT,
        }
    }

    pub fn from_config(config: &FeedConfig, timeout: Duration) -> Self {
        Self::new(config.name.clone(), config.url.clone()).with_timeout(timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl VehicleFeed for HttpVehicleFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Vehicle>> {
        let bytes = http::get_bytes(&self.url, self.timeout).await?;
        decode_vehicles(&self.name, &bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::proto::*;
    use super::*;

    pub(crate) fn vehicle_entity(id: &str, route: &str, lat: f32, lng: f32) -> FeedEntity {
        FeedEntity {
            id: Some(format!("entity-{}", id)),
            is_deleted: None,
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some(format!("trip-{}", id)),
                    route_id: Some(route.to_string()),
                }),
                position: Some(Position {
                    latitude: Some(lat),
                    longitude: Some(lng),
                    bearing: Some(90.0),
                    speed: Some(10.0),
                }),
                timestamp: Some(1_700_000_000),
                vehicle: Some(VehicleDescriptor {
                    id: Some(id.to_string()),
                    label: None,
                }),
                occupancy_status: Some(OccupancyStatus::FewSeatsAvailable as i32),
            }),
        }
    }

    pub(crate) fn encode_feed(entities: Vec<FeedEntity>) -> Vec<u8> {
        FeedMessage {
            header: Some(FeedHeader {
                gtfs_realtime_version: Some("2.0".into()),
                timestamp: Some(1_700_000_000),
            }),
            entity: entities,
        }
        .encode_to_vec()
    }

    #[test]
    fn decodes_vehicle_positions() {
        let bytes = encode_feed(vec![vehicle_entity("7001", "40", 47.61, -122.33)]);

        let vehicles = decode_vehicles("metro", &bytes).unwrap();

        assert_eq!(vehicles.len(), 1);
        let bus = &vehicles[0];
        assert_eq!(bus.id.as_str(), "gtfs:metro/7001");
        assert_eq!(bus.route_id.as_deref(), Some("40"));
        assert_eq!(bus.occupancy, Some(Occupancy::FewSeats));
        assert_eq!(bus.bearing, Some(90.0));
        assert_eq!(bus.label(), "7001");
        assert!((bus.position.lat - 47.61).abs() < 1e-4);
    }

    #[test]
    fn skips_unplaceable_entities() {
        let mut deleted = vehicle_entity("1", "8", 47.6, -122.3);
        deleted.is_deleted = Some(true);
        let mut no_position = vehicle_entity("2", "8", 47.6, -122.3);
        no_position.vehicle.as_mut().unwrap().position = None;
        let bad_coords = vehicle_entity("3", "8", 123.0, -122.3);
        let trip_update_only = FeedEntity {
            id: Some("tu".into()),
            is_deleted: None,
            vehicle: None,
        };
        let mut entity_id_only = vehicle_entity("4", "8", 47.6, -122.3);
        entity_id_only.vehicle.as_mut().unwrap().vehicle = None;

        let bytes = encode_feed(vec![deleted, no_position, bad_coords, trip_update_only, entity_id_only]);
        let vehicles = decode_vehicles("metro", &bytes).unwrap();

        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].id.as_str(), "gtfs:metro/entity-4");
    }

    #[test]
    fn same_vehicle_in_two_feeds_stays_distinct() {
        let bytes = encode_feed(vec![vehicle_entity("1", "A", 47.6, -122.3)]);
        let a = decode_vehicles("metro", &bytes).unwrap();
        let b = decode_vehicles("sound", &bytes).unwrap();
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_vehicles("metro", &[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, crate::Error::Decode(_)));
    }
}
