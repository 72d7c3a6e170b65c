//! Typed publish/subscribe channel shared by the explorer's components.
//!
//! Every subscriber owns its own `crossbeam-channel` receiver, so a slow or
//! dropped subscriber never blocks publishers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

pub use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};

use crate::core::{geo::LatLng, state::LayerKind, viewport::Viewport};

/// Cities the explorer can jump to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum City {
    Seattle,
    Portland,
    SanFrancisco,
    NewYork,
    Chicago,
}

impl City {
    pub const ALL: [City; 5] = [
        City::Seattle,
        City::Portland,
        City::SanFrancisco,
        City::NewYork,
        City::Chicago,
    ];

    pub fn center(&self) -> LatLng {
        match self {
            City::Seattle => LatLng::new(47.6062, -122.3321),
            City::Portland => LatLng::new(45.5152, -122.6784),
            City::SanFrancisco => LatLng::new(37.7749, -122.4194),
            City::NewYork => LatLng::new(40.7128, -74.0060),
            City::Chicago => LatLng::new(41.8781, -87.6298),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            City::Seattle => "Seattle",
            City::Portland => "Portland",
            City::SanFrancisco => "San Francisco",
            City::NewYork => "New York",
            City::Chicago => "Chicago",
        }
    }

    /// Window/document title for the selected city
    pub fn display_title(&self) -> String {
        format!("Exploring {} | citymap", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Initial centre resolved and first viewport known
    MapReady(Viewport),
    CitySelected(City),
    /// Raw pan/zoom completion, before debouncing
    ViewportChanged(Viewport),
    LayerToggled { layer: LayerKind, visible: bool },
    /// A layer finished reconciling its markers
    LayerUpdated {
        layer: LayerKind,
        added: usize,
        removed: usize,
        total: usize,
    },
    /// A layer fetch failed; previous markers were kept
    LayerFailed { layer: LayerKind, error: String },
    VehiclesUpdated { count: usize, failed_feeds: usize },
}

/// A live subscription to the bus
pub struct Subscription {
    rx: Receiver<MapEvent>,
}

impl Subscription {
    /// Drains every event published since the last call
    pub fn try_iter(&self) -> impl Iterator<Item = MapEvent> + '_ {
        self.rx.try_iter()
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// `Disconnected` means the bus and every clone of it are gone; no event
    /// will ever arrive again.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<MapEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn receiver(&self) -> &Receiver<MapEvent> {
        &self.rx
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<MapEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// Sends `event` to every live subscriber, forgetting dropped ones
    pub fn publish(&self, event: MapEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_to_every_subscriber() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(MapEvent::CitySelected(City::Portland));

        assert_eq!(
            a.try_iter().collect::<Vec<_>>(),
            vec![MapEvent::CitySelected(City::Portland)]
        );
        assert_eq!(b.try_iter().count(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(MapEvent::CitySelected(City::Seattle));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }

    #[test]
    fn recv_reports_timeout_and_disconnect_apart() {
        let bus = EventBus::new();
        let events = bus.subscribe();

        assert_eq!(
            events.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
        bus.publish(MapEvent::CitySelected(City::Chicago));
        drop(bus);

        assert_eq!(
            events.recv_timeout(Duration::from_millis(10)),
            Ok(MapEvent::CitySelected(City::Chicago))
        );
        assert_eq!(
            events.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn city_titles() {
        assert_eq!(
            City::SanFrancisco.display_title(),
            "Exploring San Francisco | citymap"
        );
        assert!(City::ALL.iter().all(|c| c.center().is_valid()));
    }
}
