//! Centrally owned visibility toggles for every map layer.
//!
//! The store is a cheap cloneable handle. Each mutation flips exactly one
//! layer's flag and announces it on the event bus.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::events::{EventBus, MapEvent};
use crate::prelude::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Restaurants,
    Cafes,
    Parking,
    Historic,
    Viewpoints,
    FarmersMarkets,
    NewsEvents,
    Imagery,
    Transit,
    Vehicles,
}

impl LayerKind {
    pub const ALL: [LayerKind; 10] = [
        LayerKind::Restaurants,
        LayerKind::Cafes,
        LayerKind::Parking,
        LayerKind::Historic,
        LayerKind::Viewpoints,
        LayerKind::FarmersMarkets,
        LayerKind::NewsEvents,
        LayerKind::Imagery,
        LayerKind::Transit,
        LayerKind::Vehicles,
    ];
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LayerKind::Restaurants => "restaurants",
            LayerKind::Cafes => "cafes",
            LayerKind::Parking => "parking",
            LayerKind::Historic => "historic",
            LayerKind::Viewpoints => "viewpoints",
            LayerKind::FarmersMarkets => "farmers_markets",
            LayerKind::NewsEvents => "news_events",
            LayerKind::Imagery => "imagery",
            LayerKind::Transit => "transit",
            LayerKind::Vehicles => "vehicles",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug)]
pub struct ToggleStore {
    flags: Arc<RwLock<HashMap<LayerKind, bool>>>,
    bus: EventBus,
}

impl ToggleStore {
    /// Creates a store where only `visible` layers start switched on
    pub fn new(bus: EventBus, visible: &[LayerKind]) -> Self {
        let flags = LayerKind::ALL
            .iter()
            .map(|kind| (*kind, visible.contains(kind)))
            .collect();
        Self {
            flags: Arc::new(RwLock::new(flags)),
            bus,
        }
    }

    pub fn is_visible(&self, layer: LayerKind) -> bool {
        self.flags
            .read()
            .ok()
            .and_then(|flags| flags.get(&layer).copied())
            .unwrap_or(false)
    }

    /// Sets one flag; returns whether it changed
    pub fn set_visible(&self, layer: LayerKind, visible: bool) -> bool {
        let changed = match self.flags.write() {
            Ok(mut flags) => flags.insert(layer, visible) != Some(visible),
            Err(_) => false,
        };
        if changed {
            log::debug!("layer {} visible={}", layer, visible);
            self.bus.publish(MapEvent::LayerToggled { layer, visible });
        }
        changed
    }

    /// Flips one flag and returns the new value
    pub fn toggle(&self, layer: LayerKind) -> bool {
        let visible = !self.is_visible(layer);
        self.set_visible(layer, visible);
        visible
    }

    pub fn visible_layers(&self) -> Vec<LayerKind> {
        let mut layers: Vec<_> = self
            .flags
            .read()
            .map(|flags| {
                flags
                    .iter()
                    .filter(|(_, visible)| **visible)
                    .map(|(kind, _)| *kind)
                    .collect()
            })
            .unwrap_or_default();
        layers.sort();
        layers
    }
}
