//! The boundary between layers and whatever draws the map.
//!
//! The surface is one shared object; each layer only ever touches its own
//! layer group on it.

use std::sync::Mutex;

use crate::{
    core::state::LayerKind,
    data::record::RecordId,
    layers::marker::{Marker, Polyline},
    prelude::{HashMap, HashSet},
};

pub trait MapSurface: Send + Sync {
    fn add_marker(&self, layer: LayerKind, marker: Marker);

    fn remove_marker(&self, layer: LayerKind, id: &RecordId);

    /// Moves or restyles an existing marker without recreating it
    fn update_marker(&self, layer: LayerKind, marker: Marker);

    /// Removes every marker and polyline of one layer group
    fn clear_layer(&self, layer: LayerKind);

    /// Ids currently drawn in a layer group
    fn marker_ids(&self, layer: LayerKind) -> HashSet<RecordId>;

    /// Replaces the polylines of a layer group
    fn set_polylines(&self, layer: LayerKind, lines: Vec<Polyline>);
}

#[derive(Debug, Default)]
struct LayerGroup {
    markers: HashMap<RecordId, Marker>,
    polylines: Vec<Polyline>,
}

/// Counters of surface calls, used to check which markers were recreated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
    pub cleared: usize,
}

/// Thread-safe in-memory surface for headless runs and tests
#[derive(Debug, Default)]
pub struct MemorySurface {
    groups: Mutex<HashMap<LayerKind, LayerGroup>>,
    stats: Mutex<SurfaceStats>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, layer: LayerKind, id: &RecordId) -> Option<Marker> {
        self.groups
            .lock()
            .ok()?
            .get(&layer)?
            .markers
            .get(id)
            .cloned()
    }

    pub fn marker_count(&self, layer: LayerKind) -> usize {
        self.groups
            .lock()
            .ok()
            .and_then(|groups| groups.get(&layer).map(|g| g.markers.len()))
            .unwrap_or(0)
    }

    pub fn polylines(&self, layer: LayerKind) -> Vec<Polyline> {
        self.groups
            .lock()
            .ok()
            .and_then(|groups| groups.get(&layer).map(|g| g.polylines.clone()))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn bump(&self, f: impl FnOnce(&mut SurfaceStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

impl MapSurface for MemorySurface {
    fn add_marker(&self, layer: LayerKind, marker: Marker) {
        if let Ok(mut groups) = self.groups.lock() {
            groups
                .entry(layer)
                .or_default()
                .markers
                .insert(marker.record_id().clone(), marker);
        }
        self.bump(|s| s.added += 1);
    }

    fn remove_marker(&self, layer: LayerKind, id: &RecordId) {
        let removed = self
            .groups
            .lock()
            .ok()
            .and_then(|mut groups| groups.get_mut(&layer).and_then(|g| g.markers.remove(id)))
            .is_some();
        if removed {
            self.bump(|s| s.removed += 1);
        }
    }

    fn update_marker(&self, layer: LayerKind, marker: Marker) {
        let updated = self
            .groups
            .lock()
            .ok()
            .and_then(|mut groups| {
                let slot = groups.get_mut(&layer)?.markers.get_mut(marker.record_id())?;
                *slot = marker;
                Some(())
            })
            .is_some();
        if updated {
            self.bump(|s| s.updated += 1);
        }
    }

    fn clear_layer(&self, layer: LayerKind) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.remove(&layer);
        }
        self.bump(|s| s.cleared += 1);
    }

    fn marker_ids(&self, layer: LayerKind) -> HashSet<RecordId> {
        self.groups
            .lock()
            .ok()
            .and_then(|groups| {
                groups
                    .get(&layer)
                    .map(|g| g.markers.keys().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn set_polylines(&self, layer: LayerKind, lines: Vec<Polyline>) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.entry(layer).or_default().polylines = lines;
        }
    }
}
