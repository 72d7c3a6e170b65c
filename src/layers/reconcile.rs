//! Diff-and-apply of a layer's markers.
//!
//! Ids present both before and after an update are left alone, so their
//! markers (and any open popup) survive incremental refreshes.

use crate::{
    core::state::LayerKind,
    data::record::{GeoRecord, RecordId},
    layers::{marker::Marker, surface::MapSurface},
    prelude::{HashMap, HashSet},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Ids drawn before and absent now
    pub to_remove: Vec<RecordId>,
    /// Markers absent before and present now
    pub to_add: Vec<Marker>,
    /// Kept markers whose position or heading changed; updated in place
    pub to_update: Vec<Marker>,
    /// Number of ids present on both sides
    pub kept: usize,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty() && self.to_update.is_empty()
    }
}

/// Computes the set difference between drawn ids and the new markers
pub fn plan_markers(current: &HashSet<RecordId>, markers: Vec<Marker>) -> ReconcilePlan {
    let mut incoming: HashSet<RecordId> = HashSet::default();
    let mut to_add = Vec::new();
    let mut kept = 0;

    for marker in markers {
        if !incoming.insert(marker.record_id().clone()) {
            continue;
        }
        if current.contains(marker.record_id()) {
            kept += 1;
        } else {
            to_add.push(marker);
        }
    }

    let to_remove = current
        .iter()
        .filter(|id| !incoming.contains(*id))
        .cloned()
        .collect();

    ReconcilePlan {
        to_remove,
        to_add,
        to_update: Vec::new(),
        kept,
    }
}

/// Like [`plan_markers`], but kept markers that moved or turned are queued
/// for an in-place update. Used for live vehicles.
pub fn plan_tracked(previous: &HashMap<RecordId, Marker>, markers: Vec<Marker>) -> ReconcilePlan {
    let current: HashSet<RecordId> = previous.keys().cloned().collect();
    let to_update = markers
        .iter()
        .filter(|m| {
            previous
                .get(m.record_id())
                .map(|old| old.position() != m.position() || old.rotation() != m.rotation())
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    ReconcilePlan {
        to_update,
        ..plan_markers(&current, markers)
    }
}

/// [`plan_markers`] for point-of-interest records
pub fn plan(current: &HashSet<RecordId>, records: &[GeoRecord]) -> ReconcilePlan {
    plan_markers(current, records.iter().map(Marker::from_record).collect())
}

/// Applies a plan to one layer group of the surface
pub fn apply(surface: &dyn MapSurface, layer: LayerKind, plan: ReconcilePlan) -> (usize, usize) {
    let removed = plan.to_remove.len();
    let added = plan.to_add.len();
    for id in &plan.to_remove {
        surface.remove_marker(layer, id);
    }
    for marker in plan.to_add {
        surface.add_marker(layer, marker);
    }
    for marker in plan.to_update {
        surface.update_marker(layer, marker);
    }
    if removed + added > 0 {
        log::debug!(
            "{}: +{} -{} ({} kept)",
            layer,
            added,
            removed,
            plan.kept
        );
    }
    (added, removed)
}
