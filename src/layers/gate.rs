use crate::core::{config::LayerConfig, viewport::Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    FirstFetch,
    Moved,
    LowOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ZoomTooLow,
    NotMovedEnough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Fetch(FetchReason),
    Skip(SkipReason),
}

impl GateDecision {
    pub fn should_fetch(&self) -> bool {
        matches!(self, GateDecision::Fetch(_))
    }
}

/// Decides whether a new viewport justifies hitting the upstream API.
///
/// Zoom must reach the layer minimum, and either nothing was fetched yet,
/// the centre moved past the threshold, or too little of the new viewport
/// overlaps the last fetched one.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchGate {
    min_zoom: f64,
    move_threshold_m: f64,
    min_overlap: f64,
}

impl FetchGate {
    pub fn new(min_zoom: f64, move_threshold_m: f64, min_overlap: f64) -> Self {
        Self {
            min_zoom,
            move_threshold_m,
            min_overlap: min_overlap.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &LayerConfig) -> Self {
        Self::new(config.min_zoom, config.move_threshold_m, config.min_overlap)
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn zoom_sufficient(&self, viewport: &Viewport) -> bool {
        viewport.zoom >= self.min_zoom
    }

    pub fn evaluate(&self, viewport: &Viewport, last: Option<&Viewport>) -> GateDecision {
        if !self.zoom_sufficient(viewport) {
            return GateDecision::Skip(SkipReason::ZoomTooLow);
        }
        let Some(last) = last else {
            return GateDecision::Fetch(FetchReason::FirstFetch);
        };

        let moved = viewport.center().distance_to(&last.center());
        if moved > self.move_threshold_m {
            return GateDecision::Fetch(FetchReason::Moved);
        }
        if viewport.bounds.overlap_ratio(&last.bounds) < self.min_overlap {
            return GateDecision::Fetch(FetchReason::LowOverlap);
        }
        GateDecision::Skip(SkipReason::NotMovedEnough)
    }

    pub fn should_fetch(&self, viewport: &Viewport, last: Option<&Viewport>) -> bool {
        self.evaluate(viewport, last).should_fetch()
    }
}

impl Default for FetchGate {
    fn default() -> Self {
        Self::from_config(&LayerConfig::default())
    }
}
