use std::sync::{Arc, Mutex};

use crate::core::{
    events::{EventBus, MapEvent},
    viewport::Viewport,
};

/// Receives settled viewports from the tracker.
///
/// Implementors debounce on their own so each layer can use its own window
/// and cancel its own pending call.
pub trait ViewportListener: Send + Sync {
    fn viewport_changed(&self, viewport: &Viewport);

    /// Drop any debounced call that has not fired yet
    fn cancel_pending(&self);
}

/// Observes pan/zoom completion on the map surface and fans the new
/// viewport out to listeners
#[derive(Clone)]
pub struct ViewportTracker {
    bus: EventBus,
    latest: Arc<Mutex<Option<Viewport>>>,
    listeners: Arc<Mutex<Vec<Arc<dyn ViewportListener>>>>,
}

impl ViewportTracker {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            latest: Arc::new(Mutex::new(None)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ViewportListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn on_move_end(&self, viewport: Viewport) {
        self.notify(viewport);
    }

    pub fn on_zoom_end(&self, viewport: Viewport) {
        self.notify(viewport);
    }

    /// Last viewport reported by the surface
    pub fn latest(&self) -> Option<Viewport> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    /// Records the initial viewport without notifying anyone
    pub fn seed(&self, viewport: Viewport) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(viewport);
        }
    }

    /// Clears every pending debounced call, e.g. on teardown
    pub fn cancel(&self) {
        for listener in self.snapshot() {
            listener.cancel_pending();
        }
    }

    fn notify(&self, viewport: Viewport) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(viewport.clone());
        }
        self.bus.publish(MapEvent::ViewportChanged(viewport.clone()));
        for listener in self.snapshot() {
            listener.viewport_changed(&viewport);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn ViewportListener>> {
        self.listeners
            .lock()
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }
}
