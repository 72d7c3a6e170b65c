use std::sync::{Arc, RwLock};

use futures::future::join_all;

use crate::{
    core::{
        state::{LayerKind, ToggleStore},
        viewport::Viewport,
    },
    input::tracker::ViewportListener,
    layers::controller::{FetchState, LayerHandle, RefreshOutcome},
    prelude::HashMap,
    Result,
};

/// Registry of every layer on the map, keyed by kind
pub struct LayerManager {
    /// All layers indexed by kind
    layers: RwLock<HashMap<LayerKind, Arc<dyn LayerHandle>>>,
    toggles: ToggleStore,
}

impl LayerManager {
    pub fn new(toggles: ToggleStore) -> Self {
        Self {
            layers: RwLock::new(HashMap::default()),
            toggles,
        }
    }

    /// Adds a layer, replacing any previous layer of the same kind
    pub fn register(&self, layer: Arc<dyn LayerHandle>) -> Option<Arc<dyn LayerHandle>> {
        let kind = layer.kind();
        let previous = self
            .layers
            .write()
            .ok()
            .and_then(|mut layers| layers.insert(kind, layer));
        if let Some(previous) = &previous {
            previous.cancel_pending();
            log::warn!("layer {} registered twice; replacing", kind);
        }
        previous
    }

    pub fn remove(&self, kind: LayerKind) -> Option<Arc<dyn LayerHandle>> {
        let removed = self
            .layers
            .write()
            .ok()
            .and_then(|mut layers| layers.remove(&kind));
        if let Some(layer) = &removed {
            layer.cancel_pending();
        }
        removed
    }

    pub fn get(&self, kind: LayerKind) -> Option<Arc<dyn LayerHandle>> {
        self.layers
            .read()
            .ok()
            .and_then(|layers| layers.get(&kind).cloned())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<LayerKind> {
        let mut kinds: Vec<_> = self
            .layers
            .read()
            .map(|layers| layers.keys().copied().collect())
            .unwrap_or_default();
        kinds.sort();
        kinds
    }

    pub fn states(&self) -> Vec<(LayerKind, FetchState)> {
        self.snapshot()
            .into_iter()
            .map(|layer| (layer.kind(), layer.state()))
            .collect()
    }

    /// Sends a viewport to every layer at once, skipping the debounce window
    pub async fn dispatch_viewport(&self, viewport: &Viewport) -> Vec<(LayerKind, Result<RefreshOutcome>)> {
        let layers = self.snapshot();
        let results = join_all(layers.iter().map(|layer| layer.handle_viewport(viewport.clone()))).await;

        layers
            .iter()
            .zip(results)
            .map(|(layer, result)| {
                if let Err(e) = &result {
                    log::warn!("layer {}: {}", layer.kind(), e);
                }
                (layer.kind(), result)
            })
            .collect()
    }

    /// Flips a layer on or off; unregistered kinds only update the store
    pub async fn set_visible(&self, kind: LayerKind, visible: bool) -> Result<RefreshOutcome> {
        match self.get(kind) {
            Some(layer) => layer.set_visible(visible).await,
            None => {
                self.toggles.set_visible(kind, visible);
                Ok(RefreshOutcome::Idle)
            }
        }
    }

    pub async fn toggle(&self, kind: LayerKind) -> Result<RefreshOutcome> {
        let visible = !self.toggles.is_visible(kind);
        self.set_visible(kind, visible).await
    }

    /// Gets the number of layers
    pub fn len(&self) -> usize {
        self.layers.read().map(|layers| layers.len()).unwrap_or(0)
    }

    /// Checks if the manager is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn LayerHandle>> {
        let mut layers: Vec<_> = self
            .layers
            .read()
            .map(|layers| layers.values().cloned().collect())
            .unwrap_or_default();
        layers.sort_by_key(|layer| layer.kind());
        layers
    }
}

impl ViewportListener for LayerManager {
    fn viewport_changed(&self, viewport: &Viewport) {
        for layer in self.snapshot() {
            layer.schedule(viewport.clone());
        }
    }

    fn cancel_pending(&self) {
        for layer in self.snapshot() {
            layer.cancel_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{events::EventBus, geo::LatLng},
        data::record::{GeoRecord, Source},
        layers::{
            controller::{LayerContext, LayerController, TransitLayer},
            surface::MemorySurface,
        },
        sources::{tests::StubSource, transit::TransitCatalog},
        LayerConfig,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn setup() -> (LayerManager, LayerContext, Arc<MemorySurface>, Arc<StubSource>) {
        let bus = EventBus::new();
        let toggles = ToggleStore::new(bus.clone(), &[LayerKind::Cafes, LayerKind::Transit]);
        let surface = Arc::new(MemorySurface::new());
        let ctx = LayerContext::new(surface.clone(), bus, toggles.clone());
        let source = Arc::new(StubSource::ok(
            Source::Osm,
            vec![GeoRecord::new(Source::Osm, "node/1", LatLng::new(47.6, -122.33))],
        ));

        let manager = LayerManager::new(toggles);
        manager.register(Arc::new(LayerController::new(
            LayerKind::Cafes,
            source.clone(),
            LayerConfig {
                debounce: Duration::from_millis(300),
                ..LayerConfig::default()
            },
            &ctx,
        )));
        manager.register(Arc::new(TransitLayer::new(TransitCatalog::seattle(), &ctx)));
        (manager, ctx, surface, source)
    }

    fn seattle() -> Viewport {
        Viewport::from_coords(47.5, -122.4, 47.7, -122.2, 13.0)
    }

    #[tokio::test]
    async fn dispatch_reaches_every_layer() {
        let (manager, _, surface, source) = setup();

        let results = manager.dispatch_viewport(&seattle()).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 1);
        assert!(!surface.polylines(LayerKind::Transit).is_empty());
        assert_eq!(manager.kinds(), vec![LayerKind::Cafes, LayerKind::Transit]);
    }

    #[tokio::test]
    async fn toggle_routes_through_layer() {
        let (manager, ctx, surface, source) = setup();
        manager.dispatch_viewport(&seattle()).await;

        manager.toggle(LayerKind::Cafes).await.unwrap();
        assert!(!ctx.toggles.is_visible(LayerKind::Cafes));
        assert_eq!(surface.marker_count(LayerKind::Cafes), 0);

        manager.toggle(LayerKind::Cafes).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // no layer registered: the flag still flips
        manager.set_visible(LayerKind::Historic, true).await.unwrap();
        assert!(ctx.toggles.is_visible(LayerKind::Historic));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_debounces_and_cancels() {
        let (manager, _, _, source) = setup();

        manager.viewport_changed(&seattle());
        manager.cancel_pending();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        manager.viewport_changed(&seattle());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
