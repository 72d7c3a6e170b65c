//! Top-level coordinator wiring the bus, the toggle store, the layers and
//! the viewport tracker together.

use std::sync::{Arc, Mutex};

use crate::{
    background::vehicles::VehiclePoller,
    core::{
        config::{ExplorerConfig, LayerProfile},
        events::{City, EventBus, MapEvent, Subscription},
        geo::LatLng,
        location::{initial_center, Geolocator},
        state::{LayerKind, ToggleStore},
        viewport::Viewport,
    },
    data::cache::BoundsCache,
    input::tracker::ViewportTracker,
    layers::{
        controller::{LayerContext, LayerController, LayerHandle, RefreshOutcome, TransitLayer},
        manager::LayerManager,
        surface::MapSurface,
    },
    sources::{
        gtfs::{HttpVehicleFeed, VehicleFeed},
        imagery::ImagerySource,
        news::NewsEventsSource,
        overpass::OverpassSource,
        places::PlacesSource,
        transit::TransitCatalog,
        DataSource, MultiSource,
    },
    Result,
};

/// GDELT needs a keyword; this one matches every English-language article
const NEWS_TOPIC: &str = "sourcelang:english";

pub struct Explorer {
    config: ExplorerConfig,
    ctx: LayerContext,
    manager: Arc<LayerManager>,
    tracker: ViewportTracker,
    poller: Option<Arc<VehiclePoller>>,
    city: Mutex<Option<City>>,
}

impl Explorer {
    /// Explorer with no layers registered; add them with [`register_layer`](Self::register_layer)
    pub fn empty(config: ExplorerConfig, surface: Arc<dyn MapSurface>) -> Result<Self> {
        config.validate()?;
        let bus = EventBus::new();
        let toggles = ToggleStore::new(bus.clone(), &config.enabled_layers);
        let ctx = LayerContext::new(surface, bus.clone(), toggles.clone());

        let manager = Arc::new(LayerManager::new(toggles));
        let tracker = ViewportTracker::new(bus);
        tracker.add_listener(manager.clone());

        Ok(Self {
            config,
            ctx,
            manager,
            tracker,
            poller: None,
            city: Mutex::new(None),
        })
    }

    /// Explorer with the standard layer set.
    ///
    /// Layers whose upstream is not configured (no proxy URL, no feeds) are
    /// left out.
    pub fn from_config(config: ExplorerConfig, surface: Arc<dyn MapSurface>) -> Result<Self> {
        let mut explorer = Self::empty(config, surface)?;

        for layer in standard_layers(&explorer.config, &explorer.ctx) {
            explorer.register_layer(layer);
        }

        if !explorer.config.vehicle_feeds.is_empty() {
            let feeds: Vec<Arc<dyn VehicleFeed>> = explorer
                .config
                .vehicle_feeds
                .iter()
                .map(|feed| {
                    Arc::new(HttpVehicleFeed::from_config(feed, explorer.config.feed_timeout()))
                        as Arc<dyn VehicleFeed>
                })
                .collect();
            let poller = Arc::new(VehiclePoller::new(
                feeds,
                explorer.ctx.surface.clone(),
                explorer.ctx.bus.clone(),
                explorer.ctx.toggles.clone(),
                explorer.config.poll_interval(),
                explorer.config.feed_timeout(),
            ));
            explorer.register_layer(poller.clone());
            explorer.poller = Some(poller);
        }

        log::info!("explorer ready with layers {:?}", explorer.manager.kinds());
        Ok(explorer)
    }

    pub fn register_layer(&self, layer: Arc<dyn LayerHandle>) {
        self.manager.register(layer);
    }

    /// Collaborators for building extra layers against this explorer
    pub fn layer_context(&self) -> &LayerContext {
        &self.ctx
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn toggles(&self) -> &ToggleStore {
        &self.ctx.toggles
    }

    pub fn manager(&self) -> &LayerManager {
        &self.manager
    }

    pub fn tracker(&self) -> &ViewportTracker {
        &self.tracker
    }

    pub fn poller(&self) -> Option<&VehiclePoller> {
        self.poller.as_deref()
    }

    pub fn subscribe(&self) -> Subscription {
        self.ctx.bus.subscribe()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.tracker.latest()
    }

    pub fn city(&self) -> Option<City> {
        self.city.lock().ok().and_then(|city| *city)
    }

    /// Resolves the starting centre, announces the map and fetches every
    /// visible layer once. Starts vehicle polling when feeds are configured.
    pub async fn start(&self, locator: &dyn Geolocator) -> Viewport {
        let center = initial_center(locator, self.config.initial_center).await;
        let viewport = self.viewport_at(center, self.config.initial_zoom);

        self.tracker.seed(viewport.clone());
        self.ctx.bus.publish(MapEvent::MapReady(viewport.clone()));
        self.manager.dispatch_viewport(&viewport).await;

        if let Some(poller) = &self.poller {
            poller.start();
        }
        viewport
    }

    /// Pan/zoom completion reported by the map surface
    pub fn set_viewport(&self, viewport: Viewport) {
        self.tracker.on_move_end(viewport);
    }

    pub fn pan_to(&self, center: LatLng) {
        let viewport = match self.tracker.latest() {
            Some(current) => current.recentered(center),
            None => self.viewport_at(center, self.config.initial_zoom),
        };
        self.tracker.on_move_end(viewport);
    }

    pub fn zoom_to(&self, zoom: f64) {
        let center = self
            .tracker
            .latest()
            .map(|v| v.center())
            .unwrap_or(self.config.initial_center);
        self.tracker.on_zoom_end(self.viewport_at(center, zoom));
    }

    pub fn select_city(&self, city: City) {
        if let Ok(mut current) = self.city.lock() {
            *current = Some(city);
        }
        log::info!("{}", city.display_title());
        self.ctx.bus.publish(MapEvent::CitySelected(city));
        self.pan_to(city.center());
    }

    /// Window title for the selected city
    pub fn title(&self) -> String {
        match self.city() {
            Some(city) => city.display_title(),
            None => "citymap".to_string(),
        }
    }

    pub async fn set_layer_visible(&self, kind: LayerKind, visible: bool) -> Result<RefreshOutcome> {
        self.manager.set_visible(kind, visible).await
    }

    pub async fn toggle_layer(&self, kind: LayerKind) -> Result<RefreshOutcome> {
        self.manager.toggle(kind).await
    }

    /// Stops polling and drops every pending debounced fetch
    pub fn shutdown(&self) {
        if let Some(poller) = &self.poller {
            poller.stop();
        }
        self.tracker.cancel();
    }

    fn viewport_at(&self, center: LatLng, zoom: f64) -> Viewport {
        let (width, height) = self.config.screen_px;
        Viewport::centered(center, zoom, width, height)
    }
}

impl Drop for Explorer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poi_layer<S: DataSource + 'static>(
    kind: LayerKind,
    source: S,
    profile: LayerProfile,
    config: &ExplorerConfig,
    ctx: &LayerContext,
) -> Arc<dyn LayerHandle> {
    let cache = BoundsCache::new(config.cache_capacity, config.cache_ttl());
    Arc::new(LayerController::cached(kind, source, profile.resolve(), ctx, cache))
}

/// Google through the proxy when configured, OSM always
fn places_and_osm(config: &ExplorerConfig, kind: LayerKind) -> MultiSource {
    let mut sources: Vec<Box<dyn DataSource>> = Vec::new();
    if let Some(proxy) = &config.places_proxy_url {
        if let Some(places) = PlacesSource::for_layer(proxy.clone(), kind) {
            sources.push(Box::new(places));
        }
    }
    if let Some(osm) = OverpassSource::for_layer(config.overpass_url.clone(), kind) {
        sources.push(Box::new(osm));
    }
    MultiSource::new(sources)
}

fn standard_layers(config: &ExplorerConfig, ctx: &LayerContext) -> Vec<Arc<dyn LayerHandle>> {
    let mut layers = Vec::new();

    for (kind, profile) in [
        (LayerKind::Restaurants, LayerProfile::Dense),
        (LayerKind::Cafes, LayerProfile::Dense),
        (LayerKind::Parking, LayerProfile::Parking),
    ] {
        layers.push(poi_layer(kind, places_and_osm(config, kind), profile, config, ctx));
    }

    for kind in [
        LayerKind::Historic,
        LayerKind::Viewpoints,
        LayerKind::FarmersMarkets,
    ] {
        if let Some(source) = OverpassSource::for_layer(config.overpass_url.clone(), kind) {
            layers.push(poi_layer(kind, source, LayerProfile::Sparse, config, ctx));
        }
    }

    if let Some(url) = &config.news_events_url {
        let source = NewsEventsSource::new(url.clone(), NEWS_TOPIC);
        layers.push(poi_layer(
            LayerKind::NewsEvents,
            source,
            LayerProfile::Events,
            config,
            ctx,
        ));
    }

    if let Some(url) = &config.imagery_proxy_url {
        layers.push(poi_layer(
            LayerKind::Imagery,
            ImagerySource::new(url.clone()),
            LayerProfile::Imagery,
            config,
            ctx,
        ));
    }

    layers.push(Arc::new(TransitLayer::new(TransitCatalog::seattle(), ctx)));
    layers
}
