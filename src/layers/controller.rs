//! The per-layer fetch loop: viewport in, reconciled markers out.
//!
//! One [`LayerController`] is instantiated per point-of-interest layer with
//! its own source, fetch policy and dedup policy. Controllers are cheap
//! handles over shared state, so debounced calls can own a clone.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    core::{
        config::LayerConfig,
        events::{EventBus, MapEvent},
        state::{LayerKind, ToggleStore},
        viewport::Viewport,
    },
    data::{cache::BoundsCache, dedup::Deduplicator, record::GeoRecord},
    input::debounce::Debouncer,
    layers::{
        gate::{FetchGate, GateDecision, SkipReason},
        reconcile,
        surface::MapSurface,
    },
    sources::{transit::TransitCatalog, DataSource, FetchQuery},
    Error, Result,
};

/// What the UI can show about a layer's last fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    pub loading: bool,
    /// Last failure; cleared by the next success
    pub error: Option<String>,
    pub last_fetched: Option<Viewport>,
    pub record_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied {
        added: usize,
        removed: usize,
        total: usize,
    },
    /// A newer request was issued, or the layer was hidden, before this
    /// one resolved; its result was dropped
    Superseded,
    Skipped(SkipReason),
    Hidden,
    /// Nothing to do: no viewport yet, or the toggle did not change
    Idle,
}

/// Shared collaborators every layer is wired to
#[derive(Clone)]
pub struct LayerContext {
    pub surface: Arc<dyn MapSurface>,
    pub bus: EventBus,
    pub toggles: ToggleStore,
}

impl LayerContext {
    pub fn new(surface: Arc<dyn MapSurface>, bus: EventBus, toggles: ToggleStore) -> Self {
        Self {
            surface,
            bus,
            toggles,
        }
    }
}

/// Object-safe view of a layer, so the manager can hold every kind together
#[async_trait]
pub trait LayerHandle: Send + Sync {
    fn kind(&self) -> LayerKind;

    fn state(&self) -> FetchState;

    /// Debounced viewport change
    fn schedule(&self, viewport: Viewport);

    /// Immediate viewport change, still subject to the fetch gate
    async fn handle_viewport(&self, viewport: Viewport) -> Result<RefreshOutcome>;

    /// Off clears markers and cancels pending work; on fetches immediately
    async fn set_visible(&self, visible: bool) -> Result<RefreshOutcome>;

    fn cancel_pending(&self);
}

#[derive(Debug, Default)]
struct ControllerState {
    fetch: FetchState,
    records: Vec<GeoRecord>,
    viewport: Option<Viewport>,
    /// Sequence number of the latest issued request
    issued: u64,
}

struct ControllerInner<S> {
    kind: LayerKind,
    source: S,
    config: LayerConfig,
    gate: FetchGate,
    dedup: Option<Deduplicator>,
    cache: Option<BoundsCache<Vec<GeoRecord>>>,
    ctx: LayerContext,
    debouncer: Debouncer,
    state: Mutex<ControllerState>,
}

/// Generic viewport-driven layer.
///
/// Only the most recently issued request may change what is drawn: a
/// response that resolves after a newer request was issued, or after the
/// layer was hidden, is dropped. A failed fetch leaves the previous records
/// and markers in place and records the error.
pub struct LayerController<S> {
    inner: Arc<ControllerInner<S>>,
}

impl<S> Clone for LayerController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: DataSource + 'static> LayerController<S> {
    pub fn new(kind: LayerKind, source: S, config: LayerConfig, ctx: &LayerContext) -> Self {
        Self::build(kind, source, config, ctx, None)
    }

    /// Controller that reuses results for recently fetched boxes
    pub fn cached(
        kind: LayerKind,
        source: S,
        config: LayerConfig,
        ctx: &LayerContext,
        cache: BoundsCache<Vec<GeoRecord>>,
    ) -> Self {
        Self::build(kind, source, config, ctx, Some(cache))
    }

    fn build(
        kind: LayerKind,
        source: S,
        config: LayerConfig,
        ctx: &LayerContext,
        cache: Option<BoundsCache<Vec<GeoRecord>>>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                kind,
                gate: FetchGate::from_config(&config),
                dedup: config.dedup.clone().map(Deduplicator::new),
                debouncer: Debouncer::new(config.debounce),
                source,
                config,
                cache,
                ctx: ctx.clone(),
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.inner.kind
    }

    pub fn config(&self) -> &LayerConfig {
        &self.inner.config
    }

    pub fn is_visible(&self) -> bool {
        self.inner.ctx.toggles.is_visible(self.inner.kind)
    }

    pub fn state(&self) -> FetchState {
        self.lock_state()
            .map(|s| s.fetch.clone())
            .unwrap_or_default()
    }

    /// Records currently backing the layer's markers
    pub fn records(&self) -> Vec<GeoRecord> {
        self.lock_state()
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Remembers the viewport and handles it once the debounce window is quiet
    pub fn schedule(&self, viewport: Viewport) {
        self.remember(&viewport);
        if !self.is_visible() {
            return;
        }
        let this = self.clone();
        self.inner.debouncer.call(async move {
            let _ = this.handle_viewport(viewport).await;
        });
    }

    pub async fn handle_viewport(&self, viewport: Viewport) -> Result<RefreshOutcome> {
        self.remember(&viewport);
        if !self.is_visible() {
            return Ok(RefreshOutcome::Hidden);
        }

        let decision = {
            let state = self.lock_state()?;
            self.inner
                .gate
                .evaluate(&viewport, state.fetch.last_fetched.as_ref())
        };
        match decision {
            GateDecision::Skip(reason) => {
                log::trace!("{}: skip fetch ({:?})", self.inner.kind, reason);
                Ok(RefreshOutcome::Skipped(reason))
            }
            GateDecision::Fetch(reason) => {
                log::debug!("{}: fetch ({:?}) at z{:.1}", self.inner.kind, reason, viewport.zoom);
                self.run(viewport, true).await
            }
        }
    }

    /// Fetches for `viewport` now, bypassing the gate and the cache
    pub async fn refresh(&self, viewport: Viewport) -> Result<RefreshOutcome> {
        self.remember(&viewport);
        if !self.is_visible() {
            return Ok(RefreshOutcome::Hidden);
        }
        self.run(viewport, false).await
    }

    pub async fn set_visible(&self, visible: bool) -> Result<RefreshOutcome> {
        if !self.inner.ctx.toggles.set_visible(self.inner.kind, visible) {
            return Ok(RefreshOutcome::Idle);
        }
        if !visible {
            self.hide()?;
            return Ok(RefreshOutcome::Hidden);
        }

        // re-enable skips the movement test but keeps the zoom floor
        let viewport = self.lock_state()?.viewport.clone();
        match viewport {
            Some(viewport) if !self.inner.gate.zoom_sufficient(&viewport) => {
                Ok(RefreshOutcome::Skipped(SkipReason::ZoomTooLow))
            }
            Some(viewport) => self.run(viewport, false).await,
            None => Ok(RefreshOutcome::Idle),
        }
    }

    pub fn cancel_pending(&self) {
        self.inner.debouncer.cancel();
    }

    fn hide(&self) -> Result<()> {
        self.inner.debouncer.cancel();
        {
            let mut state = self.lock_state()?;
            state.issued += 1;
            state.records.clear();
            state.fetch = FetchState::default();
        }
        self.inner.ctx.surface.clear_layer(self.inner.kind);
        Ok(())
    }

    fn remember(&self, viewport: &Viewport) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.viewport = Some(viewport.clone());
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| Error::Layer(format!("{}: state lock poisoned", self.inner.kind)))
    }

    async fn run(&self, viewport: Viewport, use_cache: bool) -> Result<RefreshOutcome> {
        let kind = self.inner.kind;
        let seq = {
            let mut state = self.lock_state()?;
            state.issued += 1;
            state.fetch.loading = true;
            state.issued
        };

        let query = FetchQuery::for_viewport(&viewport, self.inner.config.fetch_radius_m);
        let cached = if use_cache {
            self.inner
                .cache
                .as_ref()
                .and_then(|cache| cache.get(&query.bounds))
        } else {
            None
        };
        let result = match cached {
            Some(records) => {
                log::debug!("{}: {} records from cache", kind, records.len());
                Ok(records)
            }
            None => self.fetch(&query).await,
        };

        let mut state = self.lock_state()?;
        if state.issued != seq || !self.is_visible() {
            log::debug!("{}: dropping superseded response #{}", kind, seq);
            return Ok(RefreshOutcome::Superseded);
        }
        state.fetch.loading = false;

        match result {
            Err(e) => {
                log::warn!(
                    "{}: fetch failed, keeping {} records: {}",
                    kind,
                    state.records.len(),
                    e
                );
                let message = e.to_string();
                state.fetch.error = Some(message.clone());
                drop(state);
                self.inner.ctx.bus.publish(MapEvent::LayerFailed {
                    layer: kind,
                    error: message,
                });
                Err(e)
            }
            Ok(records) => {
                let surface = self.inner.ctx.surface.as_ref();
                let plan = reconcile::plan(&surface.marker_ids(kind), &records);
                let (added, removed) = reconcile::apply(surface, kind, plan);
                let total = records.len();
                log::info!("{}: {} records (+{} -{})", kind, total, added, removed);

                state.records = records;
                state.fetch.error = None;
                state.fetch.last_fetched = Some(viewport);
                state.fetch.record_count = total;
                drop(state);

                self.inner.ctx.bus.publish(MapEvent::LayerUpdated {
                    layer: kind,
                    added,
                    removed,
                    total,
                });
                Ok(RefreshOutcome::Applied {
                    added,
                    removed,
                    total,
                })
            }
        }
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let timeout = self.inner.config.fetch_timeout;
        let records = match tokio::time::timeout(timeout, self.inner.source.fetch(query)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(timeout)),
        };

        let fetched = records.len();
        let records = match &self.inner.dedup {
            Some(dedup) => dedup.dedup(records),
            None => records,
        };
        if records.len() < fetched {
            log::debug!(
                "{}: merged {} duplicates",
                self.inner.kind,
                fetched - records.len()
            );
        }

        if let Some(cache) = &self.inner.cache {
            cache.insert(&query.bounds, records.clone());
        }
        Ok(records)
    }
}

#[async_trait]
impl<S: DataSource + 'static> LayerHandle for LayerController<S> {
    fn kind(&self) -> LayerKind {
        LayerController::kind(self)
    }

    fn state(&self) -> FetchState {
        LayerController::state(self)
    }

    fn schedule(&self, viewport: Viewport) {
        LayerController::schedule(self, viewport)
    }

    async fn handle_viewport(&self, viewport: Viewport) -> Result<RefreshOutcome> {
        LayerController::handle_viewport(self, viewport).await
    }

    async fn set_visible(&self, visible: bool) -> Result<RefreshOutcome> {
        LayerController::set_visible(self, visible).await
    }

    fn cancel_pending(&self) {
        LayerController::cancel_pending(self)
    }
}

#[derive(Debug, Default)]
struct TransitState {
    viewport: Option<Viewport>,
    drawn: Vec<String>,
    fetch: FetchState,
}

/// Transit lines drawn from the static catalog.
///
/// Lookups are local, so viewport changes apply immediately without a
/// debounce window or fetch gate.
pub struct TransitLayer {
    catalog: TransitCatalog,
    ctx: LayerContext,
    state: Mutex<TransitState>,
}

impl TransitLayer {
    pub fn new(catalog: TransitCatalog, ctx: &LayerContext) -> Self {
        Self {
            catalog,
            ctx: ctx.clone(),
            state: Mutex::new(TransitState::default()),
        }
    }

    fn is_visible(&self) -> bool {
        self.ctx.toggles.is_visible(LayerKind::Transit)
    }

    fn draw(&self, viewport: Viewport) -> Result<RefreshOutcome> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Layer("transit: state lock poisoned".into()))?;
        state.viewport = Some(viewport.clone());
        if !self.is_visible() {
            return Ok(RefreshOutcome::Hidden);
        }

        let lines = self
            .catalog
            .lines_in(&viewport.bounds, viewport.zoom)
            .into_all();
        let ids: Vec<String> = lines.iter().map(|l| l.id.clone()).collect();
        let added = ids.iter().filter(|id| !state.drawn.contains(id)).count();
        let removed = state.drawn.iter().filter(|id| !ids.contains(id)).count();
        let total = ids.len();

        if added + removed > 0 {
            self.ctx.surface.set_polylines(LayerKind::Transit, lines);
        }
        state.drawn = ids;
        state.fetch = FetchState {
            loading: false,
            error: None,
            last_fetched: Some(viewport),
            record_count: total,
        };
        drop(state);

        if added + removed > 0 {
            self.ctx.bus.publish(MapEvent::LayerUpdated {
                layer: LayerKind::Transit,
                added,
                removed,
                total,
            });
        }
        Ok(RefreshOutcome::Applied {
            added,
            removed,
            total,
        })
    }
}

#[async_trait]
impl LayerHandle for TransitLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Transit
    }

    fn state(&self) -> FetchState {
        self.state
            .lock()
            .map(|s| s.fetch.clone())
            .unwrap_or_default()
    }

    fn schedule(&self, viewport: Viewport) {
        if let Err(e) = self.draw(viewport) {
            log::warn!("transit: {}", e);
        }
    }

    async fn handle_viewport(&self, viewport: Viewport) -> Result<RefreshOutcome> {
        self.draw(viewport)
    }

    async fn set_visible(&self, visible: bool) -> Result<RefreshOutcome> {
        if !self.ctx.toggles.set_visible(LayerKind::Transit, visible) {
            return Ok(RefreshOutcome::Idle);
        }
        if !visible {
            if let Ok(mut state) = self.state.lock() {
                state.drawn.clear();
                state.fetch = FetchState::default();
            }
            self.ctx.surface.clear_layer(LayerKind::Transit);
            return Ok(RefreshOutcome::Hidden);
        }

        let viewport = self.state.lock().ok().and_then(|s| s.viewport.clone());
        match viewport {
            Some(viewport) => self.draw(viewport),
            None => Ok(RefreshOutcome::Idle),
        }
    }

    fn cancel_pending(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::geo::LatLng,
        data::record::{RecordId, Source},
        layers::surface::MemorySurface,
        sources::tests::StubSource,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn setup(visible: &[LayerKind]) -> (LayerContext, Arc<MemorySurface>) {
        let bus = EventBus::new();
        let surface = Arc::new(MemorySurface::new());
        let toggles = ToggleStore::new(bus.clone(), visible);
        (LayerContext::new(surface.clone(), bus, toggles), surface)
    }

    fn seattle() -> Viewport {
        Viewport::from_coords(47.59, -122.35, 47.62, -122.31, 14.0)
    }

    fn far_away() -> Viewport {
        seattle().recentered(LatLng::new(47.68, -122.33))
    }

    fn cafe(native: &str, lat: f64) -> GeoRecord {
        GeoRecord::new(Source::Osm, native, LatLng::new(lat, -122.33)).with_name(native)
    }

    fn config() -> LayerConfig {
        LayerConfig {
            min_zoom: 12.0,
            debounce: Duration::from_millis(500),
            dedup: None,
            ..LayerConfig::default()
        }
    }

    /// Answers each call with the next scripted delay and records
    struct ScriptedSource {
        script: Mutex<VecDeque<(Duration, Vec<GeoRecord>)>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Vec<GeoRecord>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn source(&self) -> Source {
            Source::Osm
        }

        async fn fetch(&self, _query: &FetchQuery) -> Result<Vec<GeoRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, records) = next.unwrap_or_default();
            tokio::time::sleep(delay).await;
            Ok(records)
        }
    }

    #[tokio::test]
    async fn small_move_does_not_refetch() {
        let (ctx, _) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        let first = layer.handle_viewport(seattle()).await.unwrap();
        assert!(matches!(first, RefreshOutcome::Applied { added: 1, .. }));

        let nudged = seattle().recentered(LatLng::new(47.6055, -122.3295));
        let second = layer.handle_viewport(nudged).await.unwrap();

        assert_eq!(second, RefreshOutcome::Skipped(SkipReason::NotMovedEnough));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_zoom_never_fetches() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        let mut zoomed_out = seattle();
        zoomed_out.zoom = 10.0;
        let outcome = layer.handle_viewport(zoomed_out).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Skipped(SkipReason::ZoomTooLow));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 0);
    }

    #[tokio::test]
    async fn toggle_off_then_on_fetches_exactly_once() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60), cafe("b", 47.61)]));
        let layer = LayerController::cached(
            LayerKind::Cafes,
            source.clone(),
            config(),
            &ctx,
            BoundsCache::with_defaults(),
        );
        layer.handle_viewport(seattle()).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(layer.set_visible(false).await.unwrap(), RefreshOutcome::Hidden);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 0);
        assert!(layer.records().is_empty());
        assert_eq!(layer.state(), FetchState::default());

        let outcome = layer.set_visible(true).await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Applied { added: 2, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 2);

        // already visible: no extra fetch
        assert_eq!(layer.set_visible(true).await.unwrap(), RefreshOutcome::Idle);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn toggle_on_below_min_zoom_does_not_fetch() {
        let (ctx, surface) = setup(&[]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        let mut zoomed_out = seattle();
        zoomed_out.zoom = 8.0;
        assert_eq!(layer.handle_viewport(zoomed_out).await.unwrap(), RefreshOutcome::Hidden);

        let outcome = layer.set_visible(true).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Skipped(SkipReason::ZoomTooLow));
        assert!(layer.is_visible());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 0);
    }

    #[tokio::test]
    async fn hidden_layer_ignores_viewports() {
        let (ctx, _) = setup(&[]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        assert_eq!(layer.handle_viewport(seattle()).await.unwrap(), RefreshOutcome::Hidden);
        layer.schedule(far_away());
        assert!(!layer.is_pending());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        // the last viewport is still what a later toggle-on fetches for
        layer.set_visible(true).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(layer.state().last_fetched, Some(far_away()));
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_does_not_overwrite_newer_one() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(5), vec![cafe("old", 47.60)]),
            (Duration::from_secs(1), vec![cafe("new", 47.68)]),
        ]);
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        let (first, second) = tokio::join!(layer.refresh(seattle()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            layer.refresh(far_away()).await
        });

        assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
        assert!(matches!(second.unwrap(), RefreshOutcome::Applied { total: 1, .. }));
        let ids = surface.marker_ids(LayerKind::Cafes);
        assert!(ids.contains(&RecordId::new(Source::Osm, "new")));
        assert!(!ids.contains(&RecordId::new(Source::Osm, "old")));
        assert_eq!(layer.state().last_fetched, Some(far_away()));
        assert!(!layer.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn response_after_hide_is_dropped() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let source = ScriptedSource::new(vec![(Duration::from_secs(3), vec![cafe("a", 47.60)])]);
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        let (fetched, hidden) = tokio::join!(layer.refresh(seattle()), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            layer.set_visible(false).await
        });

        assert_eq!(hidden.unwrap(), RefreshOutcome::Hidden);
        assert_eq!(fetched.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(surface.marker_count(LayerKind::Cafes), 0);
    }

    #[tokio::test]
    async fn failure_keeps_previous_markers() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let events = ctx.bus.subscribe();
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);
        layer.handle_viewport(seattle()).await.unwrap();

        *source.result.lock().unwrap() = Err(Error::Upstream {
            status: 502,
            body: "bad gateway".into(),
        });
        let err = layer.handle_viewport(far_away()).await;

        assert!(err.is_err());
        assert_eq!(surface.marker_count(LayerKind::Cafes), 1);
        assert_eq!(layer.records().len(), 1);
        let state = layer.state();
        assert!(state.error.is_some());
        assert!(!state.loading);
        assert_eq!(state.last_fetched, Some(seattle()));
        assert!(events
            .try_iter()
            .any(|e| matches!(e, MapEvent::LayerFailed { layer: LayerKind::Cafes, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let (ctx, _) = setup(&[LayerKind::Cafes]);
        let source = ScriptedSource::new(vec![(Duration::from_secs(60), vec![cafe("a", 47.60)])]);
        let layer = LayerController::new(
            LayerKind::Cafes,
            source,
            LayerConfig {
                fetch_timeout: Duration::from_secs(10),
                ..config()
            },
            &ctx,
        );

        let err = layer.refresh(seattle()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn revisited_box_comes_from_cache() {
        let (ctx, _) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::cached(
            LayerKind::Cafes,
            source.clone(),
            config(),
            &ctx,
            BoundsCache::new(8, Duration::from_secs(600)),
        );

        layer.handle_viewport(seattle()).await.unwrap();
        layer.handle_viewport(far_away()).await.unwrap();
        let back = layer.handle_viewport(seattle()).await.unwrap();

        assert!(matches!(back, RefreshOutcome::Applied { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicates_are_merged_before_drawing() {
        let (ctx, surface) = setup(&[LayerKind::Cafes]);
        let google = GeoRecord::new(Source::Google, "g1", LatLng::new(47.60000, -122.33000))
            .with_name("Joe's Cafe")
            .with_rating(4.5);
        let osm = GeoRecord::new(Source::Osm, "node/1", LatLng::new(47.60005, -122.33003))
            .with_name("Joe's Cafe");
        let source = Arc::new(StubSource::ok(Source::Google, vec![osm, google]));
        let layer = LayerController::new(
            LayerKind::Cafes,
            source,
            LayerConfig {
                dedup: Some(Default::default()),
                ..config()
            },
            &ctx,
        );

        layer.handle_viewport(seattle()).await.unwrap();

        let ids = surface.marker_ids(LayerKind::Cafes);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&RecordId::new(Source::Google, "g1")));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_schedules_fetches_once() {
        let (ctx, _) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        for step in 0..5 {
            let lat = 47.60 + step as f64 * 0.02;
            layer.schedule(seattle().recentered(LatLng::new(lat, -122.33)));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let fetched = layer.state().last_fetched.unwrap();
        assert!((fetched.center().lat - 47.68).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn hiding_cancels_pending_schedule() {
        let (ctx, _) = setup(&[LayerKind::Cafes]);
        let source = Arc::new(StubSource::ok(Source::Osm, vec![cafe("a", 47.60)]));
        let layer = LayerController::new(LayerKind::Cafes, source.clone(), config(), &ctx);

        layer.schedule(seattle());
        assert!(layer.is_pending());
        layer.set_visible(false).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transit_layer_draws_catalog_lines() {
        let (ctx, surface) = setup(&[LayerKind::Transit]);
        let layer = TransitLayer::new(TransitCatalog::seattle(), &ctx);

        let viewport = Viewport::from_coords(47.5, -122.4, 47.7, -122.2, 13.0);
        let outcome = layer.handle_viewport(viewport.clone()).await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Applied { added, .. } if added > 0));
        assert!(!surface.polylines(LayerKind::Transit).is_empty());

        let elsewhere = Viewport::from_coords(39.0, -75.0, 40.0, -74.0, 13.0);
        layer.handle_viewport(elsewhere).await.unwrap();
        assert!(surface.polylines(LayerKind::Transit).is_empty());
        assert_eq!(layer.state().record_count, 0);

        layer.handle_viewport(viewport).await.unwrap();
        layer.set_visible(false).await.unwrap();
        assert!(surface.polylines(LayerKind::Transit).is_empty());
        layer.set_visible(true).await.unwrap();
        assert!(!surface.polylines(LayerKind::Transit).is_empty());
    }
}
