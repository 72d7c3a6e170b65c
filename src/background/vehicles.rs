//! Live vehicle positions, polled on a fixed interval rather than per viewport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::{self, MissedTickBehavior};

use crate::{
    core::{
        events::{EventBus, MapEvent},
        state::{LayerKind, ToggleStore},
        viewport::Viewport,
    },
    data::record::RecordId,
    layers::{
        controller::{FetchState, LayerHandle, RefreshOutcome},
        marker::Marker,
        reconcile::{self, plan_tracked},
        surface::MapSurface,
    },
    prelude::HashMap,
    runtime::{self, AsyncHandle},
    sources::gtfs::{Vehicle, VehicleFeed},
    Error,
};

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub vehicles: usize,
    pub failed_feeds: Vec<String>,
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

struct PollerInner {
    feeds: Vec<Arc<dyn VehicleFeed>>,
    surface: Arc<dyn MapSurface>,
    bus: EventBus,
    toggles: ToggleStore,
    interval: Duration,
    timeout: Duration,
    drawn: Mutex<HashMap<RecordId, Marker>>,
    last_report: Mutex<PollReport>,
}

impl PollerInner {
    async fn fetch_feed(&self, feed: &dyn VehicleFeed) -> Result<Vec<Vehicle>, Error> {
        match time::timeout(self.timeout, feed.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    fn clear(&self) {
        let had_markers = self
            .drawn
            .lock()
            .map(|mut drawn| {
                let had = !drawn.is_empty();
                drawn.clear();
                had
            })
            .unwrap_or(false);
        if had_markers {
            self.surface.clear_layer(LayerKind::Vehicles);
        }
        if let Ok(mut last) = self.last_report.lock() {
            *last = PollReport::default();
        }
    }

    async fn poll_once(&self) -> PollReport {
        if !self.toggles.is_visible(LayerKind::Vehicles) {
            self.clear();
            return PollReport::default();
        }

        let results = join_all(self.feeds.iter().map(|feed| self.fetch_feed(feed.as_ref()))).await;

        let mut vehicles = Vec::new();
        let mut failed_feeds = Vec::new();
        for (feed, result) in self.feeds.iter().zip(results) {
            match result {
                Ok(mut batch) => {
                    log::debug!("feed {}: {} vehicles", feed.name(), batch.len());
                    vehicles.append(&mut batch);
                }
                Err(e) => {
                    log::warn!("vehicle feed {} failed: {}", feed.name(), e);
                    failed_feeds.push(feed.name().to_string());
                }
            }
        }

        // hidden while the feeds were in flight
        if !self.toggles.is_visible(LayerKind::Vehicles) {
            self.clear();
            return PollReport::default();
        }

        let markers: Vec<Marker> = vehicles.iter().map(Marker::from_vehicle).collect();
        let mut report = PollReport {
            vehicles: vehicles.len(),
            failed_feeds,
            ..PollReport::default()
        };

        if let Ok(mut drawn) = self.drawn.lock() {
            let plan = plan_tracked(&drawn, markers.clone());
            report.updated = plan.to_update.len();
            let (added, removed) = reconcile::apply(self.surface.as_ref(), LayerKind::Vehicles, plan);
            report.added = added;
            report.removed = removed;
            *drawn = markers
                .into_iter()
                .map(|m| (m.record_id().clone(), m))
                .collect();
        }

        if let Ok(mut last) = self.last_report.lock() {
            *last = report.clone();
        }
        self.bus.publish(MapEvent::VehiclesUpdated {
            count: report.vehicles,
            failed_feeds: report.failed_feeds.len(),
        });
        report
    }
}

/// Polls every configured GTFS-Realtime feed concurrently and keeps the
/// `Vehicles` layer group in sync with the combined result.
///
/// A failed or timed-out feed contributes nothing for that cycle; the next
/// tick is the only retry.
pub struct VehiclePoller {
    inner: Arc<PollerInner>,
    task: Mutex<Option<Box<dyn AsyncHandle>>>,
}

impl VehiclePoller {
    pub fn new(
        feeds: Vec<Arc<dyn VehicleFeed>>,
        surface: Arc<dyn MapSurface>,
        bus: EventBus,
        toggles: ToggleStore,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                feeds,
                surface,
                bus,
                toggles,
                interval,
                timeout,
                drawn: Mutex::new(HashMap::default()),
                last_report: Mutex::new(PollReport::default()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn feed_count(&self) -> usize {
        self.inner.feeds.len()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub async fn poll_once(&self) -> PollReport {
        self.inner.poll_once().await
    }

    /// Starts the polling loop; the first poll runs immediately
    pub fn start(&self) {
        let Ok(mut task) = self.task.lock() else {
            return;
        };
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }

        let inner = self.inner.clone();
        log::info!(
            "polling {} vehicle feeds every {:?}",
            inner.feeds.len(),
            inner.interval
        );
        *task = Some(runtime::spawn(async move {
            let mut ticker = time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.poll_once().await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.cancel();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .ok()
            .and_then(|task| task.as_ref().map(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Removes every vehicle marker and forgets them
    pub fn clear(&self) {
        self.inner.clear();
    }
}

/// Vehicles are polled on the interval, never per viewport
#[async_trait]
impl LayerHandle for VehiclePoller {
    fn kind(&self) -> LayerKind {
        LayerKind::Vehicles
    }

    fn state(&self) -> FetchState {
        let report = self
            .inner
            .last_report
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();
        FetchState {
            loading: false,
            error: (!report.failed_feeds.is_empty())
                .then(|| format!("feeds failed: {}", report.failed_feeds.join(", "))),
            last_fetched: None,
            record_count: report.vehicles,
        }
    }

    fn schedule(&self, _viewport: Viewport) {}

    async fn handle_viewport(&self, _viewport: Viewport) -> crate::Result<RefreshOutcome> {
        Ok(RefreshOutcome::Idle)
    }

    async fn set_visible(&self, visible: bool) -> crate::Result<RefreshOutcome> {
        if !self.inner.toggles.set_visible(LayerKind::Vehicles, visible) {
            return Ok(RefreshOutcome::Idle);
        }
        if !visible {
            self.clear();
            return Ok(RefreshOutcome::Hidden);
        }
        let report = self.poll_once().await;
        Ok(RefreshOutcome::Applied {
            added: report.added,
            removed: report.removed,
            total: report.vehicles,
        })
    }

    fn cancel_pending(&self) {}
}

impl Drop for VehiclePoller {
    fn drop(&mut self) {
        self.stop();
    }
}
