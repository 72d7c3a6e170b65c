//! Upstream geodata APIs, each normalized into [`GeoRecord`]s.

pub mod gtfs;
pub mod http;
pub mod imagery;
pub mod news;
pub mod overpass;
pub mod places;
pub mod transit;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::{
    core::{
        geo::{LatLng, LatLngBounds},
        viewport::Viewport,
    },
    data::record::{GeoRecord, Source},
    Result,
};

/// What a layer asks its source for
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    pub center: LatLng,
    pub radius_m: f64,
    pub bounds: LatLngBounds,
    pub zoom: f64,
}

impl FetchQuery {
    /// Query centred on the viewport with a fixed radius
    pub fn for_viewport(viewport: &Viewport, radius_m: f64) -> Self {
        let center = viewport.center();
        Self {
            center,
            radius_m,
            bounds: LatLngBounds::around(center, radius_m),
            zoom: viewport.zoom,
        }
    }
}

/// One upstream API for one layer
#[async_trait]
pub trait DataSource: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>>;
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn source(&self) -> Source {
        (**self).source()
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        (**self).fetch(query).await
    }
}

/// Several sources for one layer, queried concurrently.
///
/// Every source settles independently; the records of whichever succeed are
/// concatenated. Only when all of them fail does the fetch fail.
pub struct MultiSource {
    sources: Vec<Box<dyn DataSource>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn DataSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl DataSource for MultiSource {
    /// Highest-priority member, used for logging only
    fn source(&self) -> Source {
        self.sources
            .iter()
            .map(|s| s.source())
            .max_by_key(|s| s.priority())
            .unwrap_or(Source::Catalog)
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<GeoRecord>> {
        let results = join_all(self.sources.iter().map(|s| s.fetch(query))).await;

        let mut records = Vec::new();
        let mut failures = 0;
        let mut last_error = None;
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(mut batch) => {
                    log::debug!("{}: {} records", source.source(), batch.len());
                    records.append(&mut batch);
                }
                Err(e) => {
                    log::warn!("{} source failed: {}", source.source(), e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failures == self.sources.len() => {
                log::error!("all {} sources failed", failures);
                Err(e)
            }
            _ => Ok(records),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned source for tests; counts calls
    pub(crate) struct StubSource {
        pub source: Source,
        pub result: std::sync::Mutex<Result<Vec<GeoRecord>>>,
        pub calls: AtomicUsize,
    }

    impl StubSource {
        pub fn ok(source: Source, records: Vec<GeoRecord>) -> Self {
            Self {
                source,
                result: std::sync::Mutex::new(Ok(records)),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(source: Source) -> Self {
            Self {
                source,
                result: std::sync::Mutex::new(Err(Error::Upstream {
                    status: 502,
                    body: "bad gateway".into(),
                })),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DataSource for StubSource {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch(&self, _query: &FetchQuery) -> Result<Vec<GeoRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.result.lock().unwrap() {
                Ok(records) => Ok(records.clone()),
                Err(e) => Err(Error::Layer(e.to_string())),
            }
        }
    }

    fn query() -> FetchQuery {
        FetchQuery::for_viewport(&Viewport::from_coords(47.5, -122.4, 47.7, -122.2, 13.0), 2_000.0)
    }

    fn record(source: Source, id: &str) -> GeoRecord {
        GeoRecord::new(source, id, LatLng::new(47.6, -122.3))
    }

    #[tokio::test]
    async fn one_failing_source_does_not_block_the_other() {
        let multi = MultiSource::new(vec![
            Box::new(StubSource::failing(Source::Google)),
            Box::new(StubSource::ok(Source::Osm, vec![record(Source::Osm, "node/1")])),
        ]);

        let records = multi.fetch(&query()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Osm);
        assert_eq!(multi.source(), Source::Google);
    }

    #[tokio::test]
    async fn all_sources_failing_is_an_error() {
        let multi = MultiSource::new(vec![
            Box::new(StubSource::failing(Source::Google)),
            Box::new(StubSource::failing(Source::Osm)),
        ]);
        assert!(multi.fetch(&query()).await.is_err());
    }

    #[tokio::test]
    async fn empty_success_is_not_an_error() {
        let multi = MultiSource::new(vec![
            Box::new(StubSource::failing(Source::Google)),
            Box::new(StubSource::ok(Source::Osm, Vec::new())),
        ]);
        assert!(multi.fetch(&query()).await.unwrap().is_empty());
    }

    #[test]
    fn query_is_centred_on_viewport() {
        let q = query();
        assert!((q.center.lat - 47.6).abs() < 1e-9);
        assert!(q.bounds.contains(&q.center));
        assert_eq!(q.zoom, 13.0);
    }
}
