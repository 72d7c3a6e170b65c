//! Merges records that describe the same real-world place.
//!
//! Records are ranked best-first by a total order (source priority, metadata
//! completeness, rating, id) and visited in that order. A record is dropped
//! when an already kept record lies within `delta_deg` on both axes and, when
//! names are compared, has a compatible name. Because the visit order depends
//! only on the ranking, the output does not depend on input order, and
//! running the deduplicator on its own output changes nothing.
//!
//! The proximity test is a fixed decimal-degree box, which stretches east-west
//! at high latitudes. For city-scale layers this is accepted.

use std::cmp::Ordering;

use rstar::{primitives::GeomWithData, RTree, AABB};

use crate::core::constants::DEFAULT_DEDUP_DELTA_DEG;
use crate::data::record::GeoRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct DedupPolicy {
    /// Half-width of the proximity box, in degrees
    pub delta_deg: f64,
    /// Require compatible names in addition to proximity
    pub match_names: bool,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            delta_deg: DEFAULT_DEDUP_DELTA_DEG,
            match_names: true,
        }
    }
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    policy: DedupPolicy,
}

impl Deduplicator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    /// Returns one representative per group, best-ranked first
    pub fn dedup(&self, mut records: Vec<GeoRecord>) -> Vec<GeoRecord> {
        let input_len = records.len();
        records.sort_by(rank);

        let mut kept: Vec<GeoRecord> = Vec::with_capacity(records.len());
        let mut kept_names: Vec<Option<String>> = Vec::with_capacity(records.len());
        let mut index: RTree<IndexedPoint> = RTree::new();
        let d = self.policy.delta_deg;

        for record in records {
            let p = [record.position.lng, record.position.lat];
            let envelope = AABB::from_corners([p[0] - d, p[1] - d], [p[0] + d, p[1] + d]);
            let name = record.name.as_deref().map(normalize_name);

            let duplicate_of = index
                .locate_in_envelope(&envelope)
                .map(|candidate| candidate.data)
                .filter(|&i| !self.policy.match_names || names_compatible(&kept_names[i], &name))
                .min();

            match duplicate_of {
                Some(i) => {
                    log::trace!("{} merged into {}", record.id, kept[i].id);
                }
                None => {
                    index.insert(GeomWithData::new(p, kept.len()));
                    kept_names.push(name);
                    kept.push(record);
                }
            }
        }

        if kept.len() < input_len {
            log::debug!("dedup: {} records -> {}", input_len, kept.len());
        }
        kept
    }
}

/// Total order, best record first
fn rank(a: &GeoRecord, b: &GeoRecord) -> Ordering {
    b.source
        .priority()
        .cmp(&a.source.priority())
        .then_with(|| b.completeness_score().cmp(&a.completeness_score()))
        .then_with(|| {
            let ra = a.rating.unwrap_or(f32::NEG_INFINITY);
            let rb = b.rating.unwrap_or(f32::NEG_INFINITY);
            rb.total_cmp(&ra)
        })
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.position.lat.total_cmp(&b.position.lat))
        .then_with(|| a.position.lng.total_cmp(&b.position.lng))
}

/// Lowercase alphanumerics only, so "Joe's Café" and "joes cafe" compare equal
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            'é' | 'è' | 'ê' | 'É' => Some('e'),
            'á' | 'à' | 'â' => Some('a'),
            c if c.is_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}

fn names_compatible(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref(), b.as_deref()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            a == b || a.contains(b) || b.contains(a)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::data::record::Source;

    fn cafe(source: Source, id: &str, lat: f64, lng: f64, name: &str) -> GeoRecord {
        GeoRecord::new(source, id, LatLng::new(lat, lng)).with_name(name)
    }

    fn ids(records: &[GeoRecord]) -> Vec<String> {
        let mut ids: Vec<_> = records.iter().map(|r| r.id.to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn google_wins_over_nearby_osm_duplicate() {
        // ~8 m apart along the meridian
        let google = cafe(Source::Google, "g1", 47.61000, -122.33000, "Joe's Cafe").with_rating(4.5);
        let osm = cafe(Source::Osm, "node/1", 47.61007, -122.33000, "Joe's Cafe").with_rating(0.0);

        let out = Deduplicator::default().dedup(vec![osm, google]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, Source::Google);
        assert_eq!(out[0].rating, Some(4.5));
    }

    #[test]
    fn different_names_stay_apart_when_matching_names() {
        let a = cafe(Source::Osm, "node/1", 47.61, -122.33, "Joe's Cafe");
        let b = cafe(Source::Osm, "node/2", 47.61005, -122.33, "Tea House");

        assert_eq!(Deduplicator::default().dedup(vec![a.clone(), b.clone()]).len(), 2);

        let positional = Deduplicator::new(DedupPolicy {
            match_names: false,
            ..DedupPolicy::default()
        });
        assert_eq!(positional.dedup(vec![a, b]).len(), 1);
    }

    #[test]
    fn far_apart_records_are_kept() {
        let a = cafe(Source::Google, "g1", 47.61, -122.33, "Joe's Cafe");
        let b = cafe(Source::Osm, "node/1", 47.62, -122.33, "Joe's Cafe");
        assert_eq!(Deduplicator::default().dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn richer_parking_record_wins() {
        let bare = GeoRecord::new(Source::Osm, "node/1", LatLng::new(47.6, -122.3));
        let rich = GeoRecord::new(Source::Osm, "way/9", LatLng::new(47.60005, -122.3))
            .with_property("capacity", "40")
            .with_property("maxstay", "2 hours");

        let dedup = Deduplicator::new(DedupPolicy {
            delta_deg: 0.0002,
            match_names: false,
        });
        let out = dedup.dedup(vec![bare, rich]);

        assert_eq!(ids(&out), vec!["osm:way/9".to_string()]);
    }

    fn sample() -> Vec<GeoRecord> {
        vec![
            cafe(Source::Osm, "node/1", 47.6100, -122.3300, "Joe's Cafe"),
            cafe(Source::Google, "g1", 47.61002, -122.33001, "Joe's Café").with_rating(4.2),
            cafe(Source::Osm, "node/2", 47.6102, -122.3302, "Joe's"),
            cafe(Source::Osm, "node/3", 47.6150, -122.3350, "Victrola"),
            cafe(Source::Google, "g2", 47.61502, -122.33502, "Victrola Coffee").with_rating(4.6),
            cafe(Source::Osm, "node/4", 47.6200, -122.3400, "Analog"),
            GeoRecord::new(Source::Osm, "node/5", LatLng::new(47.62001, -122.34)),
        ]
    }

    #[test]
    fn dedup_is_idempotent() {
        let dedup = Deduplicator::default();
        let once = dedup.dedup(sample());
        let twice = dedup.dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn dedup_ignores_input_order() {
        let dedup = Deduplicator::default();
        let forward = dedup.dedup(sample());

        let mut reversed = sample();
        reversed.reverse();
        let mut rotated = sample();
        rotated.rotate_left(3);

        assert_eq!(forward, dedup.dedup(reversed));
        assert_eq!(forward, dedup.dedup(rotated));
        assert_eq!(
            ids(&forward),
            vec!["google:g1", "google:g2", "osm:node/4"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("Joe's Café"), "joescafe");
        assert!(names_compatible(&Some("joes".into()), &Some("joescafe".into())));
        assert!(names_compatible(&None, &Some("joescafe".into())));
        assert!(!names_compatible(&Some("victrola".into()), &Some("analog".into())));
    }
}
