//! Static catalog of Seattle rapid transit lines.

use serde::{Deserialize, Serialize};

use crate::{
    core::{
        constants::TRANSIT_MIN_ZOOM,
        geo::{LatLng, LatLngBounds},
    },
    layers::marker::Polyline,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitMode {
    Subway,
    Bus,
    Tram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitLine {
    pub id: &'static str,
    pub name: &'static str,
    pub mode: TransitMode,
    pub color: &'static str,
    pub points: Vec<LatLng>,
    bounds: Option<LatLngBounds>,
}

impl TransitLine {
    fn new(
        id: &'static str,
        name: &'static str,
        mode: TransitMode,
        color: &'static str,
        coords: &[(f64, f64)],
    ) -> Self {
        let points: Vec<LatLng> = coords.iter().map(|&(lat, lng)| LatLng::new(lat, lng)).collect();
        let bounds = LatLngBounds::from_points(&points);
        Self {
            id,
            name,
            mode,
            color,
            points,
            bounds,
        }
    }

    /// A vertex inside `bounds`, or the line's own extent crossing it
    pub fn is_visible_in(&self, bounds: &LatLngBounds) -> bool {
        self.points.iter().any(|p| bounds.contains(p))
            || self
                .bounds
                .as_ref()
                .map(|b| b.intersects(bounds))
                .unwrap_or(false)
    }

    pub fn to_polyline(&self) -> Polyline {
        Polyline {
            id: self.id.to_string(),
            label: self.name.to_string(),
            color: self.color.to_string(),
            points: self.points.clone(),
        }
    }
}

/// Lines visible in a viewport, grouped by mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitLines {
    pub subway: Vec<Polyline>,
    pub bus: Vec<Polyline>,
    pub tram: Vec<Polyline>,
}

impl TransitLines {
    pub fn is_empty(&self) -> bool {
        self.subway.is_empty() && self.bus.is_empty() && self.tram.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subway.len() + self.bus.len() + self.tram.len()
    }

    pub fn into_all(self) -> Vec<Polyline> {
        let mut all = self.subway;
        all.extend(self.bus);
        all.extend(self.tram);
        all
    }
}

#[derive(Debug, Clone)]
pub struct TransitCatalog {
    lines: Vec<TransitLine>,
    min_zoom: f64,
}

impl TransitCatalog {
    pub fn new(lines: Vec<TransitLine>) -> Self {
        Self {
            lines,
            min_zoom: TRANSIT_MIN_ZOOM,
        }
    }

    pub fn seattle() -> Self {
        use TransitMode::*;
        Self::new(vec![
            TransitLine::new(
                "link-1",
                "1 Line",
                Subway,
                "#28813F",
                &[
                    (47.7063, -122.3282),
                    (47.6764, -122.3159),
                    (47.6600, -122.3140),
                    (47.6495, -122.3038),
                    (47.6192, -122.3205),
                    (47.6116, -122.3371),
                    (47.6076, -122.3361),
                    (47.6024, -122.3317),
                    (47.5982, -122.3282),
                    (47.5913, -122.3274),
                    (47.5807, -122.3272),
                    (47.5680, -122.3117),
                    (47.5769, -122.2977),
                    (47.5597, -122.2925),
                    (47.5381, -122.2815),
                    (47.5225, -122.2793),
                    (47.4641, -122.2880),
                    (47.4450, -122.2966),
                ],
            ),
            TransitLine::new(
                "link-2",
                "2 Line",
                Subway,
                "#007CAD",
                &[
                    (47.5866, -122.1905),
                    (47.6083, -122.1912),
                    (47.6152, -122.1914),
                    (47.6178, -122.1836),
                    (47.6237, -122.1786),
                    (47.6249, -122.1648),
                    (47.6360, -122.1383),
                    (47.6447, -122.1334),
                ],
            ),
            TransitLine::new(
                "rapidride-c",
                "RapidRide C Line",
                Bus,
                "#B61F24",
                &[
                    (47.5213, -122.3640),
                    (47.5611, -122.3868),
                    (47.5800, -122.3600),
                    (47.6050, -122.3350),
                    (47.6225, -122.3385),
                ],
            ),
            TransitLine::new(
                "rapidride-d",
                "RapidRide D Line",
                Bus,
                "#B61F24",
                &[
                    (47.6906, -122.3763),
                    (47.6687, -122.3763),
                    (47.6430, -122.3760),
                    (47.6245, -122.3560),
                    (47.6070, -122.3385),
                ],
            ),
            TransitLine::new(
                "rapidride-e",
                "RapidRide E Line",
                Bus,
                "#B61F24",
                &[
                    (47.7740, -122.3410),
                    (47.6907, -122.3447),
                    (47.6186, -122.3440),
                    (47.6050, -122.3350),
                ],
            ),
            TransitLine::new(
                "rapidride-h",
                "RapidRide H Line",
                Bus,
                "#B61F24",
                &[
                    (47.4700, -122.3380),
                    (47.5170, -122.3550),
                    (47.5700, -122.3630),
                    (47.6000, -122.3300),
                ],
            ),
            TransitLine::new(
                "streetcar-slu",
                "South Lake Union Streetcar",
                Tram,
                "#F36F21",
                &[
                    (47.6138, -122.3378),
                    (47.6186, -122.3375),
                    (47.6267, -122.3374),
                    (47.6275, -122.3313),
                ],
            ),
            TransitLine::new(
                "streetcar-fh",
                "First Hill Streetcar",
                Tram,
                "#F36F21",
                &[
                    (47.6017, -122.3321),
                    (47.5980, -122.3260),
                    (47.6018, -122.3146),
                    (47.6130, -122.3208),
                    (47.6192, -122.3210),
                ],
            ),
        ])
    }

    pub fn with_min_zoom(mut self, min_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self
    }

    pub fn lines(&self) -> &[TransitLine] {
        &self.lines
    }

    pub fn lines_in(&self, bounds: &LatLngBounds, zoom: f64) -> TransitLines {
        let mut out = TransitLines::default();
        if zoom < self.min_zoom {
            return out;
        }
        for line in self.lines.iter().filter(|l| l.is_visible_in(bounds)) {
            let group = match line.mode {
                TransitMode::Subway => &mut out.subway,
                TransitMode::Bus => &mut out.bus,
                TransitMode::Tram => &mut out.tram,
            };
            group.push(line.to_polyline());
        }
        out
    }
}

impl Default for TransitCatalog {
    fn default() -> Self {
        Self::seattle()
    }
}
