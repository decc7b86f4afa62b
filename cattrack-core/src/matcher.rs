//! Spatial matching of unit representative points against risk polygons
//!
//! Global invariants enforced:
//! - The point index is built once per run, never per polygon
//! - Bounding-box prefilter before any exact containment test
//! - Days are matched independently; no cross-day caching
//! - A malformed polygon is skipped with a warning, never aborts a day
//! - Candidate order is deterministic (polygon order, then unit id)

use crate::geometry::validate_multipolygon;
use crate::polygon::{GeometryWarning, RiskPolygon};
use crate::units::Unit;
use geo::{BoundingRect, Contains, Rect};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Points sorted by longitude for range queries.
///
/// A bounding-box query binary-searches the longitude band and filters the
/// band by latitude.
#[derive(Debug, Clone)]
pub struct PointIndex {
    /// (x, y, position in the unit slice), ordered by x
    entries: Vec<(f64, f64, usize)>,
}

impl PointIndex {
    pub fn build(units: &[Unit]) -> Self {
        let mut entries: Vec<(f64, f64, usize)> = units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.point.x().is_finite() && u.point.y().is_finite())
            .map(|(i, u)| (u.point.x(), u.point.y(), i))
            .collect();
        entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));
        PointIndex { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Positions of every point inside `rect` (edges inclusive)
    pub fn query(&self, rect: &Rect<f64>) -> impl Iterator<Item = usize> + '_ {
        let (min, max) = (rect.min(), rect.max());
        let start = self.entries.partition_point(|e| e.0 < min.x);
        let end = self.entries.partition_point(|e| e.0 <= max.x);
        self.entries[start..end]
            .iter()
            .filter(move |e| e.1 >= min.y && e.1 <= max.y)
            .map(|e| e.2)
    }
}

/// One (unit, polygon) membership
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate<'a> {
    pub unit: &'a Unit,
    pub polygon: &'a RiskPolygon,
}

/// Every membership found for one forecast day
#[derive(Debug, Clone, Default)]
pub struct DayMatches<'a> {
    pub day: u8,
    pub candidates: Vec<MatchCandidate<'a>>,
    pub warnings: Vec<GeometryWarning>,
}

/// Units (by position) whose point lies inside any part of `polygon`.
fn units_inside(polygon: &RiskPolygon, units: &[Unit], index: &PointIndex) -> BTreeSet<usize> {
    let mut hits = BTreeSet::new();
    for part in polygon.geometry.iter() {
        let Some(bbox) = part.bounding_rect() else {
            continue;
        };
        for i in index.query(&bbox) {
            if !hits.contains(&i) && part.contains(&units[i].point) {
                hits.insert(i);
            }
        }
    }
    hits
}

/// Match one day's polygons against the unit points.
pub fn match_day<'a>(
    day: u8,
    polygons: &'a [RiskPolygon],
    units: &'a [Unit],
    index: &PointIndex,
) -> DayMatches<'a> {
    let mut matches = DayMatches {
        day,
        ..Default::default()
    };

    for polygon in polygons {
        if let Err(e) = validate_multipolygon(&polygon.geometry) {
            warn!(
                day,
                hazard = %polygon.hazard,
                label = %polygon.raw_label,
                error = %e,
                "skipping malformed polygon"
            );
            matches.warnings.push(GeometryWarning {
                day,
                hazard: polygon.hazard,
                label: polygon.raw_label.clone(),
                reason: e.to_string(),
            });
            continue;
        }

        let hits = units_inside(polygon, units, index);
        matches
            .candidates
            .extend(hits.into_iter().map(|i| MatchCandidate {
                unit: &units[i],
                polygon,
            }));
    }

    debug!(day, candidates = matches.candidates.len(), "matched day");
    matches
}

/// Match every day in parallel. The returned map is ordered by day.
pub fn match_all<'a>(
    polygons_by_day: &'a BTreeMap<u8, Vec<RiskPolygon>>,
    units: &'a [Unit],
) -> BTreeMap<u8, DayMatches<'a>> {
    let index = PointIndex::build(units);
    polygons_by_day
        .par_iter()
        .map(|(day, polygons)| (*day, match_day(*day, polygons, units, &index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::HazardCategory;
    use geo::{coord, point, polygon, LineString, MultiPolygon, Polygon};

    fn unit(id: &str, x: f64, y: f64) -> Unit {
        Unit::new(id, "Test", "TX", point!(x: x, y: y)).unwrap()
    }

    fn rect_poly(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
    }

    fn risk(parts: Vec<Polygon<f64>>, label: &str) -> RiskPolygon {
        RiskPolygon::from_label(MultiPolygon::new(parts), 1, HazardCategory::Categorical, label)
            .unwrap()
    }

    #[test]
    fn test_index_query_is_inclusive_band() {
        let units = vec![
            unit("00001", 0.0, 0.0),
            unit("00002", 5.0, 5.0),
            unit("00003", 10.0, 0.0),
        ];
        let index = PointIndex::build(&units);
        let rect = Rect::new(coord! { x: 0.0, y: -1.0 }, coord! { x: 5.0, y: 1.0 });
        let hits: Vec<usize> = index.query(&rect).collect();
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn test_match_inside_and_outside() {
        let units = vec![unit("00001", 1.0, 1.0), unit("00002", 5.0, 5.0)];
        let polygons = vec![risk(vec![rect_poly(0.0, 0.0, 2.0, 2.0)], "ENH")];
        let index = PointIndex::build(&units);
        let matches = match_day(1, &polygons, &units, &index);
        assert_eq!(matches.candidates.len(), 1);
        assert_eq!(matches.candidates[0].unit.id, "00001");
    }

    #[test]
    fn test_point_in_bbox_but_outside_polygon() {
        // Inside the bounding box, beyond the hypotenuse
        let triangle = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];
        let units = vec![unit("00001", 1.8, 1.8)];
        let polygons = vec![risk(vec![triangle], "SLGT")];
        let index = PointIndex::build(&units);
        assert!(match_day(1, &polygons, &units, &index).candidates.is_empty());
    }

    #[test]
    fn test_multipolygon_matches_any_part_once() {
        let units = vec![unit("00001", 1.0, 1.0), unit("00002", 11.0, 11.0)];
        let polygons = vec![risk(
            vec![
                rect_poly(0.0, 0.0, 2.0, 2.0),
                rect_poly(10.0, 10.0, 12.0, 12.0),
                rect_poly(0.5, 0.5, 1.5, 1.5),
            ],
            "MDT",
        )];
        let index = PointIndex::build(&units);
        let matches = match_day(1, &polygons, &units, &index);
        let ids: Vec<&str> = matches.candidates.iter().map(|c| c.unit.id.as_str()).collect();
        assert_eq!(ids, vec!["00001", "00002"]);
    }

    #[test]
    fn test_malformed_polygon_is_skipped_with_warning() {
        let units = vec![unit("00001", 1.0, 1.0)];
        let ring = LineString::from(vec![(0.0, 0.0), (f64::NAN, 1.0), (0.0, 0.0)]);
        let broken = Polygon::new(ring, vec![]);
        let polygons = vec![
            risk(vec![broken], "HIGH"),
            risk(vec![rect_poly(0.0, 0.0, 2.0, 2.0)], "ENH"),
        ];
        let index = PointIndex::build(&units);
        let matches = match_day(1, &polygons, &units, &index);
        assert_eq!(matches.warnings.len(), 1);
        assert_eq!(matches.warnings[0].label, "HIGH");
        assert_eq!(matches.candidates.len(), 1);
        assert_eq!(matches.candidates[0].polygon.raw_label, "ENH");
    }

    #[test]
    fn test_match_all_keeps_days_independent_and_ordered() {
        let units = vec![unit("00001", 1.0, 1.0)];
        let mut by_day = BTreeMap::new();
        for day in 1..=8u8 {
            let polys = if day % 2 == 0 {
                vec![RiskPolygon::from_label(
                    MultiPolygon::new(vec![rect_poly(0.0, 0.0, 2.0, 2.0)]),
                    day,
                    HazardCategory::CombinedProbabilistic,
                    "0.15",
                )
                .unwrap()]
            } else {
                Vec::new()
            };
            by_day.insert(day, polys);
        }
        let all = match_all(&by_day, &units);
        let days: Vec<u8> = all.keys().copied().collect();
        assert_eq!(days, (1..=8).collect::<Vec<u8>>());
        for (day, m) in &all {
            assert_eq!(m.day, *day);
            assert_eq!(m.candidates.len(), usize::from(day % 2 == 0));
        }
    }
}
