//! Overlap resolution: many polygon memberships -> one risk record per unit-day
//!
//! Global invariants enforced:
//! - Every dimension is a max-merge, never a sum, average or last write
//! - Combined-probability polygons fold into hail, tornado and wind alike
//! - Significant-severe polygons only set the flag
//! - Units without candidates produce no record

use crate::matcher::MatchCandidate;
use crate::polygon::{HazardCategory, RiskPolygon};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Merged risk of one unit on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnitRisk {
    pub unit: Unit,
    pub day: u8,
    pub categorical_severity: u8,
    pub hail_prob: u8,
    pub tornado_prob: u8,
    pub wind_prob: u8,
    pub significant: bool,
}

impl UnitRisk {
    /// Largest of the three probability dimensions
    pub fn max_probability(&self) -> u8 {
        self.hail_prob.max(self.tornado_prob).max(self.wind_prob)
    }
}

/// Fixed-size accumulator, one slot per hazard dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskAccumulator {
    pub categorical: u8,
    pub hail: u8,
    pub tornado: u8,
    pub wind: u8,
    pub significant: bool,
}

impl RiskAccumulator {
    pub fn fold(&mut self, polygon: &RiskPolygon) {
        if polygon.significant {
            self.significant = true;
            return;
        }

        let s = polygon.severity;
        match polygon.hazard {
            HazardCategory::Categorical => self.categorical = self.categorical.max(s),
            HazardCategory::Hail => self.hail = self.hail.max(s),
            HazardCategory::Tornado => self.tornado = self.tornado.max(s),
            HazardCategory::Wind => self.wind = self.wind.max(s),
            HazardCategory::CombinedProbabilistic => {
                self.hail = self.hail.max(s);
                self.tornado = self.tornado.max(s);
                self.wind = self.wind.max(s);
            }
        }
    }

    fn into_risk(self, unit: &Unit, day: u8) -> UnitRisk {
        UnitRisk {
            unit: unit.clone(),
            day,
            categorical_severity: self.categorical,
            hail_prob: self.hail,
            tornado_prob: self.tornado,
            wind_prob: self.wind,
            significant: self.significant,
        }
    }
}

/// Merge the candidates of a single unit on a single day.
///
/// Returns `None` when there are no candidates. Candidates for other units
/// are ignored.
pub fn merge(candidates: &[MatchCandidate<'_>], day: u8) -> Option<UnitRisk> {
    let first = candidates.first()?;
    let unit = first.unit;
    let mut acc = RiskAccumulator::default();
    for candidate in candidates.iter().filter(|c| c.unit.id == unit.id) {
        acc.fold(candidate.polygon);
    }
    Some(acc.into_risk(unit, day))
}

/// Merge all candidates of one day into one record per matched unit,
/// ordered by unit id.
pub fn merge_day(candidates: &[MatchCandidate<'_>], day: u8) -> Vec<UnitRisk> {
    let mut per_unit: BTreeMap<&str, (&Unit, RiskAccumulator)> = BTreeMap::new();
    for candidate in candidates {
        let entry = per_unit
            .entry(candidate.unit.id.as_str())
            .or_insert_with(|| (candidate.unit, RiskAccumulator::default()));
        entry.1.fold(candidate.polygon);
    }

    per_unit
        .into_values()
        .map(|(unit, acc)| acc.into_risk(unit, day))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, MultiPolygon};

    fn unit(id: &str) -> Unit {
        Unit::new(id, "Test", "OK", point!(x: 0.0, y: 0.0)).unwrap()
    }

    fn poly(hazard: HazardCategory, label: &str) -> RiskPolygon {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        RiskPolygon::from_label(MultiPolygon::new(vec![square]), 3, hazard, label).unwrap()
    }

    fn candidates<'a>(unit: &'a Unit, polygons: &'a [RiskPolygon]) -> Vec<MatchCandidate<'a>> {
        polygons
            .iter()
            .map(|polygon| MatchCandidate { unit, polygon })
            .collect()
    }

    #[test]
    fn test_same_hazard_takes_max_not_sum() {
        let u = unit("40109");
        let polys = vec![
            poly(HazardCategory::Hail, "0.05"),
            poly(HazardCategory::Hail, "0.30"),
            poly(HazardCategory::Hail, "0.15"),
        ];
        let risk = merge(&candidates(&u, &polys), 3).unwrap();
        assert_eq!(risk.hail_prob, 30);
        assert_eq!(risk.tornado_prob, 0);
        assert_eq!(risk.wind_prob, 0);
    }

    #[test]
    fn test_categorical_takes_max() {
        let u = unit("40109");
        let polys = vec![
            poly(HazardCategory::Categorical, "MRGL"),
            poly(HazardCategory::Categorical, "ENH"),
            poly(HazardCategory::Categorical, "SLGT"),
        ];
        let risk = merge(&candidates(&u, &polys), 3).unwrap();
        assert_eq!(risk.categorical_severity, 4);
    }

    #[test]
    fn test_combined_probability_folds_into_all_three() {
        // Regression guard: combined probability once skipped tornado.
        let u = unit("40109");
        let polys = vec![poly(HazardCategory::CombinedProbabilistic, "0.15")];
        let risk = merge(&candidates(&u, &polys), 3).unwrap();
        assert_eq!(risk.hail_prob, 15);
        assert_eq!(risk.tornado_prob, 15);
        assert_eq!(risk.wind_prob, 15);
    }

    #[test]
    fn test_combined_does_not_lower_per_hazard_value() {
        let u = unit("40109");
        let polys = vec![
            poly(HazardCategory::Wind, "0.45"),
            poly(HazardCategory::CombinedProbabilistic, "0.15"),
        ];
        let risk = merge(&candidates(&u, &polys), 3).unwrap();
        assert_eq!(risk.wind_prob, 45);
        assert_eq!(risk.hail_prob, 15);
    }

    #[test]
    fn test_significant_sets_flag_without_touching_severity() {
        let u = unit("40109");
        let polys = vec![poly(HazardCategory::Tornado, "SIGN")];
        let risk = merge(&candidates(&u, &polys), 3).unwrap();
        assert!(risk.significant);
        assert_eq!(risk.tornado_prob, 0);
        assert_eq!(risk.max_probability(), 0);
    }

    #[test]
    fn test_no_candidates_no_record() {
        assert!(merge(&[], 1).is_none());
        assert!(merge_day(&[], 1).is_empty());
    }

    #[test]
    fn test_merge_day_groups_by_unit_in_id_order() {
        let a = unit("48201");
        let b = unit("40109");
        let polys = vec![
            poly(HazardCategory::Categorical, "SLGT"),
            poly(HazardCategory::Categorical, "MDT"),
        ];
        let cands = vec![
            MatchCandidate { unit: &a, polygon: &polys[0] },
            MatchCandidate { unit: &b, polygon: &polys[0] },
            MatchCandidate { unit: &a, polygon: &polys[1] },
        ];
        let risks = merge_day(&cands, 2);
        assert_eq!(risks.len(), 2);
        assert_eq!(risks[0].unit.id, "40109");
        assert_eq!(risks[0].categorical_severity, 3);
        assert_eq!(risks[1].unit.id, "48201");
        assert_eq!(risks[1].categorical_severity, 5);
        assert!(risks.iter().all(|r| r.day == 2));
    }
}
