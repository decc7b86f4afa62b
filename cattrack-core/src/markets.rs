//! Market territory rollup
//!
//! A market is a fixed set of unit ids. A market is at risk on a day when
//! any of its members is flagged that day; only at-risk markets produce a
//! result.

use crate::classify::DayResult;
use crate::error::{CoreError, CoreResult};
use crate::merge::UnitRisk;
use crate::units::is_valid_unit_id;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Territory definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Market {
    pub name: String,
    pub short_name: String,
    /// Owning region abbreviations
    #[serde(default)]
    pub regions: Vec<String>,
    pub unit_ids: Vec<String>,
}

impl Market {
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() || self.short_name.trim().is_empty() {
            return Err(CoreError::configuration(
                "market name and short_name must be non-empty",
            ));
        }
        if self.unit_ids.is_empty() {
            return Err(CoreError::configuration(format!(
                "market '{}' has no member units",
                self.short_name
            )));
        }
        let mut seen = HashSet::new();
        for id in &self.unit_ids {
            if !is_valid_unit_id(id) {
                return Err(CoreError::configuration(format!(
                    "market '{}' member '{}' is not a 5-digit unit id",
                    self.short_name, id
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(CoreError::configuration(format!(
                    "market '{}' lists unit '{}' twice",
                    self.short_name, id
                )));
            }
        }
        Ok(())
    }

    pub fn total_units(&self) -> usize {
        self.unit_ids.len()
    }
}

/// Validate a full market list, including short-name uniqueness.
pub fn validate_markets(markets: &[Market]) -> CoreResult<()> {
    let mut short_names = HashSet::new();
    for market in markets {
        market.validate()?;
        if !short_names.insert(market.short_name.as_str()) {
            return Err(CoreError::configuration(format!(
                "duplicate market short_name '{}'",
                market.short_name
            )));
        }
    }
    Ok(())
}

/// Rollup of one market on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MarketResult {
    pub market: Market,
    pub day: u8,
    pub highest_severity: u8,
    pub affected_unit_count: usize,
    pub total_unit_count: usize,
    pub max_hail: u8,
    pub max_tornado: u8,
    pub max_wind: u8,
    pub significant: bool,
    pub member_risks: Vec<UnitRisk>,
}

/// Market results for a single day, in market definition order.
pub fn aggregate_day(day_result: &DayResult, markets: &[Market]) -> Vec<MarketResult> {
    markets
        .iter()
        .filter_map(|market| {
            let members: HashSet<&str> = market.unit_ids.iter().map(String::as_str).collect();
            let member_risks: Vec<UnitRisk> = day_result
                .flagged_units
                .iter()
                .filter(|r| members.contains(r.unit.id.as_str()))
                .cloned()
                .collect();

            if member_risks.is_empty() {
                return None;
            }

            let max_of = |f: fn(&UnitRisk) -> u8| member_risks.iter().map(f).max().unwrap_or(0);
            Some(MarketResult {
                market: market.clone(),
                day: day_result.day,
                highest_severity: max_of(|r| r.categorical_severity),
                affected_unit_count: member_risks.len(),
                total_unit_count: market.total_units(),
                max_hail: max_of(|r| r.hail_prob),
                max_tornado: max_of(|r| r.tornado_prob),
                max_wind: max_of(|r| r.wind_prob),
                significant: member_risks.iter().any(|r| r.significant),
                member_risks,
            })
        })
        .collect()
}

/// Market results for every day. Each day in `day_results` has an entry,
/// possibly empty.
pub fn aggregate(day_results: &[DayResult], markets: &[Market]) -> BTreeMap<u8, Vec<MarketResult>> {
    day_results
        .iter()
        .map(|dr| (dr.day, aggregate_day(dr, markets)))
        .collect()
}
