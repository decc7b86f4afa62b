//! Threshold classification of merged unit risks
//!
//! Global invariants enforced:
//! - A unit is flagged if ANY criterion holds (categorical, any probability
//!   dimension, significant)
//! - The per-call override only replaces the categorical minimum
//! - "No data" and "all clear" are distinct result states
//! - Deterministic ordering within a day

use crate::error::{CoreError, CoreResult};
use crate::label::MAX_CATEGORICAL;
use crate::merge::UnitRisk;
use crate::polygon::DataAvailability;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Hazard thresholds a unit must meet to be flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub categorical_min: u8,
    pub hail_prob_min: u8,
    pub tornado_prob_min: u8,
    pub wind_prob_min: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            categorical_min: 4, // ENH
            hail_prob_min: 15,
            tornado_prob_min: 5,
            wind_prob_min: 15,
        }
    }
}

/// Check whether a merged risk meets any threshold.
pub fn meets_threshold(risk: &UnitRisk, thresholds: &Thresholds, categorical_min: u8) -> bool {
    risk.significant
        || risk.categorical_severity >= categorical_min
        || risk.hail_prob >= thresholds.hail_prob_min
        || risk.tornado_prob >= thresholds.tornado_prob_min
        || risk.wind_prob >= thresholds.wind_prob_min
}

/// Flagged units of one region on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegionSummary {
    pub count: usize,
    pub highest_severity: u8,
    pub units: Vec<UnitRisk>,
}

/// What a day's result means for a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Flagged,
    AllClear,
    NoData,
}

/// Classified output for one forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DayResult {
    pub day: u8,
    pub flagged_units: Vec<UnitRisk>,
    pub region_summaries: BTreeMap<String, RegionSummary>,
    pub data_available: bool,
}

impl DayResult {
    pub fn status(&self) -> DayStatus {
        if !self.data_available {
            DayStatus::NoData
        } else if self.flagged_units.is_empty() {
            DayStatus::AllClear
        } else {
            DayStatus::Flagged
        }
    }
}

/// Highest first: categorical, then strongest probability, then the
/// individual dimensions, then significant; unit id last for stability.
fn compare_risks(a: &UnitRisk, b: &UnitRisk) -> Ordering {
    b.categorical_severity
        .cmp(&a.categorical_severity)
        .then_with(|| b.max_probability().cmp(&a.max_probability()))
        .then_with(|| b.hail_prob.cmp(&a.hail_prob))
        .then_with(|| b.tornado_prob.cmp(&a.tornado_prob))
        .then_with(|| b.wind_prob.cmp(&a.wind_prob))
        .then_with(|| b.significant.cmp(&a.significant))
        .then_with(|| a.unit.id.cmp(&b.unit.id))
}

/// Sort risks into reporting order
pub fn sort_risks(risks: &mut [UnitRisk]) {
    risks.sort_by(compare_risks);
}

/// Group flagged units by region abbreviation
pub fn summarize_regions(flagged: &[UnitRisk]) -> BTreeMap<String, RegionSummary> {
    let mut regions: BTreeMap<String, RegionSummary> = BTreeMap::new();
    for risk in flagged {
        let summary = regions
            .entry(risk.unit.region_abbr.clone())
            .or_insert_with(|| RegionSummary {
                count: 0,
                highest_severity: 0,
                units: Vec::new(),
            });
        summary.count += 1;
        summary.highest_severity = summary.highest_severity.max(risk.categorical_severity);
        summary.units.push(risk.clone());
    }
    regions
}

fn check_override(categorical_override: Option<u8>) -> CoreResult<()> {
    match categorical_override {
        Some(v) if v == 0 || v > MAX_CATEGORICAL => Err(CoreError::configuration(format!(
            "categorical threshold override {} outside 1..={}",
            v, MAX_CATEGORICAL
        ))),
        _ => Ok(()),
    }
}

/// Classify one day's merged risks.
pub fn classify_day(
    day: u8,
    risks: &[UnitRisk],
    data_available: bool,
    thresholds: &Thresholds,
    categorical_override: Option<u8>,
) -> CoreResult<DayResult> {
    check_override(categorical_override)?;

    if !data_available {
        return Ok(DayResult {
            day,
            flagged_units: Vec::new(),
            region_summaries: BTreeMap::new(),
            data_available: false,
        });
    }

    let categorical_min = categorical_override.unwrap_or(thresholds.categorical_min);
    let mut flagged: Vec<UnitRisk> = risks
        .iter()
        .filter(|r| meets_threshold(r, thresholds, categorical_min))
        .cloned()
        .collect();
    sort_risks(&mut flagged);

    Ok(DayResult {
        day,
        region_summaries: summarize_regions(&flagged),
        flagged_units: flagged,
        data_available: true,
    })
}

/// Classify every day present in `merged`, in ascending day order.
///
/// Every day gets a result: flagged, all clear, or no data.
pub fn classify(
    merged: &BTreeMap<u8, Vec<UnitRisk>>,
    availability: &DataAvailability,
    thresholds: &Thresholds,
    categorical_override: Option<u8>,
) -> CoreResult<Vec<DayResult>> {
    merged
        .iter()
        .map(|(day, risks)| {
            classify_day(
                *day,
                risks,
                availability.is_available(*day),
                thresholds,
                categorical_override,
            )
        })
        .collect()
}

/// Results worth reporting: flagged days and no-data days. Genuinely clear
/// days are dropped.
pub fn reportable_days(results: &[DayResult]) -> Vec<&DayResult> {
    results
        .iter()
        .filter(|r| r.status() != DayStatus::AllClear)
        .collect()
}

/// Display name of a categorical level
pub fn risk_display_name(level: u8) -> String {
    match level {
        0 => "NONE".to_string(),
        1 => "TSTM".to_string(),
        2 => "MARGINAL".to_string(),
        3 => "SLIGHT".to_string(),
        4 => "ENHANCED".to_string(),
        5 => "MODERATE".to_string(),
        6 => "HIGH".to_string(),
        other => format!("LEVEL {}", other),
    }
}
