//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs
//! - "No data" and "all clear" never render the same text

use crate::classify::{risk_display_name, DayResult, DayStatus};
use crate::demand::{format_window, DemandWindow};
use crate::markets::MarketResult;
use crate::merge::UnitRisk;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a run produces, in reporting form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub days: Vec<DayResult>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub markets: BTreeMap<u8, Vec<MarketResult>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub windows: Vec<DemandWindow>,
}

/// Render a run as pretty JSON
pub fn render_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize run report")
}

fn unit_line(risk: &UnitRisk) -> String {
    format!(
        "    {:<6} {:<28} {:<9} hail {:>2}%  tornado {:>2}%  wind {:>2}%{}",
        risk.unit.id,
        truncate_or_pad(&risk.unit.name, 28),
        risk_display_name(risk.categorical_severity),
        risk.hail_prob,
        risk.tornado_prob,
        risk.wind_prob,
        if risk.significant { "  SIG" } else { "" }
    )
}

fn market_line(mr: &MarketResult) -> String {
    format!(
        "  Day {}  {:<6} {:<28} {:>3}/{:<3} units  {:<9} \
         hail {:>2}%  tornado {:>2}%  wind {:>2}%{}",
        mr.day,
        mr.market.short_name,
        truncate_or_pad(&mr.market.name, 28),
        mr.affected_unit_count,
        mr.total_unit_count,
        risk_display_name(mr.highest_severity),
        mr.max_hail,
        mr.max_tornado,
        mr.max_wind,
        if mr.significant { "  SIG" } else { "" }
    )
}

fn window_line(w: &DemandWindow) -> String {
    format!(
        "  {:<6} storm {} (day {}, {})  {}{}",
        w.market.short_name,
        w.storm_date,
        w.trigger_day,
        risk_display_name(w.highest_severity),
        format_window(w),
        if w.confirmed { "  CONFIRMED" } else { "" }
    )
}

/// Render a run as text output
///
/// Clear days are omitted. No-data days always get a warning line.
pub fn render_text(report: &RunReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("CAT Tracker run {}\n", report.run_date));

    let mut any_data = false;
    let mut any_flagged = false;
    for day in &report.days {
        match day.status() {
            DayStatus::NoData => {
                output.push_str(&format!(
                    "Day {}: NO DATA - outlook could not be loaded\n",
                    day.day
                ));
            }
            DayStatus::AllClear => any_data = true,
            DayStatus::Flagged => {
                any_data = true;
                any_flagged = true;
                output.push_str(&format!(
                    "Day {}: {} unit(s) flagged\n",
                    day.day,
                    day.flagged_units.len()
                ));
                for (region, summary) in &day.region_summaries {
                    output.push_str(&format!(
                        "  {} ({}, highest {})\n",
                        region,
                        summary.count,
                        risk_display_name(summary.highest_severity)
                    ));
                    for risk in &summary.units {
                        output.push_str(&format!("{}\n", unit_line(risk)));
                    }
                }
            }
        }
    }

    if any_data && !any_flagged {
        output.push_str("All clear: no units meet thresholds on days with data\n");
    }

    let market_results: Vec<&MarketResult> = report.markets.values().flatten().collect();
    if !market_results.is_empty() {
        output.push_str("Markets at risk:\n");
        for mr in market_results {
            output.push_str(&format!("{}\n", market_line(mr)));
        }
    }

    if !report.windows.is_empty() {
        output.push_str("Demand windows:\n");
        for w in &report.windows {
            output.push_str(&format!("{}\n", window_line(w)));
        }
    }

    output
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
