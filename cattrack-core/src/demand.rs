//! Demand windows derived from at-risk markets
//!
//! One window per at-risk market per run, anchored on the earliest day the
//! market appears at risk: `storm_date = run_date + (day - 1)`.

use crate::confirm::ConfirmationSignals;
use crate::error::{CoreError, CoreResult};
use crate::markets::{Market, MarketResult};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Offsets from the storm date to the demand window, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandOffsets {
    pub start_days: u32,
    pub end_days: u32,
}

impl Default for DemandOffsets {
    fn default() -> Self {
        DemandOffsets {
            start_days: 14,
            end_days: 28,
        }
    }
}

/// Projected demand window for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DemandWindow {
    pub market: Market,
    pub storm_date: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub trigger_day: u8,
    /// Highest categorical level across every at-risk day of the market
    pub highest_severity: u8,
    pub confirmed: bool,
}

fn add_days(date: NaiveDate, days: u32) -> CoreResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| CoreError::configuration(format!("{} + {} days overflows", date, days)))
}

/// Compute one demand window per at-risk market.
///
/// Windows are ordered by storm date, then market short name.
pub fn compute_windows(
    market_results: &BTreeMap<u8, Vec<MarketResult>>,
    run_date: NaiveDate,
    offsets: &DemandOffsets,
    confirmations: &ConfirmationSignals,
) -> CoreResult<Vec<DemandWindow>> {
    let mut by_market: BTreeMap<&str, Vec<&MarketResult>> = BTreeMap::new();
    for results in market_results.values() {
        for mr in results {
            by_market
                .entry(mr.market.short_name.as_str())
                .or_default()
                .push(mr);
        }
    }

    let mut windows = Vec::with_capacity(by_market.len());
    for (short_name, results) in by_market {
        let Some(first) = results.iter().min_by_key(|mr| mr.day) else {
            continue;
        };
        let trigger_day = first.day;
        let storm_date = add_days(run_date, u32::from(trigger_day.saturating_sub(1)))?;
        let highest_severity = results
            .iter()
            .map(|mr| mr.highest_severity)
            .max()
            .unwrap_or(0);

        windows.push(DemandWindow {
            market: first.market.clone(),
            storm_date,
            window_start: add_days(storm_date, offsets.start_days)?,
            window_end: add_days(storm_date, offsets.end_days)?,
            trigger_day,
            highest_severity,
            confirmed: trigger_day == 1 && confirmations.is_confirmed(short_name),
        });
    }

    windows.sort_by(|a, b| {
        a.storm_date
            .cmp(&b.storm_date)
            .then_with(|| a.market.short_name.cmp(&b.market.short_name))
    });
    Ok(windows)
}

/// Human-readable window, e.g. `Volume bump Mar 18–Apr 1`
pub fn format_window(window: &DemandWindow) -> String {
    format!(
        "Volume bump {}–{}",
        window.window_start.format("%b %-d"),
        window.window_end.format("%b %-d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(short: &str) -> Market {
        Market {
            name: short.to_string(),
            short_name: short.to_string(),
            regions: vec!["TX".to_string()],
            unit_ids: vec!["48113".to_string()],
        }
    }

    fn result(short: &str, day: u8, severity: u8) -> MarketResult {
        MarketResult {
            market: market(short),
            day,
            highest_severity: severity,
            affected_unit_count: 1,
            total_unit_count: 1,
            max_hail: 0,
            max_tornado: 0,
            max_wind: 0,
            significant: false,
            member_risks: Vec::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_three_window_dates() {
        let results = BTreeMap::from([(3u8, vec![result("DFW", 3, 4)])]);
        let windows = compute_windows(
            &results,
            date(2026, 3, 2),
            &DemandOffsets::default(),
            &ConfirmationSignals::none(),
        )
        .unwrap();
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!(w.storm_date, date(2026, 3, 4));
        assert_eq!(w.window_start, date(2026, 3, 18));
        assert_eq!(w.window_end, date(2026, 4, 1));
        assert_eq!(w.trigger_day, 3);
        assert!(!w.confirmed);
        assert_eq!(format_window(w), "Volume bump Mar 18–Apr 1");
    }

    #[test]
    fn test_multi_day_storm_collapses_to_earliest_day() {
        let results = BTreeMap::from([
            (2u8, vec![result("HOU", 2, 3)]),
            (4u8, vec![result("HOU", 4, 5)]),
            (5u8, vec![result("HOU", 5, 0)]),
        ]);
        let windows = compute_windows(
            &results,
            date(2026, 5, 10),
            &DemandOffsets::default(),
            &ConfirmationSignals::none(),
        )
        .unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].trigger_day, 2);
        assert_eq!(windows[0].storm_date, date(2026, 5, 11));
        assert_eq!(windows[0].highest_severity, 5);
    }

    #[test]
    fn test_confirmation_requires_day_one_and_signal() {
        let results = BTreeMap::from([
            (1u8, vec![result("DFW", 1, 4), result("OKC", 1, 4)]),
            (2u8, vec![result("DEN", 2, 4)]),
        ]);
        let signals = ConfirmationSignals::from_markets(["DFW", "DEN"]);
        let windows = compute_windows(
            &results,
            date(2026, 4, 1),
            &DemandOffsets::default(),
            &signals,
        )
        .unwrap();
        let confirmed: Vec<(&str, bool)> = windows
            .iter()
            .map(|w| (w.market.short_name.as_str(), w.confirmed))
            .collect();
        assert_eq!(confirmed, vec![("DFW", true), ("OKC", false), ("DEN", false)]);
    }

    #[test]
    fn test_custom_offsets() {
        let results = BTreeMap::from([(1u8, vec![result("NSH", 1, 4)])]);
        let offsets = DemandOffsets {
            start_days: 7,
            end_days: 10,
        };
        let windows =
            compute_windows(&results, date(2026, 12, 28), &offsets, &ConfirmationSignals::none())
                .unwrap();
        assert_eq!(windows[0].window_start, date(2027, 1, 4));
        assert_eq!(windows[0].window_end, date(2027, 1, 7));
    }

    #[test]
    fn test_no_markets_no_windows() {
        let results: BTreeMap<u8, Vec<MarketResult>> = BTreeMap::from([(1u8, Vec::new())]);
        let windows = compute_windows(
            &results,
            date(2026, 1, 1),
            &DemandOffsets::default(),
            &ConfirmationSignals::none(),
        )
        .unwrap();
        assert!(windows.is_empty());
    }
}
