//! CAT Tracker core library - maps severe-weather outlook polygons onto
//! counties, markets and demand windows

// Global invariants enforced in this crate:
// - Every stage is a pure function over immutable values
// - No global mutable state, no clocks (the run date is an input)
// - Parallelism only across forecast days; results are joined in day order
// - Deterministic ordering must be explicit (BTreeMap or explicit sorts)
// - Identical input yields byte-for-byte identical output

pub mod classify;
pub mod config;
pub mod confirm;
pub mod demand;
pub mod error;
pub mod geometry;
pub mod label;
pub mod markets;
pub mod matcher;
pub mod merge;
pub mod polygon;
pub mod report;
pub mod units;

pub use classify::{DayResult, DayStatus, Thresholds};
pub use config::ResolvedConfig;
pub use confirm::{Alert, ConfirmationSignals};
pub use demand::{DemandOffsets, DemandWindow};
pub use error::{CoreError, CoreResult};
pub use markets::{Market, MarketResult};
pub use merge::UnitRisk;
pub use polygon::{
    load_outlook_dir, GeometryWarning, HazardCategory, LoadedOutlooks, PolygonStore, RiskPolygon,
};
pub use report::{render_json, render_text, RunReport};
pub use units::{Unit, UnitCatalog};

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Per-run inputs that are not part of the configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Replaces the configured categorical minimum for this run only
    pub categorical_override: Option<u8>,
    pub run_date: NaiveDate,
    pub confirmations: ConfirmationSignals,
}

impl PipelineOptions {
    pub fn new(run_date: NaiveDate) -> Self {
        PipelineOptions {
            categorical_override: None,
            run_date,
            confirmations: ConfirmationSignals::none(),
        }
    }
}

/// Everything a run produces
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// One result per forecast day, ascending
    pub days: Vec<DayResult>,
    pub markets: BTreeMap<u8, Vec<MarketResult>>,
    pub windows: Vec<DemandWindow>,
    pub warnings: Vec<GeometryWarning>,
}

impl PipelineOutput {
    /// Reporting view of this output
    pub fn into_report(self, run_date: NaiveDate) -> RunReport {
        RunReport {
            run_date,
            days: self.days,
            markets: self.markets,
            windows: self.windows,
        }
    }
}

/// Run match, merge and classify for every day, then roll up markets and
/// demand windows.
pub fn run_pipeline(
    store: &PolygonStore,
    catalog: &UnitCatalog,
    config: &ResolvedConfig,
    options: &PipelineOptions,
) -> CoreResult<PipelineOutput> {
    let units = catalog.units();
    let matches = matcher::match_all(store.by_day(), units);
    let merged: BTreeMap<u8, Vec<UnitRisk>> = matches
        .par_iter()
        .map(|(day, m)| (*day, merge::merge_day(&m.candidates, *day)))
        .collect();
    let day_results = classify::classify(
        &merged,
        &store.availability(),
        &config.thresholds,
        options.categorical_override,
    )?;

    for result in day_results.iter().filter(|r| !r.data_available) {
        warn!(day = result.day, "no outlook data for day");
    }
    let warnings: Vec<GeometryWarning> = matches
        .into_values()
        .flat_map(|m| m.warnings)
        .collect();

    let market_results = markets::aggregate(&day_results, &config.markets);
    let windows = demand::compute_windows(
        &market_results,
        options.run_date,
        &config.offsets,
        &options.confirmations,
    )?;

    info!(
        units = units.len(),
        flagged = day_results.iter().map(|d| d.flagged_units.len()).sum::<usize>(),
        markets_at_risk = market_results.values().map(Vec::len).sum::<usize>(),
        windows = windows.len(),
        skipped_polygons = warnings.len(),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        days: day_results,
        markets: market_results,
        windows,
        warnings,
    })
}
