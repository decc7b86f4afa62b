//! Risk polygons and the per-run polygon store
//!
//! Global invariants enforced:
//! - Polygons are immutable once parsed
//! - Forecast days are 1..=8
//! - A day counts as having data once any of its layers was loaded, even
//!   if that layer had zero features

use crate::error::{CoreError, CoreResult};
use crate::geometry::multipolygon_from_geojson;
use crate::label::normalize;
use anyhow::Context;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

pub use crate::label::HazardCategory;

pub const FIRST_DAY: u8 = 1;
pub const LAST_DAY: u8 = 8;

/// All forecast days in ascending order
pub fn forecast_days() -> impl Iterator<Item = u8> {
    FIRST_DAY..=LAST_DAY
}

fn check_day(day: u8) -> CoreResult<()> {
    if (FIRST_DAY..=LAST_DAY).contains(&day) {
        Ok(())
    } else {
        Err(CoreError::format(format!(
            "forecast day {} outside {}..={}",
            day, FIRST_DAY, LAST_DAY
        )))
    }
}

/// One forecast risk area
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolygon {
    pub geometry: MultiPolygon<f64>,
    pub day: u8,
    pub hazard: HazardCategory,
    pub raw_label: String,
    /// Categorical level (0..=6) or whole percent, 0 for significant areas
    pub severity: u8,
    /// Distinct significant-severe sub-area, never derived from `severity`
    pub significant: bool,
}

impl RiskPolygon {
    /// Build a polygon from its raw label, normalizing the severity.
    pub fn from_label(
        geometry: MultiPolygon<f64>,
        day: u8,
        hazard: HazardCategory,
        raw_label: &str,
    ) -> CoreResult<Self> {
        check_day(day)?;
        let normalized = normalize(raw_label, hazard)?;
        Ok(RiskPolygon {
            geometry,
            day,
            hazard,
            raw_label: raw_label.trim().to_string(),
            severity: normalized.severity,
            significant: normalized.significant,
        })
    }
}

/// A polygon that was skipped because its geometry is unusable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GeometryWarning {
    pub day: u8,
    pub hazard: HazardCategory,
    pub label: String,
    pub reason: String,
}

/// Which forecast days had at least one successfully loaded layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataAvailability {
    days: BTreeSet<u8>,
}

impl DataAvailability {
    /// Every forecast day has data
    pub fn all() -> Self {
        Self {
            days: forecast_days().collect(),
        }
    }

    /// No forecast day has data
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_days(days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    pub fn is_available(&self, day: u8) -> bool {
        self.days.contains(&day)
    }

    pub fn any(&self) -> bool {
        !self.days.is_empty()
    }
}

/// The set of risk polygons for one forecast run, keyed by day
#[derive(Debug, Clone)]
pub struct PolygonStore {
    by_day: BTreeMap<u8, Vec<RiskPolygon>>,
    loaded: BTreeSet<u8>,
}

impl PolygonStore {
    /// Empty store: every day present, no day loaded yet
    pub fn new() -> Self {
        Self {
            by_day: forecast_days().map(|d| (d, Vec::new())).collect(),
            loaded: BTreeSet::new(),
        }
    }

    /// Record a successfully loaded layer for `day`.
    ///
    /// An empty `polygons` still marks the day as having data.
    pub fn add_layer(&mut self, day: u8, polygons: Vec<RiskPolygon>) -> CoreResult<()> {
        check_day(day)?;
        if let Some(stray) = polygons.iter().find(|p| p.day != day) {
            return Err(CoreError::format(format!(
                "polygon for day {} added to day {} layer",
                stray.day, day
            )));
        }
        self.by_day.entry(day).or_default().extend(polygons);
        self.loaded.insert(day);
        Ok(())
    }

    pub fn polygons(&self, day: u8) -> &[RiskPolygon] {
        self.by_day.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Day-keyed view over every forecast day (empty days included)
    pub fn by_day(&self) -> &BTreeMap<u8, Vec<RiskPolygon>> {
        &self.by_day
    }

    pub fn availability(&self) -> DataAvailability {
        DataAvailability::from_days(self.loaded.iter().copied())
    }

    pub fn has_data(&self, day: u8) -> bool {
        self.loaded.contains(&day)
    }

    pub fn any_data(&self) -> bool {
        !self.loaded.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_day.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PolygonStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outlook layers
// ---------------------------------------------------------------------------

/// One published outlook layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlookLayer {
    pub day: u8,
    pub hazard: HazardCategory,
    pub file_name: &'static str,
}

const fn layer(day: u8, hazard: HazardCategory, file_name: &'static str) -> OutlookLayer {
    OutlookLayer {
        day,
        hazard,
        file_name,
    }
}

/// Layers published per day. Days 1-2 break probability out per hazard,
/// day 3 has a combined probability next to the categorical outlook, and
/// days 4-8 only carry a combined probability.
pub static OUTLOOK_LAYERS: &[OutlookLayer] = &[
    layer(1, HazardCategory::Categorical, "day1otlk_cat.lyr.geojson"),
    layer(1, HazardCategory::Hail, "day1otlk_hail.lyr.geojson"),
    layer(1, HazardCategory::Tornado, "day1otlk_torn.lyr.geojson"),
    layer(1, HazardCategory::Wind, "day1otlk_wind.lyr.geojson"),
    layer(2, HazardCategory::Categorical, "day2otlk_cat.lyr.geojson"),
    layer(2, HazardCategory::Hail, "day2otlk_hail.lyr.geojson"),
    layer(2, HazardCategory::Tornado, "day2otlk_torn.lyr.geojson"),
    layer(2, HazardCategory::Wind, "day2otlk_wind.lyr.geojson"),
    layer(3, HazardCategory::Categorical, "day3otlk_cat.lyr.geojson"),
    layer(3, HazardCategory::CombinedProbabilistic, "day3otlk_prob.lyr.geojson"),
    layer(4, HazardCategory::CombinedProbabilistic, "day4prob.lyr.geojson"),
    layer(5, HazardCategory::CombinedProbabilistic, "day5prob.lyr.geojson"),
    layer(6, HazardCategory::CombinedProbabilistic, "day6prob.lyr.geojson"),
    layer(7, HazardCategory::CombinedProbabilistic, "day7prob.lyr.geojson"),
    layer(8, HazardCategory::CombinedProbabilistic, "day8prob.lyr.geojson"),
];

/// Polygons decoded from one layer plus the features that were skipped
#[derive(Debug, Clone, Default)]
pub struct ParsedLayer {
    pub polygons: Vec<RiskPolygon>,
    pub warnings: Vec<GeometryWarning>,
}

/// Read the risk label of a feature: `LABEL`, falling back to `LABEL2`.
fn feature_label(properties: Option<&Value>) -> Option<String> {
    let properties = properties?;
    ["LABEL", "LABEL2"].iter().find_map(|key| {
        let label = match properties.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!label.is_empty()).then_some(label)
    })
}

/// Parse an outlook GeoJSON FeatureCollection into risk polygons.
///
/// Features without geometry or label, and non-polygonal features, are
/// skipped. Malformed geometries become warnings. A label that cannot be
/// normalized fails the whole layer.
pub fn parse_outlook_layer(
    json: &str,
    day: u8,
    hazard: HazardCategory,
) -> CoreResult<ParsedLayer> {
    check_day(day)?;
    let document: Value = serde_json::from_str(json).map_err(|e| {
        CoreError::format(format!("day {} {} layer is not JSON: {}", day, hazard, e))
    })?;

    let features = match document.get("features") {
        Some(Value::Array(features)) => features.as_slice(),
        Some(_) => {
            return Err(CoreError::format(format!(
                "day {} {} layer has a non-array features member",
                day, hazard
            )))
        }
        None => &[],
    };

    let mut parsed = ParsedLayer::default();
    for feature in features {
        let geometry = match feature.get("geometry") {
            Some(g) if !g.is_null() => g,
            _ => continue,
        };
        let Some(label) = feature_label(feature.get("properties")) else {
            continue;
        };

        let multi = match multipolygon_from_geojson(geometry) {
            Ok(Some(multi)) => multi,
            Ok(None) => {
                debug!(day, %hazard, %label, "skipping non-polygonal feature");
                continue;
            }
            Err(e) => {
                parsed.warnings.push(GeometryWarning {
                    day,
                    hazard,
                    label,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        parsed
            .polygons
            .push(RiskPolygon::from_label(multi, day, hazard, &label)?);
    }

    Ok(parsed)
}


/// Polygons and parse-time warnings for every layer found in one directory
#[derive(Debug, Clone)]
pub struct LoadedOutlooks {
    pub store: PolygonStore,
    pub warnings: Vec<GeometryWarning>,
}

/// Read every layer in [`OUTLOOK_LAYERS`] from `dir`.
///
/// A missing or unreadable file is a failed fetch: its day only has data
/// if another of its layers loaded. A file that was read but cannot be
/// parsed fails the whole load, naming the file.
pub fn load_outlook_dir(dir: &Path) -> anyhow::Result<LoadedOutlooks> {
    if !dir.is_dir() {
        anyhow::bail!("Outlook directory does not exist: {}", dir.display());
    }

    let mut store = PolygonStore::new();
    let mut warnings = Vec::new();
    for layer in OUTLOOK_LAYERS {
        let path = dir.join(layer.file_name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    day = layer.day,
                    hazard = %layer.hazard,
                    "layer unavailable: {}: {}",
                    path.display(),
                    e
                );
                continue;
            }
        };
        let parsed = parse_outlook_layer(&content, layer.day, layer.hazard)
            .with_context(|| format!("failed to parse outlook layer: {}", path.display()))?;
        warnings.extend(parsed.warnings);
        store.add_layer(layer.day, parsed.polygons)?;
    }

    if !store.any_data() {
        warn!("no outlook layer could be loaded from {}", dir.display());
    }
    Ok(LoadedOutlooks { store, warnings })
}
