//! Unit catalog - counties with a single representative point each
//!
//! Global invariants enforced:
//! - Unit ids are 5-digit zero-padded codes; the first two digits are the
//!   parent region code
//! - Units outside forecast coverage are excluded at load time
//! - The representative point lies inside the unit's boundary
//! - Catalog order is by unit id

use crate::error::{CoreError, CoreResult};
use crate::geometry::multipolygon_from_geojson;
use geo::{Centroid, Contains, InteriorPoint, MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Region codes outside the outlook coverage area (AK, HI, territories)
pub const NON_CONTIGUOUS_REGIONS: &[&str] = &["02", "15", "60", "66", "69", "72", "78"];

/// Region code to abbreviation for the contiguous coverage area
pub static REGION_CODES: &[(&str, &str)] = &[
    ("01", "AL"), ("04", "AZ"), ("05", "AR"), ("06", "CA"), ("08", "CO"),
    ("09", "CT"), ("10", "DE"), ("11", "DC"), ("12", "FL"), ("13", "GA"),
    ("16", "ID"), ("17", "IL"), ("18", "IN"), ("19", "IA"), ("20", "KS"),
    ("21", "KY"), ("22", "LA"), ("23", "ME"), ("24", "MD"), ("25", "MA"),
    ("26", "MI"), ("27", "MN"), ("28", "MS"), ("29", "MO"), ("30", "MT"),
    ("31", "NE"), ("32", "NV"), ("33", "NH"), ("34", "NJ"), ("35", "NM"),
    ("36", "NY"), ("37", "NC"), ("38", "ND"), ("39", "OH"), ("40", "OK"),
    ("41", "OR"), ("42", "PA"), ("44", "RI"), ("45", "SC"), ("46", "SD"),
    ("47", "TN"), ("48", "TX"), ("49", "UT"), ("50", "VT"), ("51", "VA"),
    ("53", "WA"), ("54", "WV"), ("55", "WI"), ("56", "WY"),
];

/// Look up the abbreviation for a contiguous region code.
pub fn region_abbr(region_id: &str) -> Option<&'static str> {
    REGION_CODES
        .iter()
        .find(|(code, _)| *code == region_id)
        .map(|(_, abbr)| *abbr)
}

/// Returns true if `id` is a 5-digit unit code.
pub fn is_valid_unit_id(id: &str) -> bool {
    id.len() == 5 && id.bytes().all(|b| b.is_ascii_digit())
}

/// One geographic unit (county)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub region_id: String,
    pub region_abbr: String,
    pub point: Point<f64>,
}

impl Unit {
    /// Build a unit, deriving the region code from the id prefix.
    pub fn new(id: &str, name: &str, region_abbr: &str, point: Point<f64>) -> CoreResult<Self> {
        if !is_valid_unit_id(id) {
            return Err(CoreError::format(format!("unit id '{}' is not a 5-digit code", id)));
        }
        Ok(Unit {
            id: id.to_string(),
            name: name.to_string(),
            region_id: id[..2].to_string(),
            region_abbr: region_abbr.to_string(),
            point,
        })
    }
}

/// Pick a representative point that lies inside the boundary: the centroid
/// when it is inside, otherwise an interior point.
pub fn representative_point(boundary: &MultiPolygon<f64>) -> Option<Point<f64>> {
    match boundary.centroid() {
        Some(c) if boundary.contains(&c) => Some(c),
        _ => boundary.interior_point(),
    }
}

/// The set of units considered by a run
#[derive(Debug, Clone, Default)]
pub struct UnitCatalog {
    units: Vec<Unit>,
}

impl UnitCatalog {
    /// Build a catalog. Units are ordered by id; duplicate ids are rejected.
    pub fn new(units: Vec<Unit>) -> CoreResult<Self> {
        let mut by_id: BTreeMap<String, Unit> = BTreeMap::new();
        for unit in units {
            if !is_valid_unit_id(&unit.id) {
                return Err(CoreError::format(format!(
                    "unit id '{}' is not a 5-digit code",
                    unit.id
                )));
            }
            if let Some(dup) = by_id.insert(unit.id.clone(), unit) {
                return Err(CoreError::format(format!("duplicate unit id '{}'", dup.id)));
            }
        }
        Ok(Self {
            units: by_id.into_values().collect(),
        })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn get(&self, id: &str) -> Option<&Unit> {
        self.units
            .binary_search_by(|u| u.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.units[i])
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Keep only units whose region abbreviation is listed (case-insensitive).
    /// An empty list keeps everything.
    pub fn restrict_to_regions(self, regions: &[String]) -> Self {
        if regions.is_empty() {
            return self;
        }
        let wanted: HashSet<String> = regions
            .iter()
            .map(|r| r.trim().to_ascii_uppercase())
            .collect();
        let units: Vec<Unit> = self
            .units
            .into_iter()
            .filter(|u| wanted.contains(&u.region_abbr.to_ascii_uppercase()))
            .collect();
        info!(count = units.len(), "restricted unit catalog to regions {:?}", regions);
        Self { units }
    }
}

/// Outcome of parsing a boundary file
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: UnitCatalog,
    /// Features dropped as out of coverage or invalid
    pub skipped: usize,
}

fn feature_id(feature: &Value) -> Option<String> {
    let raw = match feature.get("id")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() || raw.len() > 5 {
        return None;
    }
    Some(format!("{:0>5}", raw))
}

/// Parse a county boundary FeatureCollection into a unit catalog.
///
/// Out-of-coverage and invalid features are skipped and counted.
pub fn parse_boundary_file(json: &str) -> CoreResult<LoadedCatalog> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| CoreError::format(format!("boundary file is not JSON: {}", e)))?;
    let features = document
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut units = Vec::with_capacity(features.len());
    let mut skipped = 0usize;

    for feature in features {
        match unit_from_feature(feature) {
            Some(unit) => units.push(unit),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        info!(skipped, "skipped non-contiguous or invalid boundary entries");
    }

    Ok(LoadedCatalog {
        catalog: UnitCatalog::new(units)?,
        skipped,
    })
}

fn unit_from_feature(feature: &Value) -> Option<Unit> {
    let id = feature_id(feature)?;
    if !is_valid_unit_id(&id) {
        return None;
    }
    let region_id = &id[..2];
    if NON_CONTIGUOUS_REGIONS.contains(&region_id) {
        return None;
    }
    let abbr = region_abbr(region_id)?;

    let name = feature
        .get("properties")
        .and_then(|p| p.get("NAME"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("County {}", id));

    let boundary = match feature.get("geometry").map(multipolygon_from_geojson) {
        Some(Ok(Some(boundary))) => boundary,
        Some(Err(e)) => {
            debug!(%id, error = %e, "unusable boundary geometry");
            return None;
        }
        _ => return None,
    };
    let point = representative_point(&boundary)?;

    Unit::new(&id, &name, abbr, point).ok()
}
