//! Risk label normalization
//!
//! Outlook layers encode risk inconsistently: categorical layers use ordinal
//! tokens (`MRGL`, `ENH`, ...), probability layers use either whole percents
//! (`"15"`) or fractions (`"0.15"`). Significant-severe areas arrive as their
//! own polygons labelled `SIGN`/`SIG` and never carry a severity.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Highest value on the categorical scale (HIGH).
pub const MAX_CATEGORICAL: u8 = 6;

/// Categorical tokens in ascending order of severity.
const CATEGORICAL_LEVELS: &[(&str, u8)] = &[
    ("NONE", 0),
    ("TSTM", 1),
    ("MRGL", 2),
    ("MARGINAL", 2),
    ("SLGT", 3),
    ("SLIGHT", 3),
    ("ENH", 4),
    ("ENHANCED", 4),
    ("MDT", 5),
    ("MODERATE", 5),
    ("HIGH", 6),
];

const SIGNIFICANT_LABELS: &[&str] = &["SIGN", "SIG", "SIGNIFICANT"];

/// Which outlook product a polygon belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardCategory {
    Categorical,
    Hail,
    Tornado,
    Wind,
    /// "Any severe" probability, published when there is no per-hazard breakdown
    CombinedProbabilistic,
}

impl HazardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardCategory::Categorical => "categorical",
            HazardCategory::Hail => "hail",
            HazardCategory::Tornado => "tornado",
            HazardCategory::Wind => "wind",
            HazardCategory::CombinedProbabilistic => "probabilistic",
        }
    }

    pub fn is_probability(&self) -> bool {
        !matches!(self, HazardCategory::Categorical)
    }
}

impl std::fmt::Display for HazardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of normalizing one raw label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedLabel {
    pub severity: u8,
    pub significant: bool,
}

/// Returns true if the label marks a significant-severe area.
pub fn is_significant_label(raw_label: &str) -> bool {
    let upper = raw_label.trim().to_ascii_uppercase();
    SIGNIFICANT_LABELS.contains(&upper.as_str())
}

/// Normalize a raw label for the given hazard category.
///
/// Probability rule: `0 < v < 1` is a fraction, `v >= 1` is already a percent.
/// Exactly `1` (or `1.0`) is 1%, never 100%.
pub fn normalize(raw_label: &str, hazard: HazardCategory) -> CoreResult<NormalizedLabel> {
    if is_significant_label(raw_label) {
        return Ok(NormalizedLabel {
            severity: 0,
            significant: true,
        });
    }

    let severity = if hazard.is_probability() {
        parse_probability(raw_label)?
    } else {
        categorical_level(raw_label)?
    };

    Ok(NormalizedLabel {
        severity,
        significant: false,
    })
}

/// Look up a categorical token (case-insensitive).
pub fn categorical_level(raw_label: &str) -> CoreResult<u8> {
    let upper = raw_label.trim().to_ascii_uppercase();
    CATEGORICAL_LEVELS
        .iter()
        .find(|(token, _)| *token == upper)
        .map(|(_, level)| *level)
        .ok_or_else(|| CoreError::format(format!("unknown categorical label '{}'", raw_label)))
}

/// Parse a probability label into a whole percent.
pub fn parse_probability(raw_label: &str) -> CoreResult<u8> {
    let trimmed = raw_label.trim();
    let numeric = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let value: f64 = numeric.parse().map_err(|_| {
        CoreError::format(format!("probability label '{}' is not numeric", raw_label))
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(CoreError::format(format!(
            "probability label '{}' is out of range",
            raw_label
        )));
    }

    let percent = if value == 0.0 {
        0.0
    } else if value < 1.0 {
        (value * 100.0).round()
    } else {
        value.round()
    };

    if percent > 100.0 {
        return Err(CoreError::format(format!(
            "probability label '{}' exceeds 100%",
            raw_label
        )));
    }

    Ok(percent as u8)
}
