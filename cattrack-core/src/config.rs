//! Configuration file support for CAT Tracker
//!
//! Loads run configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.cattrackrc.json` in the working directory
//! 3. `cattrack.config.json` in the working directory
//!
//! All fields are optional. The per-run categorical override never touches
//! the resolved values.

use crate::classify::Thresholds;
use crate::demand::DemandOffsets;
use crate::error::{CoreError, CoreResult};
use crate::label::MAX_CATEGORICAL;
use crate::markets::{validate_markets, Market};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CAT Tracker configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatTrackConfig {
    /// Flagging thresholds
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,

    /// Demand window offsets from the storm date
    #[serde(default)]
    pub demand_window: Option<DemandWindowConfig>,

    /// Market territories
    #[serde(default)]
    pub markets: Vec<Market>,

    /// Region abbreviations to keep (empty means all contiguous regions)
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Custom flagging thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Minimum categorical level (default: 4, ENH)
    pub categorical_min: Option<u8>,
    /// Minimum hail probability percent (default: 15)
    pub hail_prob_min: Option<u8>,
    /// Minimum tornado probability percent (default: 5)
    pub tornado_prob_min: Option<u8>,
    /// Minimum wind probability percent (default: 15)
    pub wind_prob_min: Option<u8>,
}

/// Custom demand window offsets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandWindowConfig {
    /// Days from storm to window start (default: 14)
    pub start_days: Option<u32>,
    /// Days from storm to window end (default: 28)
    pub end_days: Option<u32>,
}

/// Resolved configuration with defaults filled in
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub thresholds: Thresholds,
    pub offsets: DemandOffsets,
    pub markets: Vec<Market>,
    /// Region filter, `None` when unrestricted
    pub regions: Option<Vec<String>>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl CatTrackConfig {
    fn thresholds(&self) -> Thresholds {
        let d = Thresholds::default();
        match &self.thresholds {
            Some(t) => Thresholds {
                categorical_min: t.categorical_min.unwrap_or(d.categorical_min),
                hail_prob_min: t.hail_prob_min.unwrap_or(d.hail_prob_min),
                tornado_prob_min: t.tornado_prob_min.unwrap_or(d.tornado_prob_min),
                wind_prob_min: t.wind_prob_min.unwrap_or(d.wind_prob_min),
            },
            None => d,
        }
    }

    fn offsets(&self) -> DemandOffsets {
        let d = DemandOffsets::default();
        match &self.demand_window {
            Some(w) => DemandOffsets {
                start_days: w.start_days.unwrap_or(d.start_days),
                end_days: w.end_days.unwrap_or(d.end_days),
            },
            None => d,
        }
    }

    /// Validate the configuration for logical errors
    pub fn validate(&self) -> CoreResult<()> {
        let t = self.thresholds();
        if t.categorical_min == 0 || t.categorical_min > MAX_CATEGORICAL {
            return Err(CoreError::configuration(format!(
                "thresholds.categorical_min must be in 1..={} (got {})",
                MAX_CATEGORICAL, t.categorical_min
            )));
        }
        for (name, val) in [
            ("hail_prob_min", t.hail_prob_min),
            ("tornado_prob_min", t.tornado_prob_min),
            ("wind_prob_min", t.wind_prob_min),
        ] {
            if val == 0 || val > 100 {
                return Err(CoreError::configuration(format!(
                    "thresholds.{} must be in 1..=100 (got {})",
                    name, val
                )));
            }
        }

        let o = self.offsets();
        if o.start_days > o.end_days {
            return Err(CoreError::configuration(format!(
                "demand_window.start_days ({}) must not exceed demand_window.end_days ({})",
                o.start_days, o.end_days
            )));
        }

        validate_markets(&self.markets)?;

        if let Some(bad) = self.regions.iter().find(|r| r.trim().is_empty()) {
            return Err(CoreError::configuration(format!(
                "regions entries must be non-empty (got {:?})",
                bad
            )));
        }

        Ok(())
    }

    /// Resolve config with defaults filled in
    pub fn resolve(&self) -> CoreResult<ResolvedConfig> {
        self.validate()?;

        let regions = if self.regions.is_empty() {
            None
        } else {
            Some(
                self.regions
                    .iter()
                    .map(|r| r.trim().to_ascii_uppercase())
                    .collect(),
            )
        };

        Ok(ResolvedConfig {
            thresholds: self.thresholds(),
            offsets: self.offsets(),
            markets: self.markets.clone(),
            regions,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Self {
        ResolvedConfig {
            thresholds: Thresholds::default(),
            offsets: DemandOffsets::default(),
            markets: Vec::new(),
            regions: None,
            config_path: None,
        }
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.cattrackrc.json`
/// 2. `cattrack.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(CatTrackConfig, PathBuf)>> {
    for name in [".cattrackrc.json", "cattrack.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<CatTrackConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: CatTrackConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (CatTrackConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    tracing::debug!(
        markets = resolved.markets.len(),
        config = ?resolved.config_path,
        "configuration resolved"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = CatTrackConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.thresholds, Thresholds::default());
        assert_eq!(resolved.thresholds.categorical_min, 4);
        assert_eq!(resolved.offsets.start_days, 14);
        assert_eq!(resolved.offsets.end_days, 28);
        assert!(resolved.regions.is_none());
        assert!(resolved.markets.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "thresholds": {
                "categorical_min": 3,
                "hail_prob_min": 30,
                "tornado_prob_min": 10,
                "wind_prob_min": 30
            },
            "demand_window": {"start_days": 10, "end_days": 21},
            "markets": [
                {
                    "name": "Dallas-Fort Worth",
                    "short_name": "DFW",
                    "regions": ["TX"],
                    "unit_ids": ["48113", "48439"]
                }
            ],
            "regions": ["tx", "OK"]
        }"#;
        let config: CatTrackConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.thresholds.categorical_min, 3);
        assert_eq!(resolved.thresholds.tornado_prob_min, 10);
        assert_eq!(resolved.offsets.start_days, 10);
        assert_eq!(resolved.markets[0].short_name, "DFW");
        assert_eq!(
            resolved.regions,
            Some(vec!["TX".to_string(), "OK".to_string()])
        );
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<CatTrackConfig, _> = serde_json::from_str(r#"{"unknown_field": true}"#);
        assert!(result.is_err(), "unknown fields should be rejected");
    }

    #[test]
    fn test_reject_categorical_out_of_range() {
        for bad in [0, 7] {
            let json = format!(r#"{{"thresholds": {{"categorical_min": {}}}}}"#, bad);
            let config: CatTrackConfig = serde_json::from_str(&json).unwrap();
            assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
        }
    }

    #[test]
    fn test_reject_probability_out_of_range() {
        let json = r#"{"thresholds": {"hail_prob_min": 101}}"#;
        let config: CatTrackConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_inverted_demand_window() {
        let json = r#"{"demand_window": {"start_days": 30}}"#;
        let config: CatTrackConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_market_without_units() {
        let json = r#"{"markets": [{"name": "Empty", "short_name": "E", "unit_ids": []}]}"#;
        let config: CatTrackConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_partial_thresholds_use_defaults_for_rest() {
        let json = r#"{"thresholds": {"wind_prob_min": 30}}"#;
        let config: CatTrackConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.thresholds.wind_prob_min, 30);
        assert_eq!(resolved.thresholds.hail_prob_min, 15); // default
        assert_eq!(resolved.thresholds.tornado_prob_min, 5); // default
        assert_eq!(resolved.thresholds.categorical_min, 4); // default
    }

    #[test]
    fn test_discover_cattrackrc() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".cattrackrc.json");
        fs::write(&config_path, r#"{"regions": ["TX"]}"#).unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.regions, vec!["TX"]);
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".cattrackrc.json"), r#"{"regions": ["OK"]}"#).unwrap();
        fs::write(
            dir.path().join("cattrack.config.json"),
            r#"{"regions": ["KS"]}"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.regions, vec!["OK"], ".cattrackrc.json should take priority");
    }

    #[test]
    fn test_discover_config_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cattrack.config.json"),
            r#"{"demand_window": {"end_days": 35}}"#,
        )
        .unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert_eq!(resolved.offsets.end_days, 35);
        assert!(resolved.config_path.is_some());
    }

    #[test]
    fn test_no_config_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.thresholds, ResolvedConfig::defaults().thresholds);
    }

    #[test]
    fn test_invalid_file_names_path_in_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.json");
        fs::write(&config_path, r#"{"thresholds": {"categorical_min": 9}}"#).unwrap();

        let err = load_and_resolve(dir.path(), Some(&config_path)).unwrap_err();
        assert!(format!("{:#}", err).contains("custom.json"));
        assert!(err.downcast_ref::<CoreError>().is_some());
    }
}
