//! Confirmation signals from already-fetched warning alerts
//!
//! The alert feed itself is fetched elsewhere. This module only decides
//! which markets count as "it happened" for day-1 demand windows.

use crate::markets::Market;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One active alert, reduced to the fields that matter for confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub event: String,
    #[serde(default)]
    pub certainty: String,
}

/// An alert list confirms an event if any alert was observed or is a
/// warning (not a watch).
pub fn has_confirmed_warnings(alerts: &[Alert]) -> bool {
    alerts
        .iter()
        .any(|a| a.certainty.eq_ignore_ascii_case("observed") || a.event.contains("Warning"))
}

/// Market short names with an observed event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationSignals {
    markets: BTreeSet<String>,
}

impl ConfirmationSignals {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_markets<I, S>(short_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markets: short_names.into_iter().map(Into::into).collect(),
        }
    }

    /// A market is confirmed when any of its owning regions has a
    /// confirming alert.
    pub fn from_alerts(
        markets: &[Market],
        alerts_by_region: &BTreeMap<String, Vec<Alert>>,
    ) -> Self {
        let confirmed_regions: BTreeSet<String> = alerts_by_region
            .iter()
            .filter(|(_, alerts)| has_confirmed_warnings(alerts))
            .map(|(region, _)| region.to_ascii_uppercase())
            .collect();

        Self::from_markets(
            markets
                .iter()
                .filter(|m| {
                    m.regions
                        .iter()
                        .any(|r| confirmed_regions.contains(&r.to_ascii_uppercase()))
                })
                .map(|m| m.short_name.clone()),
        )
    }

    pub fn is_confirmed(&self, short_name: &str) -> bool {
        self.markets.contains(short_name)
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
