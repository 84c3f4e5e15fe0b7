// 🎛️ Scenario adjustments - named scalar deltas applied at calculation time
//
// A scenario is a map of adjustment name → number, e.g.
//   b2b_growth = 10        (+10% B2B revenue)
//   cogs_change = -2       (-2pp on every CoGS rate)
//   fulfilment_rate_UK_DTC = -0.12
// Names are parsed into `Adjustment` once; unknown names are rejected.

use crate::error::ScenarioError;
use crate::model::Channel;
use crate::territory::TerritoryRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// ADJUSTMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Adjustment {
    /// % on DTC revenue in every territory
    DtcGrowth,
    /// % on DTC revenue in one territory (wins over `DtcGrowth`)
    DtcRevenue(String),
    /// % on B2B revenue
    B2bGrowth,
    /// % on marketplace revenue
    MarketplaceGrowth,
    /// Percentage points added to every CoGS rate
    CogsChange,
    /// Absolute CoGS rate for a channel
    CogsRate(Channel),
    /// Percentage points of extra fulfilment cost
    FulfilmentChange,
    /// Absolute fulfilment rate for a territory/channel pair
    FulfilmentRate(String, Channel),
    /// % on all overheads
    OverheadChange,
    /// % on overheads whose function is Marketing
    MarketingChange,
}

impl Adjustment {
    /// Parse an adjustment name. Territory names resolve to their codes.
    pub fn parse(name: &str, registry: &TerritoryRegistry) -> Result<Self, ScenarioError> {
        let name = name.trim();
        match name {
            "dtc_growth" => return Ok(Adjustment::DtcGrowth),
            "b2b_growth" => return Ok(Adjustment::B2bGrowth),
            "mp_growth" => return Ok(Adjustment::MarketplaceGrowth),
            "cogs_change" => return Ok(Adjustment::CogsChange),
            "fulfilment_change" => return Ok(Adjustment::FulfilmentChange),
            "overhead_change" => return Ok(Adjustment::OverheadChange),
            "marketing_change" => return Ok(Adjustment::MarketingChange),
            _ => {}
        }

        let territory = |raw: &str| {
            registry
                .canonical_code(raw)
                .map(|c| c.to_string())
                .ok_or_else(|| ScenarioError::UnknownTerritory {
                    name: name.to_string(),
                    territory: raw.to_string(),
                })
        };
        let channel = |raw: &str| {
            Channel::parse(raw).ok_or_else(|| ScenarioError::UnknownChannel {
                name: name.to_string(),
                channel: raw.to_string(),
            })
        };

        if let Some(rest) = name.strip_prefix("dtc_revenue_") {
            return Ok(Adjustment::DtcRevenue(territory(rest)?));
        }
        if let Some(rest) = name.strip_prefix("cogs_rate_") {
            return Ok(Adjustment::CogsRate(channel(rest)?));
        }
        if let Some(rest) = name.strip_prefix("fulfilment_rate_") {
            // Territory may contain spaces or underscores; the channel never does
            let (t, c) = rest
                .rsplit_once('_')
                .ok_or_else(|| ScenarioError::UnknownAdjustment(name.to_string()))?;
            return Ok(Adjustment::FulfilmentRate(territory(t)?, channel(c)?));
        }

        Err(ScenarioError::UnknownAdjustment(name.to_string()))
    }

    /// Canonical name, the inverse of `parse`
    pub fn key(&self) -> String {
        match self {
            Adjustment::DtcGrowth => "dtc_growth".to_string(),
            Adjustment::DtcRevenue(t) => format!("dtc_revenue_{}", t),
            Adjustment::B2bGrowth => "b2b_growth".to_string(),
            Adjustment::MarketplaceGrowth => "mp_growth".to_string(),
            Adjustment::CogsChange => "cogs_change".to_string(),
            Adjustment::CogsRate(c) => format!("cogs_rate_{}", c.label()),
            Adjustment::FulfilmentChange => "fulfilment_change".to_string(),
            Adjustment::FulfilmentRate(t, c) => format!("fulfilment_rate_{}_{}", t, c.label()),
            Adjustment::OverheadChange => "overhead_change".to_string(),
            Adjustment::MarketingChange => "marketing_change".to_string(),
        }
    }
}

// ============================================================================
// SCENARIO
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Scenario {
    values: BTreeMap<Adjustment, f64>,
}

impl Scenario {
    /// The unadjusted budget
    pub fn baseline() -> Self {
        Scenario::default()
    }

    pub fn with(mut self, adjustment: Adjustment, value: f64) -> Self {
        self.values.insert(adjustment, value);
        self
    }

    pub fn set(&mut self, adjustment: Adjustment, value: f64) {
        self.values.insert(adjustment, value);
    }

    pub fn get(&self, adjustment: &Adjustment) -> Option<f64> {
        self.values.get(adjustment).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Adjustment, f64)> {
        self.values.iter().map(|(a, v)| (a, *v))
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ScenarioError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let registry = TerritoryRegistry::new();
        let mut scenario = Scenario::default();
        for (name, value) in pairs {
            if !value.is_finite() {
                return Err(ScenarioError::InvalidValue {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            scenario.set(Adjustment::parse(name, &registry)?, value);
        }
        Ok(scenario)
    }

    /// Parse `name=value` assignments, as given on the command line
    pub fn from_assignments<S: AsRef<str>>(items: &[S]) -> Result<Self, ScenarioError> {
        let mut pairs = Vec::with_capacity(items.len());
        for item in items {
            let item = item.as_ref();
            let (name, raw) = item
                .split_once('=')
                .ok_or_else(|| ScenarioError::MalformedAssignment(item.to_string()))?;
            let value: f64 = raw.trim().parse().map_err(|_| ScenarioError::InvalidValue {
                name: name.trim().to_string(),
                value: raw.trim().to_string(),
            })?;
            pairs.push((name.trim(), value));
        }
        Scenario::from_pairs(pairs)
    }

    // ========================================================================
    // EFFECTIVE FACTORS
    // ========================================================================

    fn pct_factor(pct: Option<f64>) -> f64 {
        1.0 + pct.unwrap_or(0.0) / 100.0
    }

    /// Multiplier for DTC revenue in `territory`
    pub fn dtc_factor(&self, territory: &str) -> f64 {
        let specific = self.get(&Adjustment::DtcRevenue(territory.to_string()));
        Self::pct_factor(specific.or_else(|| self.get(&Adjustment::DtcGrowth)))
    }

    pub fn b2b_factor(&self) -> f64 {
        Self::pct_factor(self.get(&Adjustment::B2bGrowth))
    }

    pub fn marketplace_factor(&self) -> f64 {
        Self::pct_factor(self.get(&Adjustment::MarketplaceGrowth))
    }

    /// Effective CoGS rate (positive share of revenue)
    pub fn cogs_rate(&self, channel: Channel, base: f64) -> f64 {
        let rate = self
            .get(&Adjustment::CogsRate(channel))
            .unwrap_or(base)
            .abs();
        match self.get(&Adjustment::CogsChange) {
            Some(pp) => (rate + pp / 100.0).max(0.0),
            None => rate,
        }
    }

    /// Effective fulfilment cost rate as a positive magnitude
    pub fn fulfilment_rate(&self, territory: &str, channel: Channel, base: f64) -> f64 {
        let rate = self
            .get(&Adjustment::FulfilmentRate(territory.to_string(), channel))
            .unwrap_or(base)
            .abs();
        match self.get(&Adjustment::FulfilmentChange) {
            Some(pp) => (rate + pp / 100.0).max(0.0),
            None => rate,
        }
    }

    /// Multiplier for an overhead row with the given function. Any function
    /// whose name mentions marketing also takes `marketing_change`. Never
    /// negative, so a cut of more than 100% zeroes the row.
    pub fn overhead_factor(&self, function: &str) -> f64 {
        let mut factor = Self::pct_factor(self.get(&Adjustment::OverheadChange)).max(0.0);
        if is_marketing_function(function) {
            factor *= Self::pct_factor(self.get(&Adjustment::MarketingChange)).max(0.0);
        }
        factor
    }
}

/// Overhead functions such as "Marketing" or "Brand Marketing"
pub fn is_marketing_function(function: &str) -> bool {
    function.to_lowercase().contains("marketing")
}

impl TryFrom<BTreeMap<String, f64>> for Scenario {
    type Error = ScenarioError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Scenario::from_pairs(map.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<Scenario> for BTreeMap<String, f64> {
    fn from(scenario: Scenario) -> Self {
        scenario.values.iter().map(|(a, v)| (a.key(), *v)).collect()
    }
}

// ============================================================================
// SAVED SCENARIOS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedScenario {
    pub id: Uuid,
    pub name: String,
    pub scenario: Scenario,
    pub saved_at: DateTime<Utc>,
}

/// Named scenarios kept for the lifetime of the process
#[derive(Debug, Clone, Default)]
pub struct ScenarioLibrary {
    saved: Vec<SavedScenario>,
}

impl ScenarioLibrary {
    pub fn new() -> Self {
        ScenarioLibrary::default()
    }

    pub fn save(&mut self, name: &str, scenario: Scenario) -> &SavedScenario {
        self.saved.push(SavedScenario {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scenario,
            saved_at: Utc::now(),
        });
        &self.saved[self.saved.len() - 1]
    }

    pub fn list(&self) -> &[SavedScenario] {
        &self.saved
    }

    pub fn get(&self, id: Uuid) -> Option<&SavedScenario> {
        self.saved.iter().find(|s| s.id == id)
    }

    /// Most recently saved scenario with this name
    pub fn find_by_name(&self, name: &str) -> Option<&SavedScenario> {
        self.saved.iter().rev().find(|s| s.name == name)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<SavedScenario> {
        let index = self.saved.iter().position(|s| s.id == id)?;
        Some(self.saved.remove(index))
    }
}
