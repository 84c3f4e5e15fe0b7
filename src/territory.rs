// 🗺️ Territory registry - one identity, many spellings
//
// Problem solved:
// - "UK", "United Kingdom", "GB" → All the same territory
// - B2B rows use full country names, overheads use codes, the marketplace
//   sheet uses its own labels ("Other RoW"). Joins go through `resolve`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// REGION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    Uk,
    CentralEurope,
    EasternEurope,
    RestOfWorld,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::Uk,
        Region::CentralEurope,
        Region::EasternEurope,
        Region::RestOfWorld,
    ];

    /// Code used in the "Country Group" column
    pub fn code(&self) -> &'static str {
        match self {
            Region::Uk => "UK",
            Region::CentralEurope => "CE",
            Region::EasternEurope => "EE",
            Region::RestOfWorld => "ROW",
        }
    }

    pub fn parse(raw: &str) -> Option<Region> {
        let key = raw.trim().to_lowercase();
        Region::ALL
            .into_iter()
            .find(|r| r.code().to_lowercase() == key)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// TERRITORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Territory {
    /// Short code used across the model ("UK", "Other EU")
    pub code: &'static str,
    /// Name used in the B2B "Country" column
    pub country_name: &'static str,
    /// Row label in the marketplace revenue section
    pub marketplace_name: &'static str,
    pub region: Region,
    pub aliases: &'static [&'static str],
}

impl Territory {
    /// Case-insensitive match against code, names and aliases
    pub fn matches(&self, name: &str) -> bool {
        let key = normalize(name);
        if key.is_empty() {
            return false;
        }
        normalize(self.code) == key
            || normalize(self.country_name) == key
            || normalize(self.marketplace_name) == key
            || self.aliases.iter().any(|a| normalize(a) == key)
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const TERRITORIES: [Territory; 14] = [
    Territory {
        code: "UK",
        country_name: "United Kingdom",
        marketplace_name: "UK",
        region: Region::Uk,
        aliases: &["GB", "Great Britain", "England"],
    },
    Territory {
        code: "ES",
        country_name: "Spain",
        marketplace_name: "Spain",
        region: Region::CentralEurope,
        aliases: &["España"],
    },
    Territory {
        code: "DE",
        country_name: "Germany",
        marketplace_name: "Germany",
        region: Region::CentralEurope,
        aliases: &["Deutschland"],
    },
    Territory {
        code: "IT",
        country_name: "Italy",
        marketplace_name: "Italy",
        region: Region::CentralEurope,
        aliases: &["Italia"],
    },
    Territory {
        code: "FR",
        country_name: "France",
        marketplace_name: "France",
        region: Region::CentralEurope,
        aliases: &[],
    },
    Territory {
        code: "RO",
        country_name: "Romania",
        marketplace_name: "Romania",
        region: Region::EasternEurope,
        aliases: &[],
    },
    Territory {
        code: "PL",
        country_name: "Poland",
        marketplace_name: "Poland",
        region: Region::EasternEurope,
        aliases: &["Polska"],
    },
    Territory {
        code: "CZ",
        country_name: "Czech Republic",
        marketplace_name: "Czech Republic",
        region: Region::EasternEurope,
        aliases: &["Czechia"],
    },
    Territory {
        code: "HU",
        country_name: "Hungary",
        marketplace_name: "Hungary",
        region: Region::EasternEurope,
        aliases: &[],
    },
    Territory {
        code: "SK",
        country_name: "Slovakia",
        marketplace_name: "Slovakia",
        region: Region::EasternEurope,
        aliases: &["Slovak Republic"],
    },
    Territory {
        code: "Other EU",
        country_name: "Other EU",
        marketplace_name: "Other EU",
        region: Region::CentralEurope,
        aliases: &["EU Other", "Rest of EU"],
    },
    Territory {
        code: "US",
        country_name: "United States",
        marketplace_name: "United States",
        region: Region::RestOfWorld,
        aliases: &["USA", "United States of America"],
    },
    Territory {
        code: "AU",
        country_name: "Australia",
        marketplace_name: "Australia",
        region: Region::RestOfWorld,
        aliases: &[],
    },
    Territory {
        code: "ROW",
        country_name: "Rest of World",
        marketplace_name: "Other RoW",
        region: Region::RestOfWorld,
        aliases: &["RoW", "Other ROW", "Rest of the World"],
    },
];

/// Labels for overheads that sit above the territories
const GROUP_LABELS: [&str; 5] = ["Group", "Shared", "Central", "Corporate", "HQ"];

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct TerritoryRegistry {
    territories: Vec<Territory>,
}

impl TerritoryRegistry {
    /// Registry with the 14 modelled territories
    pub fn new() -> Self {
        TerritoryRegistry {
            territories: TERRITORIES.to_vec(),
        }
    }

    pub fn all(&self) -> &[Territory] {
        &self.territories
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.territories.iter().map(|t| t.code).collect()
    }

    /// Resolve any code, name or alias to its territory
    pub fn resolve(&self, name: &str) -> Option<&Territory> {
        self.territories.iter().find(|t| t.matches(name))
    }

    /// Canonical code for `name`, if it is a known territory
    pub fn canonical_code(&self, name: &str) -> Option<&'static str> {
        self.resolve(name).map(|t| t.code)
    }

    /// Region of a B2B customer: its Country Group when that names a
    /// region, else the region of its country
    pub fn region_of(&self, country_group: &str, country: &str) -> Option<Region> {
        Region::parse(country_group).or_else(|| self.resolve(country).map(|t| t.region))
    }

    pub fn in_region(&self, region: Region) -> Vec<&Territory> {
        self.territories.iter().filter(|t| t.region == region).collect()
    }

    /// True for overhead territory labels that mean "not allocated"
    pub fn is_group_label(&self, name: &str) -> bool {
        let key = normalize(name);
        key.is_empty() || GROUP_LABELS.iter().any(|g| normalize(g) == key)
    }

    pub fn count(&self) -> usize {
        self.territories.len()
    }
}

impl Default for TerritoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
