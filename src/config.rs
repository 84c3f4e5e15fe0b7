// ⚙️ Configuration - workbook layout and model defaults
//
// Every hardcoded offset of the budget workbook lives here, so a layout
// change is a TOML edit instead of a code change.

use crate::model::{DtcMetric, Series};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable consulted when no `--config` flag is given
pub const CONFIG_ENV: &str = "BUDGET_PLANNER_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub workbook: WorkbookLayout,
    pub model: ModelConfig,
    pub reconciliation: ReconciliationConfig,
    pub quality: QualityConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Explicit path first, then `BUDGET_PLANNER_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => {
                info!(path = %path.display(), "loading configuration");
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

// ============================================================================
// WORKBOOK LAYOUT
// ============================================================================

/// A tabular sheet: one header row at a fixed 0-based offset, data below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub file: String,
    pub header_row: usize,
}

impl SheetLayout {
    fn new(file: &str, header_row: usize) -> Self {
        SheetLayout {
            file: file.to_string(),
            header_row,
        }
    }
}

/// Fixed-grid DTC territory sheets. Rows and columns are 1-based, as in the
/// original spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtcLayout {
    /// File name with a `{territory}` placeholder
    pub file_pattern: String,
    pub month_row: usize,
    pub first_month_column: usize,
    pub max_months: usize,
    /// Overrides keyed by metric key ("total_revenue"); unnamed metrics keep
    /// their default rows
    pub metric_rows: BTreeMap<String, usize>,
}

impl Default for DtcLayout {
    fn default() -> Self {
        DtcLayout {
            file_pattern: "{territory}.csv".to_string(),
            month_row: 2,
            first_month_column: 5,
            max_months: 25,
            metric_rows: BTreeMap::new(),
        }
    }
}

impl DtcLayout {
    pub fn file_for(&self, territory: &str) -> String {
        self.file_pattern.replace("{territory}", territory)
    }

    pub fn row_of(&self, metric: DtcMetric) -> usize {
        self.metric_rows
            .get(metric.key())
            .copied()
            .unwrap_or_else(|| metric.default_row())
    }

    /// 0-based grid row of the month header
    pub fn month_row_index(&self) -> usize {
        cell_index(self.month_row)
    }

    /// 0-based grid column of the first month
    pub fn first_month_index(&self) -> usize {
        cell_index(self.first_month_column)
    }

    /// 0-based grid row holding `metric`
    pub fn metric_row_index(&self, metric: DtcMetric) -> usize {
        cell_index(self.row_of(metric))
    }
}

/// 1-based spreadsheet row or column to a 0-based grid index. Row 0 and
/// column 0 are read as the first one.
pub fn cell_index(one_based: usize) -> usize {
    one_based.saturating_sub(1)
}

/// CoGS rates read from single cells of the UK P&L sheet (1-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CogsLayout {
    pub file: String,
    pub column: usize,
    pub dtc_row: usize,
    pub b2b_row: usize,
    pub marketplace_row: usize,
}

impl Default for CogsLayout {
    fn default() -> Self {
        CogsLayout {
            file: "UK P&L.csv".to_string(),
            column: 3,
            dtc_row: 16,
            b2b_row: 17,
            marketplace_row: 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookLayout {
    pub b2b: SheetLayout,
    pub overheads: SheetLayout,
    pub fulfilment: SheetLayout,
    pub marketplace: SheetLayout,
    /// Label of the row that opens the marketplace revenue section. The
    /// section runs to the first blank row or the end of the sheet.
    pub marketplace_marker: String,
    /// Sign used for costs in the overheads sheet
    pub overhead_costs: CostSign,
    pub dtc: DtcLayout,
    pub cogs: CogsLayout,
}

impl Default for WorkbookLayout {
    fn default() -> Self {
        WorkbookLayout {
            b2b: SheetLayout::new("B2B.csv", 5),
            overheads: SheetLayout::new("Overheads.csv", 1),
            fulfilment: SheetLayout::new("Fulfilment.csv", 0),
            marketplace: SheetLayout::new("Amazon.csv", 1),
            marketplace_marker: "Territory £".to_string(),
            overhead_costs: CostSign::Negative,
            dtc: DtcLayout::default(),
            cogs: CogsLayout::default(),
        }
    }
}

/// How a cost sheet writes its costs. Values are normalised to negative
/// costs at load time and written back in the sheet's own sign on export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSign {
    /// Costs are negative and credits positive, as the P&L carries them
    #[default]
    Negative,
    /// Costs are positive and credits negative
    Positive,
}

impl CostSign {
    /// Sheet value to P&L value; also its own inverse
    pub fn normalise(&self, values: &Series) -> Series {
        match self {
            CostSign::Negative => values.clone(),
            CostSign::Positive => values.negated(),
        }
    }
}

// ============================================================================
// MODEL / RECONCILIATION / QUALITY / SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Territories that have a DTC sheet
    pub dtc_territories: Vec<String>,
    /// Used when the fulfilment sheet has no rate for a territory/channel
    pub default_fulfilment_rate: f64,
    pub fiscal_year_start_month: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            dtc_territories: ["UK", "ES", "IT", "RO", "CZ", "HU", "SK", "Other EU"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_fulfilment_rate: -0.15,
            fiscal_year_start_month: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub tolerance: f64,
    pub major_threshold: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig {
            tolerance: 0.01,
            major_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub expected_months: usize,
    pub low_revenue_threshold: f64,
    pub max_mom_growth_pct: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            expected_months: 12,
            low_revenue_threshold: 10_000_000.0,
            max_mom_growth_pct: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_workbook() {
        let config = AppConfig::default();
        assert_eq!(config.workbook.b2b.header_row, 5);
        assert_eq!(config.workbook.overheads.header_row, 1);
        assert_eq!(config.workbook.dtc.row_of(DtcMetric::TotalRevenue), 25);
        assert_eq!(config.workbook.dtc.file_for("Other EU"), "Other EU.csv");
        assert_eq!(config.model.default_fulfilment_rate, -0.15);
        assert_eq!(config.model.dtc_territories.len(), 8);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [workbook.b2b]
            file = "customers.csv"
            header_row = 0

            [workbook.dtc.metric_rows]
            total_revenue = 30

            [model]
            fiscal_year_start_month = 1

            [server]
            bind = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert_eq!(config.workbook.b2b.file, "customers.csv");
        assert_eq!(config.workbook.overheads.file, "Overheads.csv");
        assert_eq!(config.workbook.dtc.row_of(DtcMetric::TotalRevenue), 30);
        // Metrics not named in the file fall back to their sheet rows
        assert_eq!(config.workbook.dtc.row_of(DtcMetric::Traffic), 4);
        assert_eq!(config.model.fiscal_year_start_month, 1);
        assert_eq!(config.model.default_fulfilment_rate, -0.15);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[quality]\nlow_revenue_threshold = 5.0").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.quality.low_revenue_threshold, 5.0);
        assert_eq!(config.quality.expected_months, 12);
    }

    #[test]
    fn test_overhead_cost_sign_from_toml() {
        assert_eq!(AppConfig::default().workbook.overhead_costs, CostSign::Negative);

        let config = AppConfig::from_toml("[workbook]\noverhead_costs = \"positive\"").unwrap();
        assert_eq!(config.workbook.overhead_costs, CostSign::Positive);
        assert_eq!(config.workbook.marketplace_marker, "Territory £");
    }

    #[test]
    fn test_cell_index_is_shared_by_reader_and_writer() {
        let layout = DtcLayout {
            first_month_column: 1,
            month_row: 0,
            ..DtcLayout::default()
        };
        assert_eq!(layout.first_month_index(), 0);
        assert_eq!(layout.month_row_index(), 0);
        assert_eq!(DtcLayout::default().first_month_index(), 4);
        assert_eq!(DtcLayout::default().metric_row_index(DtcMetric::TotalRevenue), 24);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(AppConfig::from_toml("[model\nbroken").is_err());
    }
}
