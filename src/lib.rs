// Budget Planner - Core Library
// Workbook loading, P&L calculation and scenario modelling shared by the
// CLI, the terminal UI and the API server

pub mod config;
pub mod error;
pub mod model;
pub mod territory;
pub mod loader;
pub mod scenario;
pub mod pl;
pub mod waterfall;
pub mod reconciliation;
pub mod data_quality;
pub mod dashboard;
pub mod marketing;
pub mod dtc;
pub mod export;

#[cfg(feature = "server")]
pub mod api;

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use config::{AppConfig, CostSign};
pub use error::{EditError, LoadError, ScenarioError};
pub use model::{
    month_range, BudgetData, Channel, CogsRates, CustomerRevenue, DtcInputs, DtcMetric,
    FulfilmentRate, MarketplaceRow, Month, OverheadRow, Series,
};
pub use territory::{Region, Territory, TerritoryRegistry};
pub use loader::{load_workbook, WorkbookLoader};
pub use scenario::{is_marketing_function, Adjustment, SavedScenario, Scenario, ScenarioLibrary};
pub use pl::{
    compare_scenarios, B2bFilter, Period, PeriodTable, PlCalculator, PlCategory, PlLine,
    PlStatement, ScenarioComparison, Selection,
};
pub use waterfall::{KeyMetrics, StepKind, Waterfall, WaterfallStep};
pub use reconciliation::{
    Discrepancy, DiscrepancyCategory, ReconciliationEngine, ReconciliationReport,
    ReconciliationResult,
};
pub use data_quality::{DataQualityEngine, QualityIssue, QualityRating, QualityReport, Severity};
pub use dashboard::{b2b_view, top_customers, B2bCustomerRow, B2bQuery, B2bView, DashboardSummary, TopCustomer};
pub use marketing::{MarketingReport, MarketingScenario, MarketingSpend, SpendSource, TerritoryRoi};
pub use dtc::{project_dtc, DriverAdjustment, DtcProjection, ProjectedMonth};
pub use export::{
    export_bundle, export_workbook, format_currency, format_percentage, marketing_to_csv_string,
    read_statement_csv, write_marketing_csv, write_statement_csv, BundleManifest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
