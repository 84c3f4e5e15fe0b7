// ✅ Data Quality Engine - completeness, anomaly and reconciliation checks
//
// Scoring: ten checks are budgeted. Each critical issue costs one check,
// each warning half a check:
//   score = (10 - critical - 0.5 × warnings) / 10 × 100, clamped to 0..=100

use crate::config::AppConfig;
use crate::model::{BudgetData, Channel};
use crate::pl::{B2bFilter, PlCalculator};
use crate::reconciliation::{ReconciliationEngine, ReconciliationResult};
use crate::scenario::Scenario;
use crate::territory::TerritoryRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const TOTAL_CHECKS: f64 = 10.0;

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Data is missing or the model does not add up
    Warning,  // Data is questionable or incomplete
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

impl QualityIssue {
    fn new(severity: Severity, field: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity,
            field: field.to_string(),
            issue,
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityRating {
    Good,
    Acceptable,
    NeedsImprovement,
}

impl QualityRating {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            QualityRating::Good
        } else if score >= 60.0 {
            QualityRating::Acceptable
        } else {
            QualityRating::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityRating::Good => "Good",
            QualityRating::Acceptable => "Acceptable",
            QualityRating::NeedsImprovement => "Needs improvement",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: f64,
    pub rating: QualityRating,
    pub issues: Vec<QualityIssue>,
    pub b2b_revenue: f64,
    pub dtc_revenue: f64,
    pub marketplace_revenue: f64,
    pub total_revenue: f64,
}

impl QualityReport {
    pub fn critical_count(&self) -> usize {
        self.count(Severity::Critical)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.critical_count() > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Quality: {:.0}% ({}), Issues: {} ({} critical, {} warnings)",
            self.score,
            self.rating.label(),
            self.issues.len(),
            self.critical_count(),
            self.warning_count()
        )
    }
}

/// Score from issue counts
pub fn quality_score(critical: usize, warnings: usize) -> f64 {
    let passed = TOTAL_CHECKS - critical as f64 - warnings as f64 * 0.5;
    (passed / TOTAL_CHECKS * 100.0).clamp(0.0, 100.0)
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Territories expected to carry a DTC sheet
    dtc_territories: Vec<String>,

    expected_months: usize,

    /// Total revenue below this is flagged
    low_revenue_threshold: f64,

    /// Month-over-month DTC change (in %) beyond which a month is flagged
    max_mom_growth_pct: f64,

    reconciliation: ReconciliationEngine,
}

impl DataQualityEngine {
    pub fn new() -> Self {
        Self::from_config(&AppConfig::default())
    }

    pub fn from_config(config: &AppConfig) -> Self {
        DataQualityEngine {
            dtc_territories: config.model.dtc_territories.clone(),
            expected_months: config.quality.expected_months,
            low_revenue_threshold: config.quality.low_revenue_threshold,
            max_mom_growth_pct: config.quality.max_mom_growth_pct,
            reconciliation: ReconciliationEngine::from_config(&config.reconciliation),
        }
    }

    pub fn with_low_revenue_threshold(mut self, threshold: f64) -> Self {
        self.low_revenue_threshold = threshold;
        self
    }

    /// Run every check against the data as seen through `scenario`
    pub fn validate(&self, data: &BudgetData, scenario: &Scenario) -> QualityReport {
        let calc = PlCalculator::new(data, scenario);
        let mut issues = Vec::new();

        // Check 1: completeness
        self.check_completeness(data, &mut issues);

        // Check 2: revenue levels
        let b2b_revenue = calc.b2b_revenue(B2bFilter::All).total_over(calc.months());
        let dtc_revenue = calc.total_dtc_revenue().total_over(calc.months());
        let marketplace_revenue = calc.total_marketplace_revenue().total_over(calc.months());
        let total_revenue = b2b_revenue + dtc_revenue + marketplace_revenue;

        if b2b_revenue == 0.0 {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "b2b",
                "B2B revenue is zero".to_string(),
                "Check the B2B sheet header row and month columns",
            ));
        }
        if dtc_revenue == 0.0 {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "dtc",
                "DTC revenue is zero".to_string(),
                "Check the Total Revenue row of the territory sheets",
            ));
        }
        if total_revenue < self.low_revenue_threshold {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "revenue",
                format!(
                    "Total revenue £{:.1}M is below £{:.1}M",
                    total_revenue / 1e6,
                    self.low_revenue_threshold / 1e6
                ),
                "Confirm that every revenue sheet was loaded",
            ));
        }

        // Check 3: anomalies
        self.check_growth(&calc, &mut issues);
        self.check_cogs_rates(data, &mut issues);
        self.check_unmatched_countries(data, &mut issues);

        // Check 4: reconciliation
        let reconciliation = self.reconciliation.reconcile(&calc);
        if let ReconciliationResult::MajorDiscrepancy { difference, .. } = reconciliation.result {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "reconciliation",
                format!("Revenue reconciliation error: £{:.0} difference", difference),
                "Compare the combined P&L with the channel totals month by month",
            ));
        }

        let score = quality_score(
            issues.iter().filter(|i| i.severity == Severity::Critical).count(),
            issues.iter().filter(|i| i.severity == Severity::Warning).count(),
        );

        QualityReport {
            score,
            rating: QualityRating::from_score(score),
            issues,
            b2b_revenue,
            dtc_revenue,
            marketplace_revenue,
            total_revenue,
        }
    }

    fn check_completeness(&self, data: &BudgetData, issues: &mut Vec<QualityIssue>) {
        let missing: Vec<&str> = self
            .dtc_territories
            .iter()
            .filter(|t| !data.dtc.contains_key(t.as_str()))
            .map(|t| t.as_str())
            .collect();
        if !missing.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "dtc",
                format!("Missing DTC data for: {}", missing.join(", ")),
                "Add the territory sheets or remove them from model.dtc_territories",
            ));
        }

        if data.customers.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "b2b",
                "No B2B data loaded".to_string(),
                "Check the B2B sheet exists and its header row is correct",
            ));
        } else if data.months.len() < self.expected_months {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "b2b",
                format!(
                    "B2B data has only {} months (expected {})",
                    data.months.len(),
                    self.expected_months
                ),
                "Extend the B2B sheet to the full budget year",
            ));
        }
    }

    fn check_growth(&self, calc: &PlCalculator<'_>, issues: &mut Vec<QualityIssue>) {
        for territory in &self.dtc_territories {
            let revenue = calc.dtc_revenue(territory);
            let months = calc.months();

            for pair in months.windows(2) {
                let previous = revenue.get(pair[0]);
                if previous <= 0.0 {
                    continue;
                }
                let growth = (revenue.get(pair[1]) - previous) / previous * 100.0;
                if growth.abs() > self.max_mom_growth_pct {
                    issues.push(QualityIssue::new(
                        Severity::Warning,
                        "dtc",
                        format!("{} DTC: {:+.0}% MoM growth in {}", territory, growth, pair[1]),
                        "Check the month's traffic and conversion inputs",
                    ));
                }
            }
        }
    }

    fn check_cogs_rates(&self, data: &BudgetData, issues: &mut Vec<QualityIssue>) {
        for channel in Channel::ALL {
            let rate = data.cogs_rates.get(channel);
            if !(0.0..=1.0).contains(&rate) {
                issues.push(QualityIssue::new(
                    Severity::Warning,
                    "cogs",
                    format!("{} CoGS rate ({:.1}%) seems unusual", channel, rate * 100.0),
                    "CoGS rates are shares of revenue between 0 and 1",
                ));
            }
        }
    }

    fn check_unmatched_countries(&self, data: &BudgetData, issues: &mut Vec<QualityIssue>) {
        let registry = TerritoryRegistry::new();
        let unmatched: BTreeSet<&str> = data
            .customers
            .iter()
            .filter(|c| registry.resolve(&c.country).is_none())
            .map(|c| c.country.as_str())
            .collect();

        for country in unmatched {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "b2b",
                format!("B2B country '{}' matches no territory", country),
                "Rename the country or add it as a territory alias",
            ));
        }
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}
