// ⚖️ Reconciliation Engine - Validate revenue totals match
//
// Two checks, per month:
//   1. DTC + B2B + Marketplace revenue lines = Total Revenue
//   2. Combined Total Revenue = channel totals aggregated straight from the
//      loaded data (all B2B customers, all DTC sheets, all marketplace rows)
//
// Check 2 catches rows that never reach a territory, e.g. a B2B customer
// whose country name matches no territory.

use crate::config::ReconciliationConfig;
use crate::model::{Channel, Month, Series};
use crate::pl::{lines, B2bFilter, PlCalculator, PlCategory, PlStatement};
use serde::{Deserialize, Serialize};

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// Every month within tolerance
    Balanced { total_revenue: f64 },

    /// Worst month off by less than the major threshold
    MinorDiscrepancy {
        expected: f64,
        actual: f64,
        difference: f64,
        tolerance: f64,
    },

    /// Worst month off by at least the major threshold
    MajorDiscrepancy {
        expected: f64,
        actual: f64,
        difference: f64,
        affected_months: Vec<String>,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        !self.is_balanced()
    }

    pub fn difference(&self) -> f64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0.0,
            ReconciliationResult::MinorDiscrepancy { difference, .. } => *difference,
            ReconciliationResult::MajorDiscrepancy { difference, .. } => *difference,
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    /// Channel lines do not add up to Total Revenue
    ChannelSumMismatch,
    /// Statement total differs from direct aggregation of the data
    AggregationMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub month: Month,
    pub category: DiscrepancyCategory,
    pub expected: f64,
    pub actual: f64,
    pub difference: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub selection: String,
    pub result: ReconciliationResult,
    pub months_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.result.is_balanced()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {}: {} months checked, {} discrepancies, worst difference £{:.2}",
            self.selection,
            self.months_checked,
            self.discrepancies.len(),
            self.result.difference()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: £0.01)
    pub tolerance: f64,

    /// Threshold for minor vs major discrepancy (default: £100)
    pub major_discrepancy_threshold: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            tolerance: 0.01,
            major_discrepancy_threshold: 100.0,
        }
    }

    pub fn with_thresholds(tolerance: f64, major_threshold: f64) -> Self {
        ReconciliationEngine {
            tolerance,
            major_discrepancy_threshold: major_threshold,
        }
    }

    pub fn from_config(config: &ReconciliationConfig) -> Self {
        Self::with_thresholds(config.tolerance, config.major_threshold)
    }

    /// Channel revenue lines against Total Revenue, month by month
    pub fn check_channel_sum(&self, statement: &PlStatement) -> Vec<Discrepancy> {
        let mut discrepancies = Vec::new();

        for month in &statement.months {
            let expected: f64 = Channel::ALL
                .iter()
                .map(|c| statement.value(PlCategory::Revenue, &lines::revenue(*c), *month))
                .sum();
            let actual = statement.value(PlCategory::Revenue, lines::TOTAL_REVENUE, *month);

            if let Some(d) = self.compare(*month, expected, actual, DiscrepancyCategory::ChannelSumMismatch) {
                discrepancies.push(d);
            }
        }

        discrepancies
    }

    /// Combined Total Revenue against an independent channel aggregation
    pub fn check_aggregation(&self, calc: &PlCalculator<'_>, combined: &PlStatement) -> Vec<Discrepancy> {
        let months = calc.months();
        let independent = [
            calc.b2b_revenue(B2bFilter::All),
            calc.total_dtc_revenue(),
            calc.total_marketplace_revenue(),
        ]
        .iter()
        .fold(Series::zeros(months), |acc, s| acc.plus(s, months));

        months
            .iter()
            .filter_map(|month| {
                let expected = independent.get(*month);
                let actual = combined.value(PlCategory::Revenue, lines::TOTAL_REVENUE, *month);
                self.compare(*month, expected, actual, DiscrepancyCategory::AggregationMismatch)
            })
            .collect()
    }

    fn compare(
        &self,
        month: Month,
        expected: f64,
        actual: f64,
        category: DiscrepancyCategory,
    ) -> Option<Discrepancy> {
        let difference = (actual - expected).abs();
        if difference < self.tolerance {
            return None;
        }

        let description = match category {
            DiscrepancyCategory::ChannelSumMismatch => format!(
                "{}: channel revenue sums to £{:.2} but Total Revenue is £{:.2}",
                month, expected, actual
            ),
            DiscrepancyCategory::AggregationMismatch => format!(
                "{}: combined revenue £{:.2} differs from source data £{:.2}",
                month, actual, expected
            ),
        };

        Some(Discrepancy {
            month,
            category,
            expected,
            actual,
            difference,
            description,
        })
    }

    /// Reconcile one statement on its own (channel sum check only)
    pub fn reconcile_statement(&self, statement: &PlStatement, selection: &str) -> ReconciliationReport {
        let discrepancies = self.check_channel_sum(statement);
        let total_revenue = statement.annual_total(PlCategory::Revenue, lines::TOTAL_REVENUE);
        self.report(selection, statement.months.len(), total_revenue, discrepancies)
    }

    /// Reconcile the combined P&L: channel sums and independent aggregation
    pub fn reconcile(&self, calc: &PlCalculator<'_>) -> ReconciliationReport {
        let combined = calc.combined_pl();
        let mut discrepancies = self.check_channel_sum(&combined);
        discrepancies.extend(self.check_aggregation(calc, &combined));

        let total_revenue = combined.annual_total(PlCategory::Revenue, lines::TOTAL_REVENUE);
        self.report("Combined", combined.months.len(), total_revenue, discrepancies)
    }

    fn report(
        &self,
        selection: &str,
        months_checked: usize,
        total_revenue: f64,
        discrepancies: Vec<Discrepancy>,
    ) -> ReconciliationReport {
        let worst = discrepancies
            .iter()
            .max_by(|a, b| a.difference.total_cmp(&b.difference));

        let result = match worst {
            None => ReconciliationResult::Balanced { total_revenue },
            Some(w) if w.difference < self.major_discrepancy_threshold => {
                ReconciliationResult::MinorDiscrepancy {
                    expected: w.expected,
                    actual: w.actual,
                    difference: w.difference,
                    tolerance: self.tolerance,
                }
            }
            Some(w) => {
                let mut affected_months: Vec<String> = discrepancies
                    .iter()
                    .filter(|d| d.difference >= self.major_discrepancy_threshold)
                    .map(|d| d.month.to_string())
                    .collect();
                affected_months.sort();
                affected_months.dedup();
                ReconciliationResult::MajorDiscrepancy {
                    expected: w.expected,
                    actual: w.actual,
                    difference: w.difference,
                    affected_months,
                }
            }
        };

        ReconciliationReport {
            selection: selection.to_string(),
            result,
            months_checked,
            discrepancies,
            reconciled_at: chrono::Utc::now(),
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
