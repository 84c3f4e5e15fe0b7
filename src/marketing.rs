// 📣 Marketing spend - where the budget goes and what it returns
//
// Spend comes from two places: the "Marketing Budget" row of each DTC
// territory sheet, and the overhead rows whose function mentions marketing,
// reported together as "Central". Spend is shown as a positive amount.

use crate::model::{BudgetData, DtcMetric, Month, Series};
use crate::pl::{B2bFilter, PlCalculator};
use crate::scenario::is_marketing_function;
use serde::{Deserialize, Serialize};

/// Label for marketing held in the overheads sheet
pub const CENTRAL: &str = "Central";

/// Revenue gained per extra £1 of marketing when none is given
pub const DEFAULT_ASSUMED_ROI: f64 = 3.0;

/// Cuts lose more revenue per £1 than increases gain
const CUT_PENALTY: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendSource {
    #[serde(rename = "DTC")]
    Dtc,
    Group,
}

impl SpendSource {
    pub fn label(&self) -> &'static str {
        match self {
            SpendSource::Dtc => "DTC",
            SpendSource::Group => "Group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingSpend {
    pub territory: String,
    pub source: SpendSource,
    pub monthly: Series,
    pub annual: f64,
}

/// DTC revenue earned per £1 of a territory's marketing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryRoi {
    pub territory: String,
    pub marketing: f64,
    pub revenue: f64,
    pub roi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingReport {
    pub months: Vec<Month>,
    /// Largest annual spend first
    pub spend: Vec<MarketingSpend>,
    pub monthly_total: Series,
    pub annual_total: f64,
    pub average_monthly: f64,
    pub total_revenue: f64,
    /// Marketing as a percentage of total revenue
    pub marketing_pct: f64,
    pub revenue_per_pound: f64,
    /// Territories with their own marketing budget; Central is not counted
    pub territories_with_marketing: usize,
    /// Best return first
    pub roi: Vec<TerritoryRoi>,
}

impl MarketingReport {
    pub fn build(calc: &PlCalculator<'_>, data: &BudgetData) -> Self {
        let months = calc.months().to_vec();
        let mut spend = Vec::new();

        for (territory, inputs) in &data.dtc {
            let Some(budget) = inputs.metric(DtcMetric::MarketingBudget) else {
                continue;
            };
            let monthly = budget.map_over(&months, |v| v);
            let annual = monthly.total_over(&months);
            if annual > 0.0 {
                spend.push(MarketingSpend {
                    territory: territory.clone(),
                    source: SpendSource::Dtc,
                    monthly,
                    annual,
                });
            }
        }

        // Overhead costs are negative; the monthly net is shown as spend
        let mut central = Series::zeros(&months);
        for row in data.overheads.iter().filter(|r| is_marketing_function(&r.function)) {
            for month in &months {
                central.add_to(*month, row.values.get(*month));
            }
        }
        let central = central.map_over(&months, f64::abs);
        let central_annual = central.total_over(&months);
        if central_annual > 0.0 {
            spend.push(MarketingSpend {
                territory: CENTRAL.to_string(),
                source: SpendSource::Group,
                monthly: central,
                annual: central_annual,
            });
        }

        spend.sort_by(|a, b| b.annual.total_cmp(&a.annual).then_with(|| a.territory.cmp(&b.territory)));

        let monthly_total = spend
            .iter()
            .fold(Series::zeros(&months), |acc, s| acc.plus(&s.monthly, &months));
        let annual_total = monthly_total.total_over(&months);

        let total_revenue = calc.b2b_revenue(B2bFilter::All).total_over(&months)
            + calc.total_dtc_revenue().total_over(&months)
            + calc.total_marketplace_revenue().total_over(&months);

        let mut roi: Vec<TerritoryRoi> = spend
            .iter()
            .filter(|s| s.source == SpendSource::Dtc)
            .map(|s| {
                let revenue = calc.dtc_revenue(&s.territory).total_over(&months);
                TerritoryRoi {
                    territory: s.territory.clone(),
                    marketing: s.annual,
                    revenue,
                    roi: revenue / s.annual,
                }
            })
            .collect();
        roi.sort_by(|a, b| b.roi.total_cmp(&a.roi));

        MarketingReport {
            average_monthly: if months.is_empty() {
                0.0
            } else {
                annual_total / months.len() as f64
            },
            marketing_pct: ratio(annual_total, total_revenue) * 100.0,
            revenue_per_pound: ratio(total_revenue, annual_total),
            territories_with_marketing: spend.iter().filter(|s| s.source == SpendSource::Dtc).count(),
            months,
            spend,
            monthly_total,
            annual_total,
            total_revenue,
            roi,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spend.is_empty()
    }

    pub fn best_roi(&self) -> Option<&TerritoryRoi> {
        self.roi.first()
    }

    pub fn spend_for(&self, territory: &str) -> Option<&MarketingSpend> {
        self.spend.iter().find(|s| s.territory == territory)
    }

    /// Revenue effect of changing the whole marketing budget by `change_pct`
    pub fn scenario(&self, change_pct: f64, assumed_roi: f64) -> MarketingScenario {
        let new_marketing = (self.annual_total * (1.0 + change_pct / 100.0)).max(0.0);
        let marketing_delta = new_marketing - self.annual_total;
        let revenue_impact = if marketing_delta < 0.0 {
            marketing_delta * assumed_roi * CUT_PENALTY
        } else {
            marketing_delta * assumed_roi
        };
        let new_revenue = self.total_revenue + revenue_impact;
        let new_pct = ratio(new_marketing, new_revenue) * 100.0;

        MarketingScenario {
            change_pct,
            assumed_roi,
            current_marketing: self.annual_total,
            new_marketing,
            marketing_delta,
            current_revenue: self.total_revenue,
            new_revenue,
            revenue_impact,
            current_pct: self.marketing_pct,
            new_pct,
            pct_change_pp: new_pct - self.marketing_pct,
        }
    }

    /// One row per territory and month, in report order
    pub fn rows(&self) -> impl Iterator<Item = MarketingRow<'_>> + '_ {
        self.spend.iter().flat_map(move |s| {
            self.months.iter().map(move |m| MarketingRow {
                territory: &s.territory,
                source: s.source,
                month: *m,
                spend: s.monthly.get(*m),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketingRow<'a> {
    pub territory: &'a str,
    pub source: SpendSource,
    pub month: Month,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingScenario {
    pub change_pct: f64,
    pub assumed_roi: f64,
    pub current_marketing: f64,
    pub new_marketing: f64,
    pub marketing_delta: f64,
    pub current_revenue: f64,
    pub new_revenue: f64,
    pub revenue_impact: f64,
    pub current_pct: f64,
    pub new_pct: f64,
    pub pct_change_pp: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OverheadRow;
    use crate::pl::tests::sample_data;
    use crate::scenario::Scenario;

    fn with_budgets() -> BudgetData {
        let mut data = sample_data();
        let months = data.months.clone();
        if let Some(uk) = data.dtc.get_mut("UK") {
            uk.metrics.insert(
                DtcMetric::MarketingBudget,
                Series::from_pairs(months.iter().map(|m| (*m, 500.0))),
            );
        }
        data.overheads.push(OverheadRow {
            territory: "Group".to_string(),
            function: "Brand Marketing".to_string(),
            category: "Agency".to_string(),
            group: String::new(),
            supplier: String::new(),
            values: Series::from_pairs(months.iter().map(|m| (*m, -100.0))),
        });
        data
    }

    #[test]
    fn test_report_collects_dtc_and_central_spend() {
        let data = with_budgets();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let report = MarketingReport::build(&calc, &data);

        assert_eq!(report.spend.len(), 2);
        assert_eq!(report.spend[0].territory, "UK");
        assert_eq!(report.spend[0].annual, 1500.0);

        // UK Marketing -300 plus Brand Marketing -100 a month
        let central = report.spend_for(CENTRAL).unwrap();
        assert_eq!(central.source, SpendSource::Group);
        assert_eq!(central.annual, 1200.0);

        assert_eq!(report.annual_total, 2700.0);
        assert_eq!(report.average_monthly, 900.0);
        assert_eq!(report.territories_with_marketing, 1);
        assert_eq!(report.monthly_total.get(data.months[0]), 900.0);
    }

    #[test]
    fn test_revenue_ratios_and_roi() {
        let data = with_budgets();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let report = MarketingReport::build(&calc, &data);

        // DTC 6000 + B2B 4500 + marketplace 1200
        assert_eq!(report.total_revenue, 11_700.0);
        assert!((report.marketing_pct - 2700.0 / 11_700.0 * 100.0).abs() < 1e-9);
        assert!((report.revenue_per_pound - 11_700.0 / 2700.0).abs() < 1e-9);

        let best = report.best_roi().unwrap();
        assert_eq!(best.territory, "UK");
        assert_eq!(best.roi, 4.0);
    }

    #[test]
    fn test_zero_budgets_are_left_out() {
        let mut data = sample_data();
        data.overheads.retain(|r| !is_marketing_function(&r.function));
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let report = MarketingReport::build(&calc, &data);

        assert!(report.is_empty());
        assert_eq!(report.revenue_per_pound, 0.0);
        assert_eq!(report.marketing_pct, 0.0);
        assert!(report.best_roi().is_none());
    }

    #[test]
    fn test_scenario_penalises_cuts() {
        let data = with_budgets();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let report = MarketingReport::build(&calc, &data);

        let up = report.scenario(10.0, DEFAULT_ASSUMED_ROI);
        assert!((up.marketing_delta - 270.0).abs() < 1e-9);
        assert!((up.revenue_impact - 810.0).abs() < 1e-9);
        assert!((up.new_revenue - 12_510.0).abs() < 1e-9);

        let down = report.scenario(-10.0, DEFAULT_ASSUMED_ROI);
        assert!((down.revenue_impact + 972.0).abs() < 1e-9);
        assert!(down.pct_change_pp < 0.0);

        let none = report.scenario(0.0, 5.0);
        assert_eq!(none.revenue_impact, 0.0);
        assert!((none.new_pct - report.marketing_pct).abs() < 1e-12);
    }

    #[test]
    fn test_rows_cover_every_month() {
        let data = with_budgets();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let report = MarketingReport::build(&calc, &data);

        let rows: Vec<MarketingRow<'_>> = report.rows().collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].territory, "UK");
        assert_eq!(rows[0].source.label(), "DTC");
        assert_eq!(rows[5].spend, 400.0);
    }
}
