// 🛒 DTC driver projections
//
// DTC revenue is traffic × conversion rate × average order value. A quick
// adjustment moves any of the three by a percentage and projects revenue
// from the territory's budgeted figures.

use crate::model::{BudgetData, DtcMetric, Month};
use crate::pl::PlCalculator;
use serde::{Deserialize, Serialize};

/// Percentage changes to the three DTC drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverAdjustment {
    pub traffic_pct: f64,
    pub conversion_pct: f64,
    pub aov_pct: f64,
}

impl DriverAdjustment {
    fn factor(pct: f64) -> f64 {
        (1.0 + pct / 100.0).max(0.0)
    }

    pub fn traffic_factor(&self) -> f64 {
        Self::factor(self.traffic_pct)
    }

    pub fn conversion_factor(&self) -> f64 {
        Self::factor(self.conversion_pct)
    }

    pub fn aov_factor(&self) -> f64 {
        Self::factor(self.aov_pct)
    }

    /// Combined revenue multiplier
    pub fn revenue_factor(&self) -> f64 {
        self.traffic_factor() * self.conversion_factor() * self.aov_factor()
    }

    pub fn is_zero(&self) -> bool {
        self.traffic_pct == 0.0 && self.conversion_pct == 0.0 && self.aov_pct == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverValues {
    pub traffic: f64,
    pub conversion_rate: f64,
    pub orders: f64,
    /// Revenue per order; zero when the month has no orders
    pub aov: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedMonth {
    pub month: Month,
    pub base: DriverValues,
    pub projected: DriverValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcProjection {
    pub territory: String,
    pub adjustment: DriverAdjustment,
    pub months: Vec<ProjectedMonth>,
    pub base_revenue: f64,
    pub projected_revenue: f64,
    pub change: f64,
    pub change_pct: f64,
}

/// Project a territory's DTC revenue under `adjustment`. The base is the
/// calculator's DTC revenue, so scenario growth is already applied. `None`
/// when the territory has no DTC inputs.
pub fn project_dtc(
    calc: &PlCalculator<'_>,
    data: &BudgetData,
    territory: &str,
    adjustment: DriverAdjustment,
) -> Option<DtcProjection> {
    let code = calc.registry().canonical_code(territory).unwrap_or(territory);
    let inputs = data.dtc.get(code)?;
    let revenue = calc.dtc_revenue(code);
    let metric = |m: DtcMetric, month: Month| inputs.metric(m).map(|s| s.get(month)).unwrap_or(0.0);

    let months: Vec<ProjectedMonth> = calc
        .months()
        .iter()
        .map(|month| {
            let orders = metric(DtcMetric::TotalOrders, *month);
            let base_revenue = revenue.get(*month);
            let base = DriverValues {
                traffic: metric(DtcMetric::Traffic, *month),
                conversion_rate: metric(DtcMetric::ConversionRate, *month),
                orders,
                aov: if orders > 0.0 { base_revenue / orders } else { 0.0 },
                revenue: base_revenue,
            };
            let projected = DriverValues {
                traffic: base.traffic * adjustment.traffic_factor(),
                conversion_rate: base.conversion_rate * adjustment.conversion_factor(),
                orders: base.orders * adjustment.traffic_factor() * adjustment.conversion_factor(),
                aov: base.aov * adjustment.aov_factor(),
                revenue: base.revenue * adjustment.revenue_factor(),
            };
            ProjectedMonth {
                month: *month,
                base,
                projected,
            }
        })
        .collect();

    let base_revenue: f64 = months.iter().map(|m| m.base.revenue).sum();
    let projected_revenue: f64 = months.iter().map(|m| m.projected.revenue).sum();
    let change = projected_revenue - base_revenue;

    Some(DtcProjection {
        territory: code.to_string(),
        adjustment,
        months,
        base_revenue,
        projected_revenue,
        change,
        change_pct: if base_revenue != 0.0 {
            change / base_revenue * 100.0
        } else {
            0.0
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Series;
    use crate::pl::tests::sample_data;
    use crate::scenario::{Adjustment, Scenario};

    fn with_drivers() -> BudgetData {
        let mut data = sample_data();
        let months = data.months.clone();
        let flat = |v: f64| Series::from_pairs(months.iter().map(|m| (*m, v)));
        if let Some(uk) = data.dtc.get_mut("UK") {
            uk.metrics.insert(DtcMetric::Traffic, flat(10_000.0));
            uk.metrics.insert(DtcMetric::ConversionRate, flat(0.02));
            uk.metrics.insert(DtcMetric::TotalOrders, flat(200.0));
        }
        data
    }

    #[test]
    fn test_projection_compounds_the_drivers() {
        let data = with_drivers();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let adjustment = DriverAdjustment {
            traffic_pct: 10.0,
            conversion_pct: 10.0,
            aov_pct: -10.0,
        };

        let projection = project_dtc(&calc, &data, "United Kingdom", adjustment).unwrap();
        assert_eq!(projection.territory, "UK");
        assert_eq!(projection.base_revenue, 6000.0);
        assert!((projection.projected_revenue - 6000.0 * 1.1 * 1.1 * 0.9).abs() < 1e-9);

        let april = &projection.months[0];
        assert_eq!(april.base.aov, 10.0);
        assert!((april.projected.aov - 9.0).abs() < 1e-12);
        assert!((april.projected.orders - 242.0).abs() < 1e-9);
        assert!((april.projected.traffic - 11_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_adjustment_is_identity() {
        let data = with_drivers();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        let projection = project_dtc(&calc, &data, "UK", DriverAdjustment::default()).unwrap();
        assert!(DriverAdjustment::default().is_zero());
        assert_eq!(projection.change, 0.0);
        assert_eq!(projection.change_pct, 0.0);
        assert!(projection.months.iter().all(|m| m.base == m.projected));
    }

    #[test]
    fn test_base_follows_scenario_growth() {
        let data = with_drivers();
        let scenario = Scenario::baseline().with(Adjustment::DtcGrowth, 50.0);
        let calc = PlCalculator::new(&data, &scenario);

        let projection = project_dtc(
            &calc,
            &data,
            "UK",
            DriverAdjustment {
                traffic_pct: 100.0,
                ..DriverAdjustment::default()
            },
        )
        .unwrap();
        assert_eq!(projection.base_revenue, 9000.0);
        assert_eq!(projection.projected_revenue, 18_000.0);
        assert_eq!(projection.change_pct, 100.0);
    }

    #[test]
    fn test_missing_orders_and_territories() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        // No order counts: AOV reads as zero but revenue still projects
        let projection = project_dtc(
            &calc,
            &data,
            "UK",
            DriverAdjustment {
                aov_pct: 20.0,
                ..DriverAdjustment::default()
            },
        )
        .unwrap();
        assert_eq!(projection.months[0].base.aov, 0.0);
        assert!((projection.projected_revenue - 7200.0).abs() < 1e-9);

        assert!(project_dtc(&calc, &data, "ES", DriverAdjustment::default()).is_none());
        assert!(project_dtc(&calc, &data, "Atlantis", DriverAdjustment::default()).is_none());
    }

    #[test]
    fn test_cuts_past_everything_floor_at_zero() {
        let adjustment = DriverAdjustment {
            traffic_pct: -150.0,
            ..DriverAdjustment::default()
        };
        assert_eq!(adjustment.traffic_factor(), 0.0);
        assert_eq!(adjustment.revenue_factor(), 0.0);
    }
}
