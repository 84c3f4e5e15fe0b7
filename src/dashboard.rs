// 🏠 Dashboard summaries - headline figures, regions, top customers and the
// filtered B2B customer view

use crate::model::{BudgetData, Channel, Month};
use crate::pl::{B2bFilter, PlCalculator};
use crate::territory::{Region, TerritoryRegistry};
use serde::{Deserialize, Serialize};

/// Customer-name fragments that mark spreadsheet subtotal rows
const SUMMARY_TERMS: [&str; 9] = [
    "revenue",
    "grand total",
    "sub total",
    "cm1",
    "cm2",
    "total",
    "ebitda",
    "cogs",
    "fulfilment",
];

pub fn is_summary_row(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.is_empty() || SUMMARY_TERMS.iter().any(|t| lower.contains(t))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCustomer {
    pub name: String,
    pub country: String,
    pub country_group: String,
    pub total_revenue: f64,
}

/// Largest B2B customers by revenue over the budget months, before scenario
/// adjustments
pub fn top_customers(data: &BudgetData, limit: usize) -> Vec<TopCustomer> {
    let mut customers: Vec<TopCustomer> = data
        .customers
        .iter()
        .filter(|c| !is_summary_row(&c.name))
        .map(|c| TopCustomer {
            name: c.name.clone(),
            country: c.country.clone(),
            country_group: c.country_group.clone(),
            total_revenue: c.values.total_over(&data.months),
        })
        .filter(|c| c.total_revenue > 0.0)
        .collect();

    customers.sort_by(|a, b| {
        b.total_revenue
            .total_cmp(&a.total_revenue)
            .then_with(|| a.name.cmp(&b.name))
    });
    customers.truncate(limit);
    customers
}

// ============================================================================
// B2B MANAGEMENT VIEW
// ============================================================================

/// Filters for the B2B customer list. Empty `regions` means every region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct B2bQuery {
    pub regions: Vec<Region>,
    /// Case-insensitive fragment of the customer name
    pub search: Option<String>,
    pub min_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct B2bCustomerRow {
    pub name: String,
    pub country: String,
    pub country_group: String,
    pub region: Option<Region>,
    pub margin: f64,
    pub last_year_revenue: f64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct B2bView {
    pub customers: Vec<B2bCustomerRow>,
    pub count: usize,
    pub total_revenue: f64,
    pub average_revenue: f64,
    pub top_customer: Option<TopCustomer>,
}

/// Customers matching `query`, largest first, with summary figures. Sheet
/// subtotal rows never appear.
pub fn b2b_view(data: &BudgetData, query: &B2bQuery) -> B2bView {
    let registry = TerritoryRegistry::new();
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut customers: Vec<B2bCustomerRow> = data
        .customers
        .iter()
        .filter(|c| !is_summary_row(&c.name))
        .filter(|c| match &search {
            Some(fragment) => c.name.to_lowercase().contains(fragment.as_str()),
            None => true,
        })
        .map(|c| B2bCustomerRow {
            name: c.name.clone(),
            country: c.country.clone(),
            country_group: c.country_group.clone(),
            region: registry.region_of(&c.country_group, &c.country),
            margin: c.margin,
            last_year_revenue: c.last_year_revenue,
            total_revenue: c.values.total_over(&data.months),
        })
        .filter(|c| {
            query.regions.is_empty() || c.region.map(|r| query.regions.contains(&r)).unwrap_or(false)
        })
        .filter(|c| c.total_revenue >= query.min_revenue)
        .collect();

    customers.sort_by(|a, b| {
        b.total_revenue
            .total_cmp(&a.total_revenue)
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_revenue: f64 = customers.iter().map(|c| c.total_revenue).sum();
    let top_customer = customers.first().map(|c| TopCustomer {
        name: c.name.clone(),
        country: c.country.clone(),
        country_group: c.country_group.clone(),
        total_revenue: c.total_revenue,
    });

    B2bView {
        count: customers.len(),
        average_revenue: if customers.is_empty() {
            0.0
        } else {
            total_revenue / customers.len() as f64
        },
        total_revenue,
        top_customer,
        customers,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRevenue {
    pub region: Region,
    pub revenue: f64,
}

pub fn b2b_by_region(calc: &PlCalculator<'_>) -> Vec<RegionRevenue> {
    Region::ALL
        .iter()
        .map(|region| RegionRevenue {
            region: *region,
            revenue: calc.b2b_revenue(B2bFilter::Region(*region)).total_over(calc.months()),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRevenue {
    pub channel: Channel,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_revenue: f64,
    pub channels: Vec<ChannelRevenue>,
    pub active_dtc_territories: usize,
    /// Negative, as carried in the P&L
    pub total_overheads: f64,
    pub regions: Vec<RegionRevenue>,
    pub monthly_b2b: Vec<(Month, f64)>,
}

impl DashboardSummary {
    pub fn build(calc: &PlCalculator<'_>, data: &BudgetData) -> Self {
        let months = calc.months();
        let b2b = calc.b2b_revenue(B2bFilter::All);

        let channels = vec![
            ChannelRevenue {
                channel: Channel::Dtc,
                revenue: calc.total_dtc_revenue().total_over(months),
            },
            ChannelRevenue {
                channel: Channel::B2b,
                revenue: b2b.total_over(months),
            },
            ChannelRevenue {
                channel: Channel::Marketplace,
                revenue: calc.total_marketplace_revenue().total_over(months),
            },
        ];

        DashboardSummary {
            total_revenue: channels.iter().map(|c| c.revenue).sum(),
            channels,
            active_dtc_territories: data.dtc.len(),
            total_overheads: calc.overheads(None, None).total_over(months),
            regions: b2b_by_region(calc),
            monthly_b2b: months.iter().map(|m| (*m, b2b.get(*m))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomerRevenue, Series};
    use crate::pl::tests::sample_data;
    use crate::scenario::Scenario;

    fn customer(name: &str, monthly: f64, data: &BudgetData) -> CustomerRevenue {
        CustomerRevenue {
            name: name.to_string(),
            country: "United Kingdom".to_string(),
            country_group: "UK".to_string(),
            margin: 0.0,
            last_year_revenue: 0.0,
            values: Series::from_pairs(data.months.iter().map(|m| (*m, monthly))),
        }
    }

    #[test]
    fn test_summary_rows_detected() {
        assert!(is_summary_row("Grand Total"));
        assert!(is_summary_row("B2B Revenue"));
        assert!(is_summary_row("  "));
        assert!(is_summary_row("EBITDA"));
        assert!(!is_summary_row("Acme Retail"));
    }

    #[test]
    fn test_top_customers_excludes_totals_and_zero_rows() {
        let mut data = sample_data();
        let extra = vec![
            customer("Grand Total", 99999.0, &data),
            customer("Dormant", 0.0, &data),
            customer("Zenith", 700.0, &data),
        ];
        data.customers.extend(extra);

        let top = top_customers(&data, 10);
        let names: Vec<&str> = top.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Zenith", "Bolt"]);
        assert_eq!(top[0].total_revenue, 3000.0);

        assert_eq!(top_customers(&data, 1).len(), 1);
    }

    #[test]
    fn test_b2b_view_filters() {
        let mut data = sample_data();
        let extra = vec![
            customer("Acme Wholesale", 50.0, &data),
            customer("Sub Total", 99999.0, &data),
        ];
        data.customers.extend(extra);

        let all = b2b_view(&data, &B2bQuery::default());
        assert_eq!(all.count, 3);
        assert_eq!(all.total_revenue, 3000.0 + 1500.0 + 150.0);
        assert_eq!(all.average_revenue, 1550.0);
        assert_eq!(all.top_customer.as_ref().unwrap().name, "Acme");

        let search = b2b_view(
            &data,
            &B2bQuery {
                search: Some("  aCmE ".to_string()),
                ..B2bQuery::default()
            },
        );
        let names: Vec<&str> = search.customers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Acme Wholesale"]);

        let ce = b2b_view(
            &data,
            &B2bQuery {
                regions: vec![Region::CentralEurope],
                ..B2bQuery::default()
            },
        );
        assert_eq!(ce.count, 1);
        assert_eq!(ce.customers[0].name, "Bolt");
        assert_eq!(ce.customers[0].region, Some(Region::CentralEurope));

        let big = b2b_view(
            &data,
            &B2bQuery {
                min_revenue: 1500.0,
                ..B2bQuery::default()
            },
        );
        assert_eq!(big.count, 2);
    }

    #[test]
    fn test_b2b_view_with_no_matches() {
        let data = sample_data();
        let view = b2b_view(
            &data,
            &B2bQuery {
                regions: vec![Region::RestOfWorld],
                ..B2bQuery::default()
            },
        );
        assert_eq!(view.count, 0);
        assert_eq!(view.average_revenue, 0.0);
        assert!(view.top_customer.is_none());
    }

    #[test]
    fn test_dashboard_summary() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let summary = DashboardSummary::build(&calc, &data);

        assert_eq!(summary.total_revenue, 6000.0 + 4500.0 + 1200.0);
        assert_eq!(summary.active_dtc_territories, 1);
        assert_eq!(summary.total_overheads, -1200.0);
        assert_eq!(summary.monthly_b2b.len(), 3);

        let uk = summary.regions.iter().find(|r| r.region == Region::Uk).unwrap();
        assert_eq!(uk.revenue, 3000.0);
    }
}
