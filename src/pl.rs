// 📈 P&L calculation engine
//
// Revenue (DTC / B2B / Marketplace)
//   - CoGS           = CM1
//   - Fulfilment     = CM2
//   - Overheads      = EBITDA
//
// Costs are carried as negative numbers, so every margin line is a plain sum
// of the lines above it. Unknown territories produce all-zero statements.

use crate::model::{BudgetData, Channel, Month, Series};
use crate::scenario::Scenario;
use crate::territory::{Region, TerritoryRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ============================================================================
// STATEMENT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlCategory {
    Revenue,
    CoGS,
    CM1,
    Fulfilment,
    CM2,
    Overheads,
    EBITDA,
}

impl PlCategory {
    pub const ALL: [PlCategory; 7] = [
        PlCategory::Revenue,
        PlCategory::CoGS,
        PlCategory::CM1,
        PlCategory::Fulfilment,
        PlCategory::CM2,
        PlCategory::Overheads,
        PlCategory::EBITDA,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PlCategory::Revenue => "Revenue",
            PlCategory::CoGS => "CoGS",
            PlCategory::CM1 => "CM1",
            PlCategory::Fulfilment => "Fulfilment",
            PlCategory::CM2 => "CM2",
            PlCategory::Overheads => "Overheads",
            PlCategory::EBITDA => "EBITDA",
        }
    }

    pub fn parse(raw: &str) -> Option<PlCategory> {
        PlCategory::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for PlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Line names, shared by the calculator, exports and views
pub mod lines {
    use crate::model::Channel;

    pub const TOTAL_REVENUE: &str = "Total Revenue";
    pub const TOTAL_COGS: &str = "Total CoGS";
    pub const TOTAL_CM1: &str = "Total CM1";
    pub const TOTAL_FULFILMENT: &str = "Total Fulfilment";
    pub const TOTAL_CM2: &str = "Total CM2";
    pub const OVERHEADS: &str = "Overheads";
    pub const EBITDA: &str = "EBITDA";

    pub fn revenue(channel: Channel) -> String {
        format!("{} Revenue", channel.label())
    }

    pub fn cogs(channel: Channel) -> String {
        format!("{} CoGS", channel.label())
    }

    pub fn cm1(channel: Channel) -> String {
        format!("{} CM1", channel.label())
    }

    pub fn fulfilment(channel: Channel) -> String {
        format!("{} Fulfilment", channel.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlLine {
    pub category: PlCategory,
    pub line: String,
    pub values: Series,
}

impl PlLine {
    pub fn new(category: PlCategory, line: &str, values: Series) -> Self {
        PlLine {
            category,
            line: line.to_string(),
            values,
        }
    }

    pub fn total(&self) -> f64 {
        self.values.total()
    }
}

/// A P&L indexed by (category, line) over an ordered month list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlStatement {
    pub months: Vec<Month>,
    pub lines: Vec<PlLine>,
}

impl PlStatement {
    pub fn new(months: Vec<Month>) -> Self {
        PlStatement {
            months,
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, category: PlCategory, line: &str, values: Series) {
        self.lines.push(PlLine::new(category, line, values));
    }

    pub fn get(&self, category: PlCategory, line: &str) -> Option<&PlLine> {
        self.lines
            .iter()
            .find(|l| l.category == category && l.line == line)
    }

    fn get_mut(&mut self, category: PlCategory, line: &str) -> Option<&mut PlLine> {
        self.lines
            .iter_mut()
            .find(|l| l.category == category && l.line == line)
    }

    /// Value for one month; absent lines read as zero
    pub fn value(&self, category: PlCategory, line: &str, month: Month) -> f64 {
        self.get(category, line)
            .map(|l| l.values.get(month))
            .unwrap_or(0.0)
    }

    /// Sum of a line over the statement's months
    pub fn annual_total(&self, category: PlCategory, line: &str) -> f64 {
        self.get(category, line)
            .map(|l| l.values.total_over(&self.months))
            .unwrap_or(0.0)
    }

    pub fn lines_in(&self, category: PlCategory) -> impl Iterator<Item = &PlLine> {
        self.lines.iter().filter(move |l| l.category == category)
    }

    /// Line-wise combination with another statement of the same shape.
    /// Lines present only in `other` are appended.
    fn combine(&self, other: &PlStatement, op: impl Fn(f64, f64) -> f64) -> PlStatement {
        let mut out = PlStatement::new(self.months.clone());
        for line in &self.lines {
            let theirs = other.get(line.category, &line.line);
            let values = Series::from_pairs(self.months.iter().map(|m| {
                let b = theirs.map(|l| l.values.get(*m)).unwrap_or(0.0);
                (*m, op(line.values.get(*m), b))
            }));
            out.push(line.category, &line.line, values);
        }
        for line in &other.lines {
            if self.get(line.category, &line.line).is_none() {
                let values = line.values.map_over(&self.months, |v| op(0.0, v));
                out.push(line.category, &line.line, values);
            }
        }
        out
    }

    pub fn plus(&self, other: &PlStatement) -> PlStatement {
        self.combine(other, |a, b| a + b)
    }

    /// `self - other`, line by line
    pub fn minus(&self, other: &PlStatement) -> PlStatement {
        self.combine(other, |a, b| a - b)
    }

    pub fn is_all_zero(&self) -> bool {
        self.lines
            .iter()
            .all(|l| self.months.iter().all(|m| l.values.get(*m) == 0.0))
    }

    /// Aggregate monthly values into reporting periods
    pub fn rollup(&self, period: Period, fiscal_start_month: u32) -> PeriodTable {
        let mut labels: Vec<String> = Vec::new();
        let mut buckets: Vec<usize> = Vec::with_capacity(self.months.len());

        for month in &self.months {
            let label = period.label(*month, fiscal_start_month);
            let index = match labels.iter().position(|l| *l == label) {
                Some(i) => i,
                None => {
                    labels.push(label);
                    labels.len() - 1
                }
            };
            buckets.push(index);
        }

        let rows = self
            .lines
            .iter()
            .map(|line| {
                let mut values = vec![0.0; labels.len()];
                for (month, bucket) in self.months.iter().zip(&buckets) {
                    values[*bucket] += line.values.get(*month);
                }
                PeriodRow {
                    category: line.category,
                    line: line.line.clone(),
                    values,
                }
            })
            .collect();

        PeriodTable {
            periods: labels,
            rows,
        }
    }
}

// ============================================================================
// PERIODS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Monthly,
    Quarterly,
    Annual,
}

impl Period {
    pub fn parse(raw: &str) -> Option<Period> {
        match raw.trim().to_lowercase().as_str() {
            "monthly" | "month" | "m" => Some(Period::Monthly),
            "quarterly" | "quarter" | "q" => Some(Period::Quarterly),
            "annual" | "annually" | "year" | "y" => Some(Period::Annual),
            _ => None,
        }
    }

    /// Column label for the period containing `month`
    pub fn label(&self, month: Month, fiscal_start_month: u32) -> String {
        let fy = month.fiscal_year(fiscal_start_month) % 100;
        match self {
            Period::Monthly => month.to_string(),
            Period::Quarterly => format!("FY{:02} Q{}", fy, month.fiscal_quarter(fiscal_start_month)),
            Period::Annual => format!("FY{:02}", fy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub category: PlCategory,
    pub line: String,
    pub values: Vec<f64>,
}

/// A statement rolled up into reporting periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodTable {
    pub periods: Vec<String>,
    pub rows: Vec<PeriodRow>,
}

// ============================================================================
// SELECTION
// ============================================================================

/// Which P&L to compute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Combined,
    Territory(String),
}

impl Selection {
    /// "combined"/"all" select the combined view; anything else is a
    /// territory, resolved to its code when known
    pub fn parse(raw: &str, registry: &TerritoryRegistry) -> Selection {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("combined") || trimmed.eq_ignore_ascii_case("all") {
            return Selection::Combined;
        }
        let code = registry
            .canonical_code(trimmed)
            .map(|c| c.to_string())
            .unwrap_or_else(|| trimmed.to_string());
        Selection::Territory(code)
    }

    pub fn label(&self) -> &str {
        match self {
            Selection::Combined => "Combined",
            Selection::Territory(t) => t,
        }
    }
}

/// Filter for B2B revenue aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum B2bFilter<'a> {
    All,
    Territory(&'a str),
    Region(Region),
}

// ============================================================================
// CALCULATOR
// ============================================================================

pub struct PlCalculator<'a> {
    data: &'a BudgetData,
    scenario: &'a Scenario,
    registry: TerritoryRegistry,
    default_fulfilment_rate: f64,
}

impl<'a> PlCalculator<'a> {
    pub fn new(data: &'a BudgetData, scenario: &'a Scenario) -> Self {
        PlCalculator {
            data,
            scenario,
            registry: TerritoryRegistry::new(),
            default_fulfilment_rate: -0.15,
        }
    }

    pub fn with_default_fulfilment_rate(mut self, rate: f64) -> Self {
        self.default_fulfilment_rate = rate;
        self
    }

    pub fn months(&self) -> &[Month] {
        &self.data.months
    }

    pub fn registry(&self) -> &TerritoryRegistry {
        &self.registry
    }

    fn zeros(&self) -> Series {
        Series::zeros(&self.data.months)
    }

    /// Resolve to a canonical code, keeping unknown names as-is
    fn code_of<'s>(&self, territory: &'s str) -> &'s str {
        match self.registry.canonical_code(territory) {
            Some(code) => code,
            None => territory,
        }
    }

    // ========================================================================
    // REVENUE
    // ========================================================================

    pub fn b2b_revenue(&self, filter: B2bFilter<'_>) -> Series {
        let mut total = self.zeros();

        for customer in &self.data.customers {
            let included = match filter {
                B2bFilter::All => true,
                B2bFilter::Territory(t) => {
                    match (self.registry.resolve(&customer.country), self.registry.resolve(t)) {
                        (Some(a), Some(b)) => a.code == b.code,
                        _ => false,
                    }
                }
                B2bFilter::Region(region) => {
                    self.registry.region_of(&customer.country_group, &customer.country) == Some(region)
                }
            };
            if !included {
                continue;
            }
            for month in &self.data.months {
                total.add_to(*month, customer.values.get(*month));
            }
        }

        let factor = self.scenario.b2b_factor();
        total.map_over(&self.data.months, |v| v * factor)
    }

    pub fn dtc_revenue(&self, territory: &str) -> Series {
        let code = self.code_of(territory);
        let Some(revenue) = self.data.dtc.get(code).and_then(|d| d.revenue()) else {
            return self.zeros();
        };
        let factor = self.scenario.dtc_factor(code);
        revenue.map_over(&self.data.months, |v| v * factor)
    }

    pub fn marketplace_revenue(&self, territory: &str) -> Series {
        if territory.trim().is_empty() {
            return self.zeros();
        }
        let row = match self.registry.resolve(territory) {
            Some(t) => self
                .data
                .marketplace
                .iter()
                .find(|r| self.registry.resolve(&r.territory).map(|rt| rt.code) == Some(t.code)),
            None => self
                .data
                .marketplace
                .iter()
                .find(|r| r.territory.trim().eq_ignore_ascii_case(territory.trim())),
        };

        match row {
            Some(row) => {
                let factor = self.scenario.marketplace_factor();
                row.values.map_over(&self.data.months, |v| v * factor)
            }
            None => self.zeros(),
        }
    }

    /// Marketplace revenue across all modelled territories
    pub fn total_marketplace_revenue(&self) -> Series {
        self.registry
            .all()
            .iter()
            .fold(self.zeros(), |acc, t| {
                acc.plus(&self.marketplace_revenue(t.code), &self.data.months)
            })
    }

    /// DTC revenue across all territories with DTC inputs
    pub fn total_dtc_revenue(&self) -> Series {
        self.data
            .dtc
            .keys()
            .fold(self.zeros(), |acc, t| acc.plus(&self.dtc_revenue(t), &self.data.months))
    }

    pub fn revenue(&self, territory: &str, channel: Channel) -> Series {
        match channel {
            Channel::Dtc => self.dtc_revenue(territory),
            Channel::B2b => self.b2b_revenue(B2bFilter::Territory(territory)),
            Channel::Marketplace => self.marketplace_revenue(territory),
        }
    }

    // ========================================================================
    // COSTS
    // ========================================================================

    /// CoGS as `-|revenue × rate|`
    pub fn cogs(&self, revenue: &Series, channel: Channel) -> Series {
        let rate = self
            .scenario
            .cogs_rate(channel, self.data.cogs_rates.get(channel));
        revenue.map_over(&self.data.months, |v| -(v * rate).abs())
    }

    fn base_fulfilment_rate(&self, territory: &str, channel: Channel) -> f64 {
        let code = self.code_of(territory);
        self.data
            .fulfilment
            .iter()
            .find(|f| f.channel == channel && self.code_of(&f.country) == code)
            .map(|f| f.rate)
            .unwrap_or(self.default_fulfilment_rate)
    }

    /// Fulfilment as `-(revenue × rate)` with a non-negative rate, so a
    /// revenue reversal reverses its fulfilment cost too
    pub fn fulfilment(&self, revenue: &Series, territory: &str, channel: Channel) -> Series {
        let code = self.code_of(territory);
        let rate = self.scenario.fulfilment_rate(
            code,
            channel,
            self.base_fulfilment_rate(territory, channel),
        );
        revenue.map_over(&self.data.months, |v| -(v * rate))
    }

    /// Overhead rows keep their sign: costs are negative, credits positive
    fn sum_overheads(&self, include: impl Fn(&str, &str) -> bool) -> Series {
        let mut total = self.zeros();
        for row in &self.data.overheads {
            if !include(&row.territory, &row.function) {
                continue;
            }
            let factor = self.scenario.overhead_factor(&row.function);
            for month in &self.data.months {
                total.add_to(*month, row.values.get(*month) * factor);
            }
        }
        total
    }

    /// Overheads for a territory and/or function. A blank territory names
    /// nothing, so it never picks up unassigned rows.
    pub fn overheads(&self, territory: Option<&str>, function: Option<&str>) -> Series {
        let code = territory.map(|t| self.code_of(t.trim()));
        if code == Some("") {
            return self.zeros();
        }
        self.sum_overheads(|row_territory, row_function| {
            let territory_ok = match code {
                Some(code) => self.code_of(row_territory) == code,
                None => true,
            };
            let function_ok = match function {
                Some(f) => row_function.trim().eq_ignore_ascii_case(f.trim()),
                None => true,
            };
            territory_ok && function_ok
        })
    }

    /// Overheads held at group level (Group, Shared, Central, ... or blank)
    pub fn group_overheads(&self) -> Series {
        self.sum_overheads(|row_territory, _| {
            self.registry.resolve(row_territory).is_none() && self.registry.is_group_label(row_territory)
        })
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    pub fn territory_pl(&self, territory: &str) -> PlStatement {
        let months = &self.data.months;
        let code = self.code_of(territory);
        debug!(territory = code, "calculating territory P&L");

        let revenue: Vec<(Channel, Series)> = Channel::ALL
            .iter()
            .map(|c| (*c, self.revenue(code, *c)))
            .collect();
        let cogs: Vec<(Channel, Series)> = revenue
            .iter()
            .map(|(c, r)| (*c, self.cogs(r, *c)))
            .collect();
        let cm1: Vec<(Channel, Series)> = revenue
            .iter()
            .zip(&cogs)
            .map(|((c, r), (_, k))| (*c, r.plus(k, months)))
            .collect();
        let fulfilment: Vec<(Channel, Series)> = revenue
            .iter()
            .map(|(c, r)| (*c, self.fulfilment(r, code, *c)))
            .collect();

        let sum = |parts: &[(Channel, Series)]| {
            parts
                .iter()
                .fold(Series::zeros(months), |acc, (_, s)| acc.plus(s, months))
        };

        let mut pl = PlStatement::new(months.clone());

        for (c, s) in &revenue {
            pl.push(PlCategory::Revenue, &lines::revenue(*c), s.clone());
        }
        pl.push(PlCategory::Revenue, lines::TOTAL_REVENUE, sum(&revenue));

        for (c, s) in &cogs {
            pl.push(PlCategory::CoGS, &lines::cogs(*c), s.clone());
        }
        pl.push(PlCategory::CoGS, lines::TOTAL_COGS, sum(&cogs));

        for (c, s) in &cm1 {
            pl.push(PlCategory::CM1, &lines::cm1(*c), s.clone());
        }
        let total_cm1 = sum(&cm1);
        pl.push(PlCategory::CM1, lines::TOTAL_CM1, total_cm1.clone());

        for (c, s) in &fulfilment {
            pl.push(PlCategory::Fulfilment, &lines::fulfilment(*c), s.clone());
        }
        let total_fulfilment = sum(&fulfilment);
        pl.push(PlCategory::Fulfilment, lines::TOTAL_FULFILMENT, total_fulfilment.clone());

        let cm2 = total_cm1.plus(&total_fulfilment, months);
        pl.push(PlCategory::CM2, lines::TOTAL_CM2, cm2.clone());

        let overheads = self.overheads(Some(code), None);
        pl.push(PlCategory::Overheads, lines::OVERHEADS, overheads.clone());

        pl.push(PlCategory::EBITDA, lines::EBITDA, cm2.plus(&overheads, months));

        pl
    }

    /// Sum of every territory plus group-level overheads
    pub fn combined_pl(&self) -> PlStatement {
        let months = &self.data.months;
        let mut combined = self
            .registry
            .all()
            .iter()
            .map(|t| self.territory_pl(t.code))
            .fold(PlStatement::new(months.clone()), |acc, pl| acc.plus(&pl));

        let group = self.group_overheads();
        if !group.is_all_zero() {
            let cm2 = combined
                .get(PlCategory::CM2, lines::TOTAL_CM2)
                .map(|l| l.values.clone())
                .unwrap_or_default();

            if let Some(overheads) = combined.get_mut(PlCategory::Overheads, lines::OVERHEADS) {
                overheads.values = overheads.values.plus(&group, months);
            }
            let overheads = combined
                .get(PlCategory::Overheads, lines::OVERHEADS)
                .map(|l| l.values.clone())
                .unwrap_or_default();
            if let Some(ebitda) = combined.get_mut(PlCategory::EBITDA, lines::EBITDA) {
                ebitda.values = cm2.plus(&overheads, months);
            }
        }

        combined
    }

    pub fn pl(&self, selection: &Selection) -> PlStatement {
        match selection {
            Selection::Combined => self.combined_pl(),
            Selection::Territory(t) => self.territory_pl(t),
        }
    }
}

// ============================================================================
// SCENARIO COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub base: PlStatement,
    pub new: PlStatement,
    /// `new - base`
    pub difference: PlStatement,
}

pub fn compare_scenarios(
    data: &BudgetData,
    base: &Scenario,
    new: &Scenario,
    selection: &Selection,
    default_fulfilment_rate: f64,
) -> ScenarioComparison {
    let base_pl = PlCalculator::new(data, base)
        .with_default_fulfilment_rate(default_fulfilment_rate)
        .pl(selection);
    let new_pl = PlCalculator::new(data, new)
        .with_default_fulfilment_rate(default_fulfilment_rate)
        .pl(selection);
    let difference = new_pl.minus(&base_pl);

    ScenarioComparison {
        base: base_pl,
        new: new_pl,
        difference,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{
        month_range, CustomerRevenue, DtcInputs, DtcMetric, FulfilmentRate, MarketplaceRow,
        OverheadRow,
    };
    use crate::scenario::Adjustment;

    /// Three months, one UK B2B customer, one ES customer, UK DTC inputs,
    /// UK marketplace sales, UK and group overheads.
    pub(crate) fn sample_data() -> BudgetData {
        let months = month_range(Month::new(2026, 4).unwrap(), 3);
        let flat = |v: f64| Series::from_pairs(months.iter().map(|m| (*m, v)));

        let mut data = BudgetData::new(months.clone());
        data.customers = vec![
            CustomerRevenue {
                name: "Acme".to_string(),
                country: "United Kingdom".to_string(),
                country_group: "UK".to_string(),
                margin: 0.3,
                last_year_revenue: 9000.0,
                values: flat(1000.0),
            },
            CustomerRevenue {
                name: "Bolt".to_string(),
                country: "Spain".to_string(),
                country_group: "CE".to_string(),
                margin: 0.2,
                last_year_revenue: 1000.0,
                values: flat(500.0),
            },
        ];

        let mut uk = DtcInputs::new("UK");
        uk.metrics.insert(DtcMetric::TotalRevenue, flat(2000.0));
        data.dtc.insert("UK".to_string(), uk);

        data.marketplace = vec![MarketplaceRow {
            territory: "UK".to_string(),
            values: flat(400.0),
        }];
        data.fulfilment = vec![FulfilmentRate {
            country: "UK".to_string(),
            channel: Channel::Dtc,
            rate: -0.10,
        }];
        data.overheads = vec![
            OverheadRow {
                territory: "UK".to_string(),
                function: "Marketing".to_string(),
                category: "Paid Social".to_string(),
                group: String::new(),
                supplier: String::new(),
                values: flat(-300.0),
            },
            OverheadRow {
                territory: "Group".to_string(),
                function: "Finance".to_string(),
                category: "Audit".to_string(),
                group: String::new(),
                supplier: String::new(),
                values: flat(-100.0),
            },
        ];
        data
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_territory_pl_waterfall_identities() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let pl = calc.territory_pl("UK");
        let m = data.months[0];

        assert_eq!(pl.value(PlCategory::Revenue, "DTC Revenue", m), 2000.0);
        assert_eq!(pl.value(PlCategory::Revenue, "B2B Revenue", m), 1000.0);
        assert_eq!(pl.value(PlCategory::Revenue, "Marketplace Revenue", m), 400.0);
        assert_eq!(pl.value(PlCategory::Revenue, lines::TOTAL_REVENUE, m), 3400.0);

        // CoGS at 24% / 26% / 18%
        assert!(close(pl.value(PlCategory::CoGS, lines::TOTAL_COGS, m), -(480.0 + 260.0 + 72.0)));
        assert!(close(pl.value(PlCategory::CM1, lines::TOTAL_CM1, m), 3400.0 - 812.0));

        // DTC fulfilment from the sheet (10%), others default 15%
        assert!(close(pl.value(PlCategory::Fulfilment, "DTC Fulfilment", m), -200.0));
        assert!(close(pl.value(PlCategory::Fulfilment, "B2B Fulfilment", m), -150.0));
        assert!(close(pl.value(PlCategory::Fulfilment, lines::TOTAL_FULFILMENT, m), -410.0));

        assert!(close(pl.value(PlCategory::CM2, lines::TOTAL_CM2, m), 2588.0 - 410.0));
        assert_eq!(pl.value(PlCategory::Overheads, lines::OVERHEADS, m), -300.0);
        assert!(close(pl.value(PlCategory::EBITDA, lines::EBITDA, m), 2178.0 - 300.0));
        assert_eq!(pl.lines.len(), 19);
    }

    #[test]
    fn test_territory_lookup_by_name_matches_code() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        assert_eq!(calc.territory_pl("United Kingdom"), calc.territory_pl("UK"));
    }

    #[test]
    fn test_unknown_territory_is_all_zero() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        let pl = calc.territory_pl("Atlantis");
        assert!(pl.is_all_zero());
        assert_eq!(pl.lines.len(), 19);

        let fr = calc.territory_pl("FR");
        assert!(fr.is_all_zero());
    }

    #[test]
    fn test_combined_includes_group_overheads() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        let combined = calc.combined_pl();
        let uk = calc.territory_pl("UK");
        let es = calc.territory_pl("ES");
        let m = data.months[1];

        assert_eq!(
            combined.value(PlCategory::Revenue, lines::TOTAL_REVENUE, m),
            uk.value(PlCategory::Revenue, lines::TOTAL_REVENUE, m)
                + es.value(PlCategory::Revenue, lines::TOTAL_REVENUE, m)
        );
        assert_eq!(combined.value(PlCategory::Overheads, lines::OVERHEADS, m), -400.0);
        assert!(close(
            combined.value(PlCategory::EBITDA, lines::EBITDA, m),
            combined.value(PlCategory::CM2, lines::TOTAL_CM2, m) - 400.0
        ));
    }

    #[test]
    fn test_zero_scenario_reproduces_baseline_exactly() {
        let data = sample_data();
        let baseline = Scenario::baseline();
        let zero = Scenario::from_pairs(vec![
            ("dtc_growth", 0.0),
            ("dtc_revenue_UK", 0.0),
            ("b2b_growth", 0.0),
            ("mp_growth", 0.0),
            ("cogs_change", 0.0),
            ("fulfilment_change", 0.0),
            ("overhead_change", 0.0),
            ("marketing_change", 0.0),
        ])
        .unwrap();

        let base_pl = PlCalculator::new(&data, &baseline).combined_pl();
        let zero_pl = PlCalculator::new(&data, &zero).combined_pl();
        assert_eq!(base_pl, zero_pl);
    }

    #[test]
    fn test_scenario_adjustments_flow_through() {
        let data = sample_data();
        let scenario = Scenario::baseline()
            .with(Adjustment::B2bGrowth, 10.0)
            .with(Adjustment::CogsRate(Channel::Dtc), 0.5)
            .with(Adjustment::MarketingChange, 100.0);
        let calc = PlCalculator::new(&data, &scenario);
        let pl = calc.territory_pl("UK");
        let m = data.months[0];

        assert!(close(pl.value(PlCategory::Revenue, "B2B Revenue", m), 1100.0));
        assert!(close(pl.value(PlCategory::CoGS, "DTC CoGS", m), -1000.0));
        assert!(close(pl.value(PlCategory::Overheads, lines::OVERHEADS, m), -600.0));
    }

    #[test]
    fn test_scenario_comparison_difference() {
        let data = sample_data();
        let base = Scenario::baseline();
        let new = Scenario::baseline().with(Adjustment::MarketplaceGrowth, 50.0);

        let cmp = compare_scenarios(&data, &base, &new, &Selection::Combined, -0.15);
        let m = data.months[2];
        assert!(close(cmp.difference.value(PlCategory::Revenue, "Marketplace Revenue", m), 200.0));
        assert_eq!(cmp.difference.value(PlCategory::Revenue, "B2B Revenue", m), 0.0);
    }

    #[test]
    fn test_negative_revenue_reverses_fulfilment() {
        let mut data = sample_data();
        let refund = data.months[1];
        if let Some(uk) = data.dtc.get_mut("UK") {
            if let Some(revenue) = uk.metrics.get_mut(&DtcMetric::TotalRevenue) {
                revenue.set(refund, -500.0);
            }
        }
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let pl = calc.territory_pl("UK");

        // A refund month gives back its 10% fulfilment
        assert!(close(pl.value(PlCategory::Fulfilment, "DTC Fulfilment", refund), 50.0));
        // CoGS stays a cost regardless of sign
        assert!(close(pl.value(PlCategory::CoGS, "DTC CoGS", refund), -120.0));
        assert!(close(pl.value(PlCategory::Fulfilment, "DTC Fulfilment", data.months[0]), -200.0));
    }

    #[test]
    fn test_overhead_credit_rows_keep_their_sign() {
        let mut data = sample_data();
        let credit = OverheadRow {
            territory: "UK".to_string(),
            function: "Finance".to_string(),
            category: "Rebate".to_string(),
            group: String::new(),
            supplier: String::new(),
            values: Series::from_pairs(data.months.iter().map(|m| (*m, 120.0))),
        };
        data.overheads.push(credit);
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);
        let m = data.months[0];

        assert!(close(calc.overheads(Some("UK"), None).get(m), -180.0));
        assert!(close(calc.overheads(Some("UK"), Some("Finance")).get(m), 120.0));

        let pl = calc.territory_pl("UK");
        assert!(close(pl.value(PlCategory::EBITDA, lines::EBITDA, m), 2178.0 - 180.0));
    }

    #[test]
    fn test_overhead_cut_beyond_everything_is_zero_not_a_credit() {
        let data = sample_data();
        let scenario = Scenario::baseline().with(Adjustment::OverheadChange, -150.0);
        let calc = PlCalculator::new(&data, &scenario);

        assert_eq!(calc.overheads(Some("UK"), None).total(), 0.0);
        assert_eq!(calc.group_overheads().total(), 0.0);
    }

    #[test]
    fn test_blank_territory_matches_no_rows() {
        let mut data = sample_data();
        data.overheads.push(OverheadRow {
            territory: String::new(),
            function: "HR".to_string(),
            category: String::new(),
            group: String::new(),
            supplier: String::new(),
            values: Series::from_pairs(data.months.iter().map(|m| (*m, -50.0))),
        });
        data.marketplace.push(MarketplaceRow {
            territory: String::new(),
            values: Series::from_pairs(data.months.iter().map(|m| (*m, 75.0))),
        });
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        for blank in ["", "   "] {
            let pl = calc.territory_pl(blank);
            assert!(pl.is_all_zero(), "'{}' picked up unassigned rows", blank);
            assert_eq!(pl.annual_total(PlCategory::EBITDA, lines::EBITDA), 0.0);
        }

        // The blank row is still a group cost in the combined view
        let combined = calc.combined_pl();
        assert_eq!(combined.value(PlCategory::Overheads, lines::OVERHEADS, data.months[0]), -450.0);
    }

    #[test]
    fn test_combined_keeps_line_order_of_a_territory() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        let combined = calc.combined_pl();
        let uk = calc.territory_pl("UK");
        let names = |pl: &PlStatement| pl.lines.iter().map(|l| l.line.clone()).collect::<Vec<_>>();
        assert_eq!(names(&combined), names(&uk));
        assert_eq!(combined.months, data.months);
    }

    #[test]
    fn test_b2b_filters() {
        let data = sample_data();
        let scenario = Scenario::baseline();
        let calc = PlCalculator::new(&data, &scenario);

        assert_eq!(calc.b2b_revenue(B2bFilter::All).total(), 4500.0);
        assert_eq!(calc.b2b_revenue(B2bFilter::Territory("UK")).total(), 3000.0);
        assert_eq!(calc.b2b_revenue(B2bFilter::Region(Region::CentralEurope)).total(), 1500.0);
        assert_eq!(calc.b2b_revenue(B2bFilter::Region(Region::EasternEurope)).total(), 0.0);
    }

    #[test]
    fn test_rollup_quarterly_and_annual() {
        let months = month_range(Month::new(2026, 2).unwrap(), 4);
        let mut pl = PlStatement::new(months.clone());
        pl.push(
            PlCategory::Revenue,
            lines::TOTAL_REVENUE,
            Series::from_pairs(months.iter().map(|m| (*m, 10.0))),
        );

        // Feb/Mar close FY26, Apr/May open FY27
        let q = pl.rollup(Period::Quarterly, 4);
        assert_eq!(q.periods, vec!["FY26 Q4", "FY27 Q1"]);
        assert_eq!(q.rows[0].values, vec![20.0, 20.0]);

        let y = pl.rollup(Period::Annual, 4);
        assert_eq!(y.periods, vec!["FY26", "FY27"]);

        let monthly = pl.rollup(Period::Monthly, 4);
        assert_eq!(monthly.periods.len(), 4);
        assert_eq!(monthly.periods[0], "2026-02");
    }

    #[test]
    fn test_selection_parse() {
        let registry = TerritoryRegistry::new();
        assert_eq!(Selection::parse("combined", &registry), Selection::Combined);
        assert_eq!(Selection::parse("Spain", &registry), Selection::Territory("ES".to_string()));
        assert_eq!(
            Selection::parse("Atlantis", &registry),
            Selection::Territory("Atlantis".to_string())
        );
    }
}
