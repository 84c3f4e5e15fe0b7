// 📒 Budget data model - flat tabular records loaded from the workbook
//
// Every monthly figure lives in a `Series` keyed by `Month`. Lookups for a
// month that a series does not carry read as zero, so sheets with shorter
// or misaligned time ranges never break a calculation.

use crate::error::EditError;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// MONTH
// ============================================================================

/// A budget period key, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Month { year, month })
        } else {
            None
        }
    }

    /// Parse a column header into a month.
    ///
    /// Accepts `2026-04`, `2026-04-01` and `2026-04-01 00:00:00` (the shape a
    /// spreadsheet date header takes once saved as CSV).
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();

        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Month::new(dt.year(), dt.month());
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Month::new(d.year(), d.month());
        }

        let (year, month) = s.split_once('-')?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return None;
        }
        Month::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Month {
        if self.month == 12 {
            Month { year: self.year + 1, month: 1 }
        } else {
            Month { year: self.year, month: self.month + 1 }
        }
    }

    /// Calendar year in which the fiscal year containing this month ends.
    pub fn fiscal_year(&self, start_month: u32) -> i32 {
        if start_month <= 1 || self.month < start_month {
            self.year
        } else {
            self.year + 1
        }
    }

    /// Fiscal quarter (1-4) for a fiscal year starting in `start_month`.
    pub fn fiscal_quarter(&self, start_month: u32) -> u32 {
        let start = start_month.clamp(1, 12);
        let offset = (self.month + 12 - start) % 12;
        offset / 3 + 1
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for Month {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Month::parse(&value).ok_or_else(|| format!("invalid month '{}'", value))
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

/// `count` consecutive months starting at `first`
pub fn month_range(first: Month, count: usize) -> Vec<Month> {
    let mut months = Vec::with_capacity(count);
    let mut current = first;
    for _ in 0..count {
        months.push(current);
        current = current.next();
    }
    months
}

// ============================================================================
// SERIES
// ============================================================================

/// Monthly values. Missing months read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Series(BTreeMap<Month, f64>);

impl Series {
    pub fn new() -> Self {
        Series(BTreeMap::new())
    }

    pub fn zeros(months: &[Month]) -> Self {
        Series(months.iter().map(|m| (*m, 0.0)).collect())
    }

    pub fn from_pairs<I: IntoIterator<Item = (Month, f64)>>(pairs: I) -> Self {
        Series(pairs.into_iter().collect())
    }

    pub fn get(&self, month: Month) -> f64 {
        self.0.get(&month).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, month: Month, value: f64) {
        self.0.insert(month, value);
    }

    pub fn add_to(&mut self, month: Month, value: f64) {
        *self.0.entry(month).or_insert(0.0) += value;
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum over the given months only
    pub fn total_over(&self, months: &[Month]) -> f64 {
        months.iter().map(|m| self.get(*m)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Month, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn months(&self) -> impl Iterator<Item = Month> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Project onto `months`, applying `f` to each value.
    pub fn map_over(&self, months: &[Month], f: impl Fn(f64) -> f64) -> Series {
        Series(months.iter().map(|m| (*m, f(self.get(*m)))).collect())
    }

    /// Month-wise `self + other` over `months`
    pub fn plus(&self, other: &Series, months: &[Month]) -> Series {
        Series(months.iter().map(|m| (*m, self.get(*m) + other.get(*m))).collect())
    }

    /// Month-wise `self - other` over `months`
    pub fn minus(&self, other: &Series, months: &[Month]) -> Series {
        Series(months.iter().map(|m| (*m, self.get(*m) - other.get(*m))).collect())
    }

    pub fn is_all_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }

    /// Every value with its sign flipped
    pub fn negated(&self) -> Series {
        Series(self.0.iter().map(|(m, v)| (*m, -v)).collect())
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    Dtc,
    B2b,
    Marketplace,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Dtc, Channel::B2b, Channel::Marketplace];

    /// Label used in sheets and P&L line names
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Dtc => "DTC",
            Channel::B2b => "B2B",
            Channel::Marketplace => "Marketplace",
        }
    }

    pub fn parse(raw: &str) -> Option<Channel> {
        match raw.trim().to_lowercase().as_str() {
            "dtc" | "d2c" | "direct" => Some(Channel::Dtc),
            "b2b" | "wholesale" => Some(Channel::B2b),
            "marketplace" | "amazon" | "mp" => Some(Channel::Marketplace),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SHEET RECORDS
// ============================================================================

/// One row of the B2B sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRevenue {
    pub name: String,
    /// Full country name as written in the sheet ("United Kingdom")
    pub country: String,
    pub country_group: String,
    pub margin: f64,
    pub last_year_revenue: f64,
    pub values: Series,
}

/// One row of the Overheads sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverheadRow {
    /// Territory code, country name or a group label; empty = unallocated
    pub territory: String,
    pub function: String,
    pub category: String,
    pub group: String,
    pub supplier: String,
    pub values: Series,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfilmentRate {
    pub country: String,
    pub channel: Channel,
    /// Share of revenue; negative means cost
    pub rate: f64,
}

/// Revenue row from the "Territory £" section of the marketplace sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceRow {
    pub territory: String,
    pub values: Series,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcMetric {
    Traffic,
    ConversionRate,
    NewCustomers,
    NewSubscriptionCustomers,
    RecurringSubscriptionCustomers,
    ReturningCustomers,
    TotalOrders,
    TotalRevenue,
    MarketingBudget,
}

impl DtcMetric {
    pub const ALL: [DtcMetric; 9] = [
        DtcMetric::Traffic,
        DtcMetric::ConversionRate,
        DtcMetric::NewCustomers,
        DtcMetric::NewSubscriptionCustomers,
        DtcMetric::RecurringSubscriptionCustomers,
        DtcMetric::ReturningCustomers,
        DtcMetric::TotalOrders,
        DtcMetric::TotalRevenue,
        DtcMetric::MarketingBudget,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DtcMetric::Traffic => "Traffic",
            DtcMetric::ConversionRate => "Conversion Rate",
            DtcMetric::NewCustomers => "New Customers",
            DtcMetric::NewSubscriptionCustomers => "New Subscription Customers",
            DtcMetric::RecurringSubscriptionCustomers => "Recurring Subscription Customers",
            DtcMetric::ReturningCustomers => "Returning Customers",
            DtcMetric::TotalOrders => "Total Orders",
            DtcMetric::TotalRevenue => "Total Revenue",
            DtcMetric::MarketingBudget => "Marketing Budget",
        }
    }

    /// Snake-case key used in config files and the API
    pub fn key(&self) -> &'static str {
        match self {
            DtcMetric::Traffic => "traffic",
            DtcMetric::ConversionRate => "conversion_rate",
            DtcMetric::NewCustomers => "new_customers",
            DtcMetric::NewSubscriptionCustomers => "new_subscription_customers",
            DtcMetric::RecurringSubscriptionCustomers => "recurring_subscription_customers",
            DtcMetric::ReturningCustomers => "returning_customers",
            DtcMetric::TotalOrders => "total_orders",
            DtcMetric::TotalRevenue => "total_revenue",
            DtcMetric::MarketingBudget => "marketing_budget",
        }
    }

    pub fn parse(raw: &str) -> Option<DtcMetric> {
        let key = raw.trim().to_lowercase().replace(' ', "_");
        DtcMetric::ALL.into_iter().find(|m| m.key() == key)
    }

    /// 1-based row of the metric in a territory sheet
    pub fn default_row(&self) -> usize {
        match self {
            DtcMetric::Traffic => 4,
            DtcMetric::ConversionRate => 6,
            DtcMetric::NewCustomers => 9,
            DtcMetric::NewSubscriptionCustomers => 10,
            DtcMetric::RecurringSubscriptionCustomers => 11,
            DtcMetric::ReturningCustomers => 12,
            DtcMetric::TotalOrders => 13,
            DtcMetric::TotalRevenue => 25,
            DtcMetric::MarketingBudget => 36,
        }
    }
}

/// DTC driver inputs for one territory sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcInputs {
    pub territory: String,
    pub metrics: BTreeMap<DtcMetric, Series>,
}

impl DtcInputs {
    pub fn new(territory: &str) -> Self {
        DtcInputs {
            territory: territory.to_string(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn metric(&self, metric: DtcMetric) -> Option<&Series> {
        self.metrics.get(&metric)
    }

    pub fn revenue(&self) -> Option<&Series> {
        self.metric(DtcMetric::TotalRevenue)
    }
}

/// CoGS as a share of revenue, stored as a positive rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CogsRates {
    pub dtc: f64,
    pub b2b: f64,
    pub marketplace: f64,
}

impl Default for CogsRates {
    fn default() -> Self {
        CogsRates {
            dtc: 0.24,
            b2b: 0.26,
            marketplace: 0.18,
        }
    }
}

impl CogsRates {
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Dtc => self.dtc,
            Channel::B2b => self.b2b,
            Channel::Marketplace => self.marketplace,
        }
    }

    pub fn set(&mut self, channel: Channel, rate: f64) {
        let rate = rate.abs();
        match channel {
            Channel::Dtc => self.dtc = rate,
            Channel::B2b => self.b2b = rate,
            Channel::Marketplace => self.marketplace = rate,
        }
    }
}

// ============================================================================
// BUDGET DATA
// ============================================================================

/// Everything loaded from one workbook. Held in memory and edited in place;
/// nothing is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetData {
    pub months: Vec<Month>,
    pub customers: Vec<CustomerRevenue>,
    pub overheads: Vec<OverheadRow>,
    pub fulfilment: Vec<FulfilmentRate>,
    pub marketplace: Vec<MarketplaceRow>,
    /// Keyed by territory code
    pub dtc: BTreeMap<String, DtcInputs>,
    pub cogs_rates: CogsRates,
}

impl BudgetData {
    pub fn new(months: Vec<Month>) -> Self {
        BudgetData {
            months,
            ..Default::default()
        }
    }

    /// SHA-256 over every loaded value. Changes whenever an edit lands.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        for m in &self.months {
            hasher.update(m.to_string().as_bytes());
        }
        for c in &self.customers {
            hash_fields(&mut hasher, &[&c.name, &c.country, &c.country_group]);
            hasher.update(c.margin.to_le_bytes());
            hasher.update(c.last_year_revenue.to_le_bytes());
            hash_series(&mut hasher, &c.values);
        }
        for o in &self.overheads {
            hash_fields(&mut hasher, &[&o.territory, &o.function, &o.category, &o.group, &o.supplier]);
            hash_series(&mut hasher, &o.values);
        }
        for f in &self.fulfilment {
            hash_fields(&mut hasher, &[&f.country, f.channel.label()]);
            hasher.update(f.rate.to_le_bytes());
        }
        for r in &self.marketplace {
            hash_fields(&mut hasher, &[&r.territory]);
            hash_series(&mut hasher, &r.values);
        }
        for (territory, inputs) in &self.dtc {
            hash_fields(&mut hasher, &[territory]);
            for (metric, series) in &inputs.metrics {
                hash_fields(&mut hasher, &[metric.label()]);
                hash_series(&mut hasher, series);
            }
        }
        for channel in Channel::ALL {
            hasher.update(self.cogs_rates.get(channel).to_le_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    pub fn customer(&self, name: &str) -> Option<&CustomerRevenue> {
        self.customers.iter().find(|c| c.name == name)
    }

    // ========================================================================
    // TRANSIENT EDITS
    // ========================================================================

    fn check_edit(&self, month: Month, value: f64) -> Result<(), EditError> {
        if !value.is_finite() {
            return Err(EditError::NotFinite(value));
        }
        if !self.months.contains(&month) {
            return Err(EditError::UnknownMonth(month.to_string()));
        }
        Ok(())
    }

    pub fn set_customer_value(&mut self, name: &str, month: Month, value: f64) -> Result<(), EditError> {
        self.check_edit(month, value)?;
        let customer = self
            .customers
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| EditError::UnknownCustomer(name.to_string()))?;
        customer.values.set(month, value);
        Ok(())
    }

    pub fn set_overhead_value(&mut self, index: usize, month: Month, value: f64) -> Result<(), EditError> {
        self.check_edit(month, value)?;
        let row = self
            .overheads
            .get_mut(index)
            .ok_or(EditError::UnknownOverheadRow(index))?;
        row.values.set(month, value);
        Ok(())
    }

    pub fn set_dtc_value(
        &mut self,
        territory: &str,
        metric: DtcMetric,
        month: Month,
        value: f64,
    ) -> Result<(), EditError> {
        self.check_edit(month, value)?;
        let inputs = self
            .dtc
            .get_mut(territory)
            .ok_or_else(|| EditError::UnknownTerritory(territory.to_string()))?;
        inputs.metrics.entry(metric).or_default().set(month, value);
        Ok(())
    }

    /// Insert or replace the fulfilment rate for a territory/channel pair
    pub fn set_fulfilment_rate(&mut self, country: &str, channel: Channel, rate: f64) -> Result<(), EditError> {
        if !rate.is_finite() {
            return Err(EditError::NotFinite(rate));
        }
        match self
            .fulfilment
            .iter_mut()
            .find(|f| f.country == country && f.channel == channel)
        {
            Some(existing) => existing.rate = rate,
            None => self.fulfilment.push(FulfilmentRate {
                country: country.to_string(),
                channel,
                rate,
            }),
        }
        Ok(())
    }

    pub fn set_cogs_rate(&mut self, channel: Channel, rate: f64) -> Result<(), EditError> {
        if !rate.is_finite() {
            return Err(EditError::NotFinite(rate));
        }
        self.cogs_rates.set(channel, rate);
        Ok(())
    }
}

fn hash_fields(hasher: &mut Sha256, fields: &[&str]) {
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
}

fn hash_series(hasher: &mut Sha256, series: &Series) {
    for (month, value) in series.iter() {
        hasher.update(month.to_string().as_bytes());
        hasher.update(value.to_le_bytes());
    }
}
