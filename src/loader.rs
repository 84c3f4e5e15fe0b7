// 🏗️ Workbook loader - one parser per sheet
//
// A workbook is a directory holding one CSV per sheet, laid out exactly as
// the budget spreadsheet: preamble rows, a header at a fixed offset, month
// columns. Bad cells never fail a load; they coerce to zero.

use crate::config::{cell_index, AppConfig, CogsLayout, CostSign, DtcLayout, SheetLayout, WorkbookLayout};
use crate::error::LoadError;
use crate::model::{
    BudgetData, Channel, CogsRates, CustomerRevenue, DtcInputs, DtcMetric, FulfilmentRate,
    MarketplaceRow, Month, OverheadRow, Series,
};
use crate::territory::TerritoryRegistry;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// CELL COERCION
// ============================================================================

/// Parse a spreadsheet cell as a number.
///
/// Handles currency symbols, thousands separators, accounting negatives
/// `(1,200)` and percentages (`15%` → 0.15). Returns `None` for blanks and
/// anything that is not a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let percent = s.ends_with('%');
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ',' | '%' | ' '))
        .collect();

    let mut value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Some(value)
}

/// Convert-or-default-to-zero
pub fn coerce_number(raw: &str) -> f64 {
    parse_number(raw).unwrap_or(0.0)
}

// ============================================================================
// SHEET
// ============================================================================

/// Raw cell grid of one CSV sheet
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
    coerced: Cell<usize>,
}

impl Sheet {
    pub fn from_rows(name: &str, rows: Vec<Vec<String>>) -> Self {
        Sheet {
            name: name.to_string(),
            rows,
            coerced: Cell::new(0),
        }
    }

    pub fn read(path: &Path, name: &str) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|source| LoadError::Csv {
                sheet: name.to_string(),
                source,
            })?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| LoadError::Csv {
                sheet: name.to_string(),
                source,
            })?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Sheet::from_rows(name, rows))
    }

    /// 0-based cell access; absent cells read as ""
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Numeric cell; non-blank cells that fail to parse are counted
    pub fn number(&self, row: usize, col: usize) -> f64 {
        let raw = self.cell(row, col);
        match parse_number(raw) {
            Some(v) => v,
            None => {
                if !raw.trim().is_empty() {
                    self.coerced.set(self.coerced.get() + 1);
                }
                0.0
            }
        }
    }

    /// Cells that held text where a number was expected
    pub fn coerced_cells(&self) -> usize {
        self.coerced.get()
    }

    /// Header row at `offset` with column lookup helpers
    pub fn header(&self, offset: usize) -> Result<Header, LoadError> {
        let row = self
            .rows
            .get(offset)
            .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
            .ok_or_else(|| LoadError::MissingHeader {
                sheet: self.name.clone(),
                offset,
            })?;
        Ok(Header {
            sheet: self.name.clone(),
            columns: row.iter().map(|c| c.trim().to_string()).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    sheet: String,
    columns: Vec<String>,
}

impl Header {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> Result<usize, LoadError> {
        self.find(name).ok_or_else(|| LoadError::MissingColumn {
            sheet: self.sheet.clone(),
            column: name.to_string(),
        })
    }

    /// (column index, month) for every header that parses as a month
    pub fn month_columns(&self) -> Vec<(usize, Month)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| Month::parse(c).map(|m| (i, m)))
            .collect()
    }
}

fn series_from_row(sheet: &Sheet, row: usize, columns: &[(usize, Month)]) -> Series {
    Series::from_pairs(columns.iter().map(|(col, month)| (*month, sheet.number(row, *col))))
}

// ============================================================================
// SHEET PARSERS
// ============================================================================

/// One parser per sheet of the workbook
pub trait SheetParser {
    type Output;

    /// Sheet name used in logs and errors
    fn sheet_name(&self) -> &str;

    fn parse(&self, sheet: &Sheet) -> Result<Self::Output, LoadError>;
}

/// B2B customer revenue. Also the source of the model's month list.
pub struct B2bParser<'a> {
    pub layout: &'a SheetLayout,
}

pub struct B2bSheet {
    pub months: Vec<Month>,
    pub customers: Vec<CustomerRevenue>,
}

impl SheetParser for B2bParser<'_> {
    type Output = B2bSheet;

    fn sheet_name(&self) -> &str {
        "B2B"
    }

    fn parse(&self, sheet: &Sheet) -> Result<B2bSheet, LoadError> {
        let header = sheet.header(self.layout.header_row)?;
        let name_col = header.require("Customer Name")?;
        let country_col = header.require("Country")?;
        let group_col = header.find("Country Group");
        let margin_col = header.find("Customer Margin");
        let last_year_col = header
            .find("Last Year FY25 Revenue")
            .or_else(|| header.find("Last Year Revenue"));

        let month_cols = header.month_columns();
        if month_cols.is_empty() {
            return Err(LoadError::NoMonthColumns {
                sheet: self.sheet_name().to_string(),
            });
        }

        let mut customers = Vec::new();
        for row in (self.layout.header_row + 1)..sheet.rows.len() {
            let name = sheet.cell(row, name_col).trim();
            if name.is_empty() {
                continue;
            }

            customers.push(CustomerRevenue {
                name: name.to_string(),
                country: sheet.cell(row, country_col).trim().to_string(),
                country_group: group_col
                    .map(|c| sheet.cell(row, c).trim().to_string())
                    .unwrap_or_default(),
                margin: margin_col.map(|c| sheet.number(row, c)).unwrap_or(0.0),
                last_year_revenue: last_year_col.map(|c| sheet.number(row, c)).unwrap_or(0.0),
                values: series_from_row(sheet, row, &month_cols),
            });
        }

        Ok(B2bSheet {
            months: month_cols.iter().map(|(_, m)| *m).collect(),
            customers,
        })
    }
}

pub struct OverheadsParser<'a> {
    pub layout: &'a SheetLayout,
    pub costs: CostSign,
}

impl SheetParser for OverheadsParser<'_> {
    type Output = Vec<OverheadRow>;

    fn sheet_name(&self) -> &str {
        "Overheads"
    }

    fn parse(&self, sheet: &Sheet) -> Result<Vec<OverheadRow>, LoadError> {
        let header = sheet.header(self.layout.header_row)?;
        let territory_col = header.require("Territory")?;
        let category_col = header.require("Category")?;
        let function_col = header.find("Function");
        let group_col = header.find("Group");
        let supplier_col = header.find("Supplier");
        let month_cols = header.month_columns();

        let text = |row: usize, col: Option<usize>| {
            col.map(|c| sheet.cell(row, c).trim().to_string())
                .unwrap_or_default()
        };

        let mut rows = Vec::new();
        for row in (self.layout.header_row + 1)..sheet.rows.len() {
            let category = sheet.cell(row, category_col).trim();
            if category.is_empty() {
                continue;
            }

            rows.push(OverheadRow {
                territory: sheet.cell(row, territory_col).trim().to_string(),
                function: text(row, function_col),
                category: category.to_string(),
                group: text(row, group_col),
                supplier: text(row, supplier_col),
                values: self.costs.normalise(&series_from_row(sheet, row, &month_cols)),
            });
        }

        Ok(rows)
    }
}

pub struct FulfilmentParser<'a> {
    pub layout: &'a SheetLayout,
    pub default_rate: f64,
}

impl SheetParser for FulfilmentParser<'_> {
    type Output = Vec<FulfilmentRate>;

    fn sheet_name(&self) -> &str {
        "Fulfilment"
    }

    fn parse(&self, sheet: &Sheet) -> Result<Vec<FulfilmentRate>, LoadError> {
        let header = sheet.header(self.layout.header_row)?;
        let country_col = header.require("Country")?;
        let channel_col = header.require("Category")?;
        // The rate header has carried trailing spaces; match loosely, else
        // fall back to the third column
        let rate_col = header
            .columns
            .iter()
            .position(|c| c.to_lowercase().contains("fulfilment"))
            .unwrap_or(2);

        let mut rates = Vec::new();
        for row in (self.layout.header_row + 1)..sheet.rows.len() {
            let country = sheet.cell(row, country_col).trim();
            if country.is_empty() {
                continue;
            }

            let raw_channel = sheet.cell(row, channel_col);
            let Some(channel) = Channel::parse(raw_channel) else {
                debug!(sheet = %sheet.name, channel = raw_channel, "skipping unmodelled channel");
                continue;
            };

            let rate = parse_number(sheet.cell(row, rate_col)).unwrap_or(self.default_rate);
            rates.push(FulfilmentRate {
                country: country.to_string(),
                channel,
                rate,
            });
        }

        Ok(rates)
    }
}

pub struct MarketplaceParser<'a> {
    pub layout: &'a SheetLayout,
    pub marker: &'a str,
}

impl SheetParser for MarketplaceParser<'_> {
    type Output = Vec<MarketplaceRow>;

    fn sheet_name(&self) -> &str {
        "Marketplace"
    }

    fn parse(&self, sheet: &Sheet) -> Result<Vec<MarketplaceRow>, LoadError> {
        let header = sheet.header(self.layout.header_row)?;
        let month_cols = header.month_columns();
        let first_data_row = self.layout.header_row + 1;

        // Revenue rows follow the "Territory £" marker up to the first blank
        // row; the rows above it hold percentage splits
        let marker_row = (first_data_row..sheet.rows.len())
            .find(|r| sheet.cell(*r, 0).trim().eq_ignore_ascii_case(self.marker.trim()));
        let (range, in_section) = match marker_row {
            Some(marker) => ((marker + 1)..sheet.rows.len(), true),
            None => {
                debug!(sheet = %sheet.name, "no revenue marker, searching whole sheet");
                (first_data_row..sheet.rows.len(), false)
            }
        };

        let mut rows: Vec<MarketplaceRow> = Vec::new();
        for row in range {
            let territory = sheet.cell(row, 0).trim();
            if territory.is_empty() && in_section {
                break;
            }
            if territory.is_empty() || rows.iter().any(|r| r.territory == territory) {
                continue;
            }
            rows.push(MarketplaceRow {
                territory: territory.to_string(),
                values: series_from_row(sheet, row, &month_cols),
            });
        }

        Ok(rows)
    }
}

/// Fixed-grid DTC inputs for one territory
pub struct DtcParser<'a> {
    pub layout: &'a DtcLayout,
    pub territory: &'a str,
}

impl SheetParser for DtcParser<'_> {
    type Output = DtcInputs;

    fn sheet_name(&self) -> &str {
        self.territory
    }

    fn parse(&self, sheet: &Sheet) -> Result<DtcInputs, LoadError> {
        let month_row = self.layout.month_row_index();
        let first_col = self.layout.first_month_index();

        let months: Vec<(usize, Month)> = (first_col..first_col + self.layout.max_months)
            .filter_map(|col| Month::parse(sheet.cell(month_row, col)).map(|m| (col, m)))
            .collect();
        if months.is_empty() {
            return Err(LoadError::NoMonthColumns {
                sheet: sheet.name.clone(),
            });
        }

        let mut inputs = DtcInputs::new(self.territory);
        for metric in DtcMetric::ALL {
            let row = self.layout.metric_row_index(metric);
            inputs
                .metrics
                .insert(metric, series_from_row(sheet, row, &months));
        }

        Ok(inputs)
    }
}

pub struct CogsParser<'a> {
    pub layout: &'a CogsLayout,
}

impl SheetParser for CogsParser<'_> {
    type Output = CogsRates;

    fn sheet_name(&self) -> &str {
        "UK P&L"
    }

    fn parse(&self, sheet: &Sheet) -> Result<CogsRates, LoadError> {
        let defaults = CogsRates::default();
        let col = cell_index(self.layout.column);

        // A blank or zero cell keeps the channel default
        let read = |row: usize, fallback: f64| match parse_number(sheet.cell(cell_index(row), col)) {
            Some(v) if v != 0.0 => v.abs(),
            _ => fallback,
        };

        Ok(CogsRates {
            dtc: read(self.layout.dtc_row, defaults.dtc),
            b2b: read(self.layout.b2b_row, defaults.b2b),
            marketplace: read(self.layout.marketplace_row, defaults.marketplace),
        })
    }
}

// ============================================================================
// WORKBOOK LOADER
// ============================================================================

pub struct WorkbookLoader {
    dir: PathBuf,
    config: AppConfig,
    registry: TerritoryRegistry,
}

impl WorkbookLoader {
    pub fn new<P: AsRef<Path>>(dir: P, config: AppConfig) -> Self {
        WorkbookLoader {
            dir: dir.as_ref().to_path_buf(),
            config,
            registry: TerritoryRegistry::new(),
        }
    }

    fn layout(&self) -> &WorkbookLayout {
        &self.config.workbook
    }

    fn sheet_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read_required(&self, file: &str, name: &str) -> Result<Sheet, LoadError> {
        let path = self.sheet_path(file);
        if !path.exists() {
            return Err(LoadError::MissingSheet {
                sheet: name.to_string(),
                path,
            });
        }
        Sheet::read(&path, name)
    }

    fn read_optional(&self, file: &str, name: &str) -> Result<Option<Sheet>, LoadError> {
        let path = self.sheet_path(file);
        if !path.exists() {
            warn!(sheet = name, path = %path.display(), "sheet missing, treating as empty");
            return Ok(None);
        }
        Sheet::read(&path, name).map(Some)
    }

    fn run<P: SheetParser>(&self, parser: &P, sheet: &Sheet) -> Result<P::Output, LoadError> {
        let output = parser.parse(sheet)?;
        if sheet.coerced_cells() > 0 {
            warn!(
                sheet = parser.sheet_name(),
                cells = sheet.coerced_cells(),
                "coerced non-numeric cells to zero"
            );
        }
        Ok(output)
    }

    /// Load every sheet. Only the B2B sheet is required.
    pub fn load(&self) -> Result<BudgetData, LoadError> {
        if !self.dir.is_dir() {
            return Err(LoadError::WorkbookNotFound(self.dir.clone()));
        }
        let layout = self.layout();

        let b2b_sheet = self.read_required(&layout.b2b.file, "B2B")?;
        let b2b = self.run(&B2bParser { layout: &layout.b2b }, &b2b_sheet)?;
        let mut data = BudgetData::new(b2b.months);
        data.customers = b2b.customers;

        if let Some(sheet) = self.read_optional(&layout.overheads.file, "Overheads")? {
            let parser = OverheadsParser {
                layout: &layout.overheads,
                costs: layout.overhead_costs,
            };
            data.overheads = self.run(&parser, &sheet)?;
        }

        if let Some(sheet) = self.read_optional(&layout.fulfilment.file, "Fulfilment")? {
            let parser = FulfilmentParser {
                layout: &layout.fulfilment,
                default_rate: self.config.model.default_fulfilment_rate,
            };
            data.fulfilment = self.run(&parser, &sheet)?;
        }

        if let Some(sheet) = self.read_optional(&layout.marketplace.file, "Marketplace")? {
            let parser = MarketplaceParser {
                layout: &layout.marketplace,
                marker: &layout.marketplace_marker,
            };
            data.marketplace = self.run(&parser, &sheet)?;
        }

        for territory in &self.config.model.dtc_territories {
            let code = self.registry.canonical_code(territory).unwrap_or(territory.as_str());
            let file = layout.dtc.file_for(code);
            let path = self.sheet_path(&file);
            if !path.exists() {
                debug!(territory = code, "no DTC sheet");
                continue;
            }

            let sheet = Sheet::read(&path, code)?;
            match self.run(&DtcParser { layout: &layout.dtc, territory: code }, &sheet) {
                Ok(inputs) => {
                    data.dtc.insert(code.to_string(), inputs);
                }
                // A broken territory sheet reads as "no DTC data", as a
                // missing one does
                Err(err) => warn!(territory = code, error = %err, "skipping DTC sheet"),
            }
        }

        if let Some(sheet) = self.read_optional(&layout.cogs.file, "UK P&L")? {
            data.cogs_rates = self.run(&CogsParser { layout: &layout.cogs }, &sheet)?;
        }

        info!(
            months = data.months.len(),
            customers = data.customers.len(),
            overheads = data.overheads.len(),
            fulfilment_rates = data.fulfilment.len(),
            marketplace_rows = data.marketplace.len(),
            dtc_territories = data.dtc.len(),
            "workbook loaded"
        );

        Ok(data)
    }
}

/// Load a workbook directory with the given configuration
pub fn load_workbook<P: AsRef<Path>>(dir: P, config: &AppConfig) -> Result<BudgetData, LoadError> {
    WorkbookLoader::new(dir, config.clone()).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sheet(name: &str, csv: &str) -> Sheet {
        let rows = csv
            .lines()
            .map(|l| l.split(',').map(|c| c.to_string()).collect())
            .collect();
        Sheet::from_rows(name, rows)
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("1234.5"), Some(1234.5));
        assert_eq!(parse_number(" £1,200 "), Some(1200.0));
        assert_eq!(parse_number("(500)"), Some(-500.0));
        assert_eq!(parse_number("(£1,500.25)"), Some(-1500.25));
        assert_eq!(parse_number("-0.15"), Some(-0.15));
        assert_eq!(parse_number("15%"), Some(0.15));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_coerce_defaults_to_zero() {
        assert_eq!(coerce_number("#REF!"), 0.0);
        assert_eq!(coerce_number("  "), 0.0);
        assert_eq!(coerce_number("42"), 42.0);
    }

    #[test]
    fn test_b2b_parser_skips_blank_names_and_coerces() {
        let layout = SheetLayout {
            file: "B2B.csv".to_string(),
            header_row: 1,
        };
        let s = sheet(
            "B2B",
            "B2B Customers,,,,\n\
             Customer Name,Country,Country Group,Customer Margin,2026-04,2026-05\n\
             Acme,United Kingdom,UK,0.3,100,£1\n\
             ,Spain,CE,0.1,999,999\n\
             Bolt,Spain,CE,oops,#N/A,50",
        );

        let parsed = B2bParser { layout: &layout }.parse(&s).unwrap();
        assert_eq!(parsed.months.len(), 2);
        assert_eq!(parsed.customers.len(), 2);

        let acme = &parsed.customers[0];
        assert_eq!(acme.values.get(parsed.months[0]), 100.0);
        assert_eq!(acme.values.get(parsed.months[1]), 1.0);

        let bolt = &parsed.customers[1];
        assert_eq!(bolt.margin, 0.0);
        assert_eq!(bolt.values.get(parsed.months[0]), 0.0);
        assert_eq!(bolt.values.get(parsed.months[1]), 50.0);
        assert_eq!(s.coerced_cells(), 2);
    }

    #[test]
    fn test_b2b_parser_requires_columns() {
        let layout = SheetLayout {
            file: "B2B.csv".to_string(),
            header_row: 0,
        };
        let s = sheet("B2B", "Name,Country,2026-04\nAcme,UK,1");
        let err = B2bParser { layout: &layout }.parse(&s).err().unwrap();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "Customer Name"));

        let s = sheet("B2B", "Customer Name,Country\nAcme,UK");
        let err = B2bParser { layout: &layout }.parse(&s).err().unwrap();
        assert!(matches!(err, LoadError::NoMonthColumns { .. }));
    }

    #[test]
    fn test_fulfilment_parser_defaults_and_loose_header() {
        let layout = SheetLayout {
            file: "Fulfilment.csv".to_string(),
            header_row: 0,
        };
        let s = sheet(
            "Fulfilment",
            "Country,Category,Fulfilment % \n\
             UK,DTC,-0.12\n\
             UK,B2B,\n\
             UK,TikTok,-0.2",
        );

        let rates = FulfilmentParser {
            layout: &layout,
            default_rate: -0.15,
        }
        .parse(&s)
        .unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].rate, -0.12);
        assert_eq!(rates[1].channel, Channel::B2b);
        assert_eq!(rates[1].rate, -0.15);
    }

    #[test]
    fn test_marketplace_parser_reads_revenue_section() {
        let layout = SheetLayout {
            file: "Amazon.csv".to_string(),
            header_row: 0,
        };
        let s = sheet(
            "Amazon",
            "Territory,2026-04,2026-05\n\
             UK,0.5,0.5\n\
             Territory £,,\n\
             UK,1000,1100\n\
             Spain,200,210",
        );

        let rows = MarketplaceParser {
            layout: &layout,
            marker: "Territory £",
        }
        .parse(&s)
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].territory, "UK");
        assert_eq!(rows[0].values.total(), 2100.0);
        assert_eq!(rows[1].territory, "Spain");
    }

    #[test]
    fn test_marketplace_section_follows_the_data() {
        let layout = SheetLayout {
            file: "Amazon.csv".to_string(),
            header_row: 0,
        };
        let mut csv = String::from("Territory,2026-04\nTerritory £,\n");
        for i in 0..20 {
            csv.push_str(&format!("T{},{}\n", i, i));
        }
        csv.push_str(",\nNotes,999");
        let s = sheet("Amazon", &csv);

        let rows = MarketplaceParser {
            layout: &layout,
            marker: "Territory £",
        }
        .parse(&s)
        .unwrap();

        // All twenty rows, and nothing after the blank row that closes the section
        assert_eq!(rows.len(), 20);
        assert_eq!(rows[19].territory, "T19");
        assert!(rows.iter().all(|r| r.territory != "Notes"));
    }

    #[test]
    fn test_overheads_parser_normalises_positive_costs() {
        let layout = SheetLayout {
            file: "Overheads.csv".to_string(),
            header_row: 0,
        };
        let csv = "Territory,Function,Category,2026-04\n\
                   UK,Marketing,Paid Social,300\n\
                   UK,Finance,Rebate,-40";
        let s = sheet("Overheads", csv);

        let as_written = OverheadsParser {
            layout: &layout,
            costs: CostSign::Negative,
        }
        .parse(&s)
        .unwrap();
        assert_eq!(as_written[0].values.total(), 300.0);

        let flipped = OverheadsParser {
            layout: &layout,
            costs: CostSign::Positive,
        }
        .parse(&s)
        .unwrap();
        assert_eq!(flipped[0].values.total(), -300.0);
        // A credit written negative becomes a positive P&L value
        assert_eq!(flipped[1].values.total(), 40.0);
    }

    #[test]
    fn test_dtc_parser_fixed_rows() {
        let layout = DtcLayout::default();
        let mut rows = vec![vec![String::new(); 6]; 36];
        rows[1][4] = "2026-04-01 00:00:00".to_string();
        rows[1][5] = "2026-05-01 00:00:00".to_string();
        rows[24][0] = "Total Revenue".to_string();
        rows[24][4] = "5000".to_string();
        rows[24][5] = "6000".to_string();
        rows[3][4] = "100000".to_string();
        let s = Sheet::from_rows("UK", rows);

        let inputs = DtcParser {
            layout: &layout,
            territory: "UK",
        }
        .parse(&s)
        .unwrap();

        assert_eq!(inputs.revenue().unwrap().total(), 11000.0);
        assert_eq!(inputs.metric(DtcMetric::Traffic).unwrap().total(), 100000.0);
        assert_eq!(inputs.metric(DtcMetric::MarketingBudget).unwrap().total(), 0.0);
    }

    #[test]
    fn test_cogs_parser_defaults_and_abs() {
        let layout = CogsLayout::default();
        let mut rows = vec![vec![String::new(); 3]; 18];
        rows[15][2] = "-0.3".to_string();
        rows[16][2] = "0".to_string();
        let s = Sheet::from_rows("UK P&L", rows);

        let rates = CogsParser { layout: &layout }.parse(&s).unwrap();
        assert_eq!(rates.dtc, 0.3);
        assert_eq!(rates.b2b, 0.26);
        assert_eq!(rates.marketplace, 0.18);
    }

    #[test]
    fn test_loader_requires_b2b_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.workbook.b2b.header_row = 0;

        let err = load_workbook(dir.path(), &config).err().unwrap();
        assert!(matches!(err, LoadError::MissingSheet { .. }));

        fs::write(
            dir.path().join("B2B.csv"),
            "Customer Name,Country,Country Group,2026-04\nAcme,United Kingdom,UK,10\n",
        )
        .unwrap();

        let data = load_workbook(dir.path(), &config).unwrap();
        assert_eq!(data.customers.len(), 1);
        assert!(data.overheads.is_empty());
        assert!(data.dtc.is_empty());
        assert_eq!(data.cogs_rates, CogsRates::default());
    }

    #[test]
    fn test_loader_missing_directory() {
        let err = load_workbook("/definitely/not/here", &AppConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::WorkbookNotFound(_)));
    }
}
