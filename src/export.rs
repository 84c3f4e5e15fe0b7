// 📤 Export - statements, workbooks and bundles as CSV
//
// Statements are written at full precision so a re-import yields the same
// values. Workbooks are written in the loader's layout so an exported
// directory loads back to the same data.

use crate::config::WorkbookLayout;
use crate::loader::parse_number;
use crate::marketing::MarketingReport;
use crate::model::{BudgetData, Channel, DtcInputs, DtcMetric, Month, Series};
use crate::pl::{PeriodTable, PlCalculator, PlCategory, PlStatement, Selection};
use crate::scenario::Scenario;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// DISPLAY FORMATTING
// ============================================================================

/// `£1,234`, `(£1,234)` for negatives, `£0` for zero and non-finite values
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    if !rounded.is_finite() || rounded == 0.0 {
        return "£0".to_string();
    }
    let digits = group_thousands(rounded.abs() as u64);
    if rounded < 0.0 {
        format!("(£{})", digits)
    } else {
        format!("£{}", digits)
    }
}

fn group_thousands(n: u64) -> String {
    let raw = n.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// A fraction as a one-decimal percentage: 0.123 → `12.3%`
pub fn format_percentage(fraction: f64) -> String {
    if !fraction.is_finite() {
        return "-".to_string();
    }
    format!("{:.1}%", fraction * 100.0)
}

// ============================================================================
// STATEMENT CSV
// ============================================================================

pub fn write_statement_csv<W: Write>(statement: &PlStatement, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["Category".to_string(), "Line".to_string()];
    header.extend(statement.months.iter().map(|m| m.to_string()));
    wtr.write_record(&header)?;

    for line in &statement.lines {
        let mut record = vec![line.category.label().to_string(), line.line.clone()];
        record.extend(statement.months.iter().map(|m| line.values.get(*m).to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn read_statement_csv<R: Read>(reader: R) -> Result<PlStatement> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers().context("Failed to read statement header")?.clone();
    let months = headers
        .iter()
        .skip(2)
        .map(|h| Month::parse(h).ok_or_else(|| anyhow!("Invalid month column '{}'", h)))
        .collect::<Result<Vec<Month>>>()?;

    let mut statement = PlStatement::new(months.clone());
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read statement row {}", i + 1))?;
        let raw_category = record.get(0).unwrap_or_default();
        let category = PlCategory::parse(raw_category)
            .ok_or_else(|| anyhow!("Unknown P&L category '{}'", raw_category))?;
        let line = record.get(1).unwrap_or_default();

        let values = Series::from_pairs(months.iter().enumerate().map(|(j, m)| {
            let value = record.get(j + 2).and_then(parse_number).unwrap_or(0.0);
            (*m, value)
        }));
        statement.push(category, line, values);
    }

    Ok(statement)
}

pub fn statement_to_csv_string(statement: &PlStatement) -> Result<String> {
    let mut buffer = Vec::new();
    write_statement_csv(statement, &mut buffer)?;
    String::from_utf8(buffer).context("Statement CSV is not valid UTF-8")
}

/// CSV for a statement rolled up to quarters or years
pub fn period_table_to_csv_string(table: &PeriodTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Category".to_string(), "Line".to_string()];
    header.extend(table.periods.iter().cloned());
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.category.label().to_string(), row.line.clone()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }

    let buffer = wtr.into_inner().map_err(|e| anyhow!("Failed to flush CSV: {}", e))?;
    String::from_utf8(buffer).context("Period CSV is not valid UTF-8")
}

/// Marketing spend as `Territory,Channel,Month,Marketing Spend` rows
pub fn write_marketing_csv<W: Write>(report: &MarketingReport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Territory", "Channel", "Month", "Marketing Spend"])?;
    for row in report.rows() {
        wtr.write_record([
            row.territory.to_string(),
            row.source.label().to_string(),
            row.month.to_string(),
            row.spend.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn marketing_to_csv_string(report: &MarketingReport) -> Result<String> {
    let mut buffer = Vec::new();
    write_marketing_csv(report, &mut buffer)?;
    String::from_utf8(buffer).context("Marketing CSV is not valid UTF-8")
}

// ============================================================================
// WORKBOOK EXPORT
// ============================================================================

/// Grid writer for one sheet. Rows are kept non-empty so that preamble rows
/// survive a read (blank lines are skipped by CSV readers).
struct SheetWriter {
    path: PathBuf,
    rows: Vec<Vec<String>>,
}

impl SheetWriter {
    fn new(dir: &Path, file: &str) -> Self {
        SheetWriter {
            path: dir.join(file),
            rows: Vec::new(),
        }
    }

    /// Pad with title rows until the next row lands at `offset`
    fn preamble(&mut self, title: &str, offset: usize) {
        while self.rows.len() < offset {
            self.rows.push(vec![title.to_string()]);
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn finish(self) -> Result<PathBuf> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(self.path)
    }
}

fn month_headers(months: &[Month]) -> impl Iterator<Item = String> + '_ {
    months.iter().map(|m| m.to_string())
}

fn month_values<'a>(series: &'a Series, months: &'a [Month]) -> impl Iterator<Item = String> + 'a {
    months.iter().map(move |m| series.get(*m).to_string())
}

/// Write every sheet of `data` under `dir` in the given layout
pub fn export_workbook(data: &BudgetData, dir: &Path, layout: &WorkbookLayout) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let months = &data.months;
    let mut written = Vec::new();

    // B2B
    let mut sheet = SheetWriter::new(dir, &layout.b2b.file);
    sheet.preamble("B2B Customers", layout.b2b.header_row);
    let mut header: Vec<String> = [
        "Customer Name",
        "Country",
        "Country Group",
        "Customer Margin",
        "Last Year Revenue",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(month_headers(months));
    sheet.row(header);
    for c in &data.customers {
        let mut row = vec![
            c.name.clone(),
            c.country.clone(),
            c.country_group.clone(),
            c.margin.to_string(),
            c.last_year_revenue.to_string(),
        ];
        row.extend(month_values(&c.values, months));
        sheet.row(row);
    }
    written.push(sheet.finish()?);

    // Overheads
    let mut sheet = SheetWriter::new(dir, &layout.overheads.file);
    sheet.preamble("Overheads", layout.overheads.header_row);
    let mut header: Vec<String> = ["Territory", "Function", "Category", "Group", "Supplier"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(month_headers(months));
    sheet.row(header);
    for o in &data.overheads {
        let mut row = vec![
            o.territory.clone(),
            o.function.clone(),
            o.category.clone(),
            o.group.clone(),
            o.supplier.clone(),
        ];
        row.extend(month_values(&layout.overhead_costs.normalise(&o.values), months));
        sheet.row(row);
    }
    written.push(sheet.finish()?);

    // Fulfilment
    let mut sheet = SheetWriter::new(dir, &layout.fulfilment.file);
    sheet.preamble("Fulfilment", layout.fulfilment.header_row);
    sheet.row(vec!["Country".to_string(), "Category".to_string(), "Fulfilment %".to_string()]);
    for f in &data.fulfilment {
        sheet.row(vec![f.country.clone(), f.channel.label().to_string(), f.rate.to_string()]);
    }
    written.push(sheet.finish()?);

    // Marketplace: header, then the revenue marker, then one row per territory
    let mut sheet = SheetWriter::new(dir, &layout.marketplace.file);
    sheet.preamble("Marketplace", layout.marketplace.header_row);
    let mut header = vec!["Territory".to_string()];
    header.extend(month_headers(months));
    sheet.row(header);
    sheet.row(vec![layout.marketplace_marker.clone()]);
    for r in &data.marketplace {
        let mut row = vec![r.territory.clone()];
        row.extend(month_values(&r.values, months));
        sheet.row(row);
    }
    written.push(sheet.finish()?);

    // DTC territory grids
    for (territory, inputs) in &data.dtc {
        written.push(write_dtc_sheet(dir, layout, territory, inputs)?);
    }

    // CoGS rates
    let cogs = &layout.cogs;
    let mut sheet = SheetWriter::new(dir, &cogs.file);
    let last_row = cogs.dtc_row.max(cogs.b2b_row).max(cogs.marketplace_row);
    let width = cogs.column.max(1);
    for row in 1..=last_row {
        let mut cells = vec![String::new(); width];
        let rate = match row {
            r if r == cogs.dtc_row => Some((Channel::Dtc, data.cogs_rates.dtc)),
            r if r == cogs.b2b_row => Some((Channel::B2b, data.cogs_rates.b2b)),
            r if r == cogs.marketplace_row => Some((Channel::Marketplace, data.cogs_rates.marketplace)),
            _ => None,
        };
        match rate {
            Some((channel, value)) => {
                cells[0] = format!("{} CoGS %", channel.label());
                cells[width - 1] = value.to_string();
            }
            None => cells[0] = "UK P&L".to_string(),
        }
        sheet.row(cells);
    }
    written.push(sheet.finish()?);

    info!(dir = %dir.display(), files = written.len(), "workbook exported");
    Ok(written)
}

fn write_dtc_sheet(dir: &Path, layout: &WorkbookLayout, territory: &str, inputs: &DtcInputs) -> Result<PathBuf> {
    let dtc = &layout.dtc;
    let months: Vec<Month> = inputs
        .metrics
        .values()
        .flat_map(|s| s.months())
        .collect::<BTreeSet<Month>>()
        .into_iter()
        .take(dtc.max_months)
        .collect();

    let month_row = dtc.month_row_index();
    let first_col = dtc.first_month_index();
    let width = (first_col + months.len()).max(1);
    let last_row = DtcMetric::ALL
        .iter()
        .map(|m| dtc.metric_row_index(*m))
        .chain(std::iter::once(month_row))
        .max()
        .unwrap_or(0);

    // Labels only go in column A when the months start to its right
    let labelled = first_col > 0;
    let mut grid = vec![vec![String::new(); width]; last_row + 1];
    if labelled && month_row > 0 {
        grid[0][0] = format!("{} DTC", territory);
    }
    for (i, month) in months.iter().enumerate() {
        grid[month_row][first_col + i] = month.to_string();
    }
    for metric in DtcMetric::ALL {
        let row = dtc.metric_row_index(metric);
        if labelled {
            grid[row][0] = metric.label().to_string();
        }
        if let Some(series) = inputs.metric(metric) {
            for (i, month) in months.iter().enumerate() {
                grid[row][first_col + i] = series.get(*month).to_string();
            }
        }
    }

    let mut sheet = SheetWriter::new(dir, &dtc.file_for(territory));
    for row in grid {
        sheet.row(row);
    }
    sheet.finish()
}

// ============================================================================
// EXPORT BUNDLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub fingerprint: String,
    pub exported_at: DateTime<Utc>,
    pub scenario: Scenario,
    pub files: Vec<String>,
    pub version: String,
}

/// `pl_<slug>.csv`, with anything but ASCII letters and digits as `_`
pub fn statement_file_name(selection: &Selection) -> String {
    let slug: String = selection
        .label()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("pl_{}.csv", slug)
}

/// Write the combined P&L, one P&L per selection and a JSON manifest
pub fn export_bundle(
    calc: &PlCalculator<'_>,
    data: &BudgetData,
    scenario: &Scenario,
    selections: &[Selection],
    dir: &Path,
) -> Result<BundleManifest> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut all = vec![Selection::Combined];
    all.extend(selections.iter().filter(|s| **s != Selection::Combined).cloned());

    let mut files = Vec::new();
    for selection in &all {
        let name = statement_file_name(selection);
        let path = dir.join(&name);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_statement_csv(&calc.pl(selection), file)?;
        files.push(name);
    }

    let manifest = BundleManifest {
        fingerprint: data.fingerprint(),
        exported_at: Utc::now(),
        scenario: scenario.clone(),
        files,
        version: crate::VERSION.to_string(),
    };

    let manifest_path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, json).with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    info!(dir = %dir.display(), statements = manifest.files.len(), "export bundle written");
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> Result<BundleManifest> {
    let path = dir.join("manifest.json");
    let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest: BundleManifest = serde_json::from_str(&json).context("Invalid bundle manifest")?;
    if manifest.files.is_empty() {
        bail!("Bundle manifest lists no statements");
    }
    Ok(manifest)
}
