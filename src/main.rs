use anyhow::{bail, Context, Result};
use budget_planner::{
    b2b_view, compare_scenarios, export_bundle, export_workbook, format_currency,
    format_percentage, load_workbook, project_dtc, top_customers, write_marketing_csv,
    write_statement_csv, AppConfig, B2bQuery, BudgetData, DataQualityEngine, DriverAdjustment,
    KeyMetrics, MarketingReport, Month, Period, PeriodTable, PlCalculator, ReconciliationEngine,
    Region, Scenario, Selection, Severity, TerritoryRegistry, Waterfall,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "budget-planner", version, about = "Territory P&L planning over a budget workbook")]
struct Cli {
    /// TOML configuration file (falls back to BUDGET_PLANNER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the workbook sheets as CSV
    #[arg(long, short, global = true, default_value = "data")]
    workbook: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a P&L statement
    Pl {
        #[arg(default_value = "combined")]
        selection: String,
        #[arg(long, short, default_value = "monthly")]
        period: String,
        /// Scenario adjustment, e.g. --set dtc_growth=10
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Compare a scenario against a base scenario (baseline by default)
    Compare {
        #[arg(default_value = "combined")]
        selection: String,
        #[arg(long, short, default_value = "annual")]
        period: String,
        #[arg(long = "base", value_name = "NAME=VALUE")]
        base: Vec<String>,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Revenue to EBITDA bridge with key margins
    Waterfall {
        #[arg(default_value = "combined")]
        selection: String,
        /// Single month (YYYY-MM); whole budget when omitted
        #[arg(long, short)]
        month: Option<String>,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Run data quality checks
    Quality {
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Check channel sums and aggregation of the combined P&L
    Reconcile {
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Write workbooks, bundles or single statements
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },
    /// Largest B2B customers by budget revenue
    Customers {
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
    /// B2B customers filtered by region, name and revenue
    B2b {
        /// Region codes (UK, CE, EE, ROW); all regions when omitted
        #[arg(long = "region", value_delimiter = ',')]
        regions: Vec<String>,
        /// Case-insensitive part of the customer name
        #[arg(long, short)]
        search: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        min_revenue: f64,
    },
    /// Marketing spend, ROI by territory and a budget-change scenario
    Marketing {
        /// Change to the whole marketing budget, in percent
        #[arg(long, allow_hyphen_values = true)]
        change: Option<f64>,
        /// Revenue per extra £1 of marketing
        #[arg(long, default_value_t = budget_planner::marketing::DEFAULT_ASSUMED_ROI)]
        roi: f64,
        /// Also write the monthly spend as CSV
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Project DTC revenue under traffic, conversion and AOV changes
    Dtc {
        territory: String,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        traffic: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        conversion: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        aov: f64,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// Interactive terminal viewer
    Tui {
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ExportTarget {
    /// Re-write the workbook sheets in their loadable layout
    Workbook { out: PathBuf },
    /// Combined plus per-territory statements and a manifest
    Bundle {
        out: PathBuf,
        /// Territories to include next to the combined statement
        territories: Vec<String>,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
    /// One statement as CSV
    Statement {
        selection: String,
        out: PathBuf,
        #[arg(long = "set", value_name = "NAME=VALUE")]
        adjustments: Vec<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::load(cli.config.as_deref())?;
    let data = load_workbook(&cli.workbook, &config)
        .with_context(|| format!("Failed to load workbook from {}", cli.workbook.display()))?;
    info!(
        months = data.months.len(),
        customers = data.customers.len(),
        fingerprint = %data.fingerprint(),
        "dataset ready"
    );

    match cli.command {
        Command::Pl {
            selection,
            period,
            adjustments,
        } => run_pl(&data, &config, &selection, &period, &adjustments),
        Command::Compare {
            selection,
            period,
            base,
            adjustments,
        } => run_compare(&data, &config, &selection, &period, &base, &adjustments),
        Command::Waterfall {
            selection,
            month,
            adjustments,
        } => run_waterfall(&data, &config, &selection, month.as_deref(), &adjustments),
        Command::Quality { adjustments } => run_quality(&data, &config, &adjustments),
        Command::Reconcile { adjustments } => run_reconcile(&data, &config, &adjustments),
        Command::Export { target } => run_export(&data, &config, target),
        Command::Customers { limit } => run_customers(&data, limit),
        Command::B2b {
            regions,
            search,
            min_revenue,
        } => run_b2b(&data, &regions, search, min_revenue),
        Command::Marketing {
            change,
            roi,
            out,
            adjustments,
        } => run_marketing(&data, &config, change, roi, out.as_deref(), &adjustments),
        Command::Dtc {
            territory,
            traffic,
            conversion,
            aov,
            adjustments,
        } => {
            let adjustment = DriverAdjustment {
                traffic_pct: traffic,
                conversion_pct: conversion,
                aov_pct: aov,
            };
            run_dtc(&data, &config, &territory, adjustment, &adjustments)
        }
        Command::Tui { adjustments } => run_tui(data, config, &adjustments),
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn scenario(adjustments: &[String]) -> Result<Scenario> {
    Scenario::from_assignments(adjustments).context("Invalid scenario adjustment")
}

fn period(raw: &str) -> Result<Period> {
    match Period::parse(raw) {
        Some(p) => Ok(p),
        None => bail!("Unknown period '{}' (expected monthly, quarterly or annual)", raw),
    }
}

fn selection(raw: &str) -> Result<Selection> {
    if raw.trim().is_empty() {
        bail!("Selection is empty (expected 'combined' or a territory)");
    }
    Ok(Selection::parse(raw, &TerritoryRegistry::new()))
}

fn calculator<'a>(data: &'a BudgetData, scenario: &'a Scenario, config: &AppConfig) -> PlCalculator<'a> {
    PlCalculator::new(data, scenario).with_default_fulfilment_rate(config.model.default_fulfilment_rate)
}

fn print_table(title: &str, table: &PeriodTable) {
    println!("\n{}", title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    print!("{:<24}", "");
    for period in &table.periods {
        print!("{:>14}", period);
    }
    println!();

    for row in &table.rows {
        print!("{:<24}", row.line);
        for value in &row.values {
            print!("{:>14}", format_currency(*value));
        }
        println!();
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_pl(data: &BudgetData, config: &AppConfig, selection: &str, raw_period: &str, adjustments: &[String]) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let period = period(raw_period)?;
    let selection = self::selection(selection)?;

    let statement = calculator(data, &scenario, config).pl(&selection);
    let table = statement.rollup(period, config.model.fiscal_year_start_month);
    print_table(&format!("📊 {} P&L", selection.label()), &table);
    Ok(())
}

fn run_compare(
    data: &BudgetData,
    config: &AppConfig,
    selection: &str,
    raw_period: &str,
    base: &[String],
    adjustments: &[String],
) -> Result<()> {
    let base = scenario(base)?;
    let new = scenario(adjustments)?;
    let period = period(raw_period)?;
    let selection = self::selection(selection)?;

    let comparison = compare_scenarios(data, &base, &new, &selection, config.model.default_fulfilment_rate);
    let fy_start = config.model.fiscal_year_start_month;
    print_table(&format!("📊 {} P&L - base", selection.label()), &comparison.base.rollup(period, fy_start));
    print_table(&format!("📊 {} P&L - scenario", selection.label()), &comparison.new.rollup(period, fy_start));
    print_table(&format!("📈 {} P&L - difference", selection.label()), &comparison.difference.rollup(period, fy_start));
    Ok(())
}

fn run_waterfall(
    data: &BudgetData,
    config: &AppConfig,
    selection: &str,
    month: Option<&str>,
    adjustments: &[String],
) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let selection = self::selection(selection)?;
    let month = match month {
        Some(raw) => Some(Month::parse(raw).with_context(|| format!("Invalid month '{}'", raw))?),
        None => None,
    };

    let statement = calculator(data, &scenario, config).pl(&selection);
    let waterfall = Waterfall::from_statement(&statement, month);
    let metrics = KeyMetrics::from_statement(&statement, month);

    let scope = month.map(|m| m.to_string()).unwrap_or_else(|| "all months".to_string());
    println!("\n💧 {} waterfall ({})", selection.label(), scope);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for step in &waterfall.steps {
        println!(
            "{:<12}{:>14}  → {}",
            step.label,
            format_currency(step.amount),
            format_currency(step.end)
        );
    }

    println!();
    println!("CM1 margin:    {}", format_percentage(metrics.cm1_pct));
    println!("CM2 margin:    {}", format_percentage(metrics.cm2_pct));
    println!("EBITDA margin: {}", format_percentage(metrics.ebitda_pct));
    println!("CoGS share:    {}", format_percentage(metrics.cogs_pct));
    Ok(())
}

fn run_quality(data: &BudgetData, config: &AppConfig, adjustments: &[String]) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let report = DataQualityEngine::from_config(config).validate(data, &scenario);

    println!("\n🔍 Data quality");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    println!(
        "Revenue: {} (B2B {}, DTC {}, Marketplace {})",
        format_currency(report.total_revenue),
        format_currency(report.b2b_revenue),
        format_currency(report.dtc_revenue),
        format_currency(report.marketplace_revenue)
    );

    for issue in &report.issues {
        let marker = match issue.severity {
            Severity::Critical => "❌",
            Severity::Warning => "⚠️ ",
            Severity::Info => "ℹ️ ",
        };
        println!("{} [{}] {}", marker, issue.field, issue.issue);
        println!("   → {}", issue.recommendation);
    }
    Ok(())
}

fn run_reconcile(data: &BudgetData, config: &AppConfig, adjustments: &[String]) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let calc = calculator(data, &scenario, config);
    let report = ReconciliationEngine::from_config(&config.reconciliation).reconcile(&calc);

    println!("\n⚖️  {}", report.summary());
    for d in &report.discrepancies {
        println!("   {} {}", d.month, d.description);
    }
    if report.is_balanced() {
        println!("✅ Balanced");
    }
    Ok(())
}

fn run_export(data: &BudgetData, config: &AppConfig, target: ExportTarget) -> Result<()> {
    match target {
        ExportTarget::Workbook { out } => {
            let files = export_workbook(data, &out, &config.workbook)?;
            println!("✓ Wrote {} sheets to {}", files.len(), out.display());
        }
        ExportTarget::Bundle {
            out,
            territories,
            adjustments,
        } => {
            let scenario = scenario(&adjustments)?;
            let selections = territories
                .iter()
                .map(|t| selection(t))
                .collect::<Result<Vec<Selection>>>()?;
            let calc = calculator(data, &scenario, config);
            let manifest = export_bundle(&calc, data, &scenario, &selections, &out)?;
            println!("✓ Wrote {} statements to {}", manifest.files.len(), out.display());
        }
        ExportTarget::Statement {
            selection,
            out,
            adjustments,
        } => {
            let scenario = scenario(&adjustments)?;
            let selection = self::selection(&selection)?;
            let statement = calculator(data, &scenario, config).pl(&selection);
            write_statement(&out, &statement)?;
            println!("✓ Wrote {} P&L to {}", selection.label(), out.display());
        }
    }
    Ok(())
}

fn write_statement(path: &Path, statement: &budget_planner::PlStatement) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_statement_csv(statement, file)
}

fn run_customers(data: &BudgetData, limit: usize) -> Result<()> {
    println!("\n🏆 Top {} customers", limit);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (i, customer) in top_customers(data, limit).iter().enumerate() {
        println!(
            "{:>3}. {:<32}{:<20}{:>14}",
            i + 1,
            customer.name,
            customer.country,
            format_currency(customer.total_revenue)
        );
    }
    Ok(())
}

fn run_b2b(data: &BudgetData, regions: &[String], search: Option<String>, min_revenue: f64) -> Result<()> {
    let regions = regions
        .iter()
        .map(|r| Region::parse(r).with_context(|| format!("Unknown region '{}' (expected UK, CE, EE or ROW)", r)))
        .collect::<Result<Vec<Region>>>()?;
    let view = b2b_view(
        data,
        &B2bQuery {
            regions,
            search,
            min_revenue,
        },
    );

    println!("\n📦 B2B customers");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for c in &view.customers {
        let region = c.region.map(|r| r.code()).unwrap_or("-");
        println!("{:<32}{:<20}{:<6}{:>14}", c.name, c.country, region, format_currency(c.total_revenue));
    }
    println!();
    println!("Customers:        {}", view.count);
    println!("Total revenue:    {}", format_currency(view.total_revenue));
    println!("Avg per customer: {}", format_currency(view.average_revenue));
    if let Some(top) = &view.top_customer {
        println!("Top customer:     {} ({})", top.name, format_currency(top.total_revenue));
    }
    Ok(())
}

fn run_marketing(
    data: &BudgetData,
    config: &AppConfig,
    change: Option<f64>,
    roi: f64,
    out: Option<&Path>,
    adjustments: &[String],
) -> Result<()> {
    if roi < 0.0 || !roi.is_finite() {
        bail!("ROI must be a non-negative number");
    }
    let scenario = scenario(adjustments)?;
    let report = MarketingReport::build(&calculator(data, &scenario, config), data);
    if report.is_empty() {
        println!("⚠️  No marketing spend found in the DTC sheets or overheads");
        return Ok(());
    }

    println!("\n📣 Marketing");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Total budget:       {} ({:.1}% of revenue)",
        format_currency(report.annual_total),
        report.marketing_pct
    );
    println!("Avg monthly spend:  {}", format_currency(report.average_monthly));
    println!("Revenue per £1:     £{:.2}", report.revenue_per_pound);
    println!("Territories:        {}", report.territories_with_marketing);

    println!();
    for s in &report.spend {
        println!("{:<12}{:<8}{:>14}", s.territory, s.source.label(), format_currency(s.annual));
    }
    if !report.roi.is_empty() {
        println!();
        for r in &report.roi {
            println!(
                "{:<12}£{:.2} per £1  ({} on {})",
                r.territory,
                r.roi,
                format_currency(r.revenue),
                format_currency(r.marketing)
            );
        }
    }

    if let Some(change) = change {
        let outcome = report.scenario(change, roi);
        println!("\n🎯 Budget {:+.0}% at £{:.2} per £1", change, roi);
        println!(
            "Marketing: {} → {}",
            format_currency(outcome.current_marketing),
            format_currency(outcome.new_marketing)
        );
        println!(
            "Revenue:   {} → {} ({})",
            format_currency(outcome.current_revenue),
            format_currency(outcome.new_revenue),
            format_currency(outcome.revenue_impact)
        );
        println!(
            "Share:     {:.1}% → {:.1}% ({:+.1}pp)",
            outcome.current_pct, outcome.new_pct, outcome.pct_change_pp
        );
    }

    if let Some(path) = out {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_marketing_csv(&report, file)?;
        println!("\n✓ Wrote marketing spend to {}", path.display());
    }
    Ok(())
}

fn run_dtc(
    data: &BudgetData,
    config: &AppConfig,
    territory: &str,
    adjustment: DriverAdjustment,
    adjustments: &[String],
) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let calc = calculator(data, &scenario, config);
    let Some(projection) = project_dtc(&calc, data, territory, adjustment) else {
        bail!("No DTC inputs for '{}'", territory);
    };

    println!("\n🛒 {} DTC projection", projection.territory);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for m in &projection.months {
        println!(
            "{:<10}{:>14}  → {:>14}",
            m.month.to_string(),
            format_currency(m.base.revenue),
            format_currency(m.projected.revenue)
        );
    }
    println!();
    println!("Base revenue:      {}", format_currency(projection.base_revenue));
    println!(
        "Projected revenue: {} ({}, {:+.1}%)",
        format_currency(projection.projected_revenue),
        format_currency(projection.change),
        projection.change_pct
    );
    Ok(())
}

#[cfg(feature = "tui")]
fn run_tui(data: BudgetData, config: AppConfig, adjustments: &[String]) -> Result<()> {
    let scenario = scenario(adjustments)?;
    let mut app = budget_planner::ui::App::new(data, config, scenario);
    budget_planner::ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_tui(_data: BudgetData, _config: AppConfig, _adjustments: &[String]) -> Result<()> {
    bail!("This build has no terminal UI; rebuild with --features tui")
}
