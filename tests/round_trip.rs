// Load → calculate → export → reload over a small hand-written workbook

use budget_planner::{
    export_workbook, load_workbook, read_statement_csv, write_statement_csv, AppConfig, Channel,
    MarketplaceRow, Month, PlCalculator, PlCategory, ReconciliationEngine, Scenario, Selection,
    Series, TerritoryRegistry,
};
use std::fs;
use std::path::Path;

const B2B: &str = "\
Budget FY27,,,,,,,
,,,,,,,
,,,,,,,
,,,,,,,
,,,,,,,
Customer Name,Country,Country Group,Customer Margin,Last Year Revenue,2026-04,2026-05,2026-06
Acme,United Kingdom,UK,0.3,9000,1000,1000,1000
Bolt,Spain,CE,0.2,0,500,500,500
";

const OVERHEADS: &str = "\
Overheads,,,,,,,
Territory,Function,Category,Group,Supplier,2026-04,2026-05,2026-06
UK,Marketing,Paid Social,Opex,Meta,-300,-300,-300
Group,Finance,Audit,Opex,Auditor,-100,-100,-100
";

const FULFILMENT: &str = "\
Country,Category,Fulfilment %
UK,DTC,-0.10
UK,B2B,-0.05
";

const AMAZON: &str = "\
Amazon,,,
Territory,2026-04,2026-05,2026-06
UK,0.6,0.6,0.6
Territory £,,,
UK,400,400,400
";

fn dtc_sheet() -> String {
    let mut rows = vec![vec![String::new(); 8]; 36];
    for (i, month) in ["2026-04", "2026-05", "2026-06"].iter().enumerate() {
        rows[1][4 + i] = month.to_string();
        rows[24][4 + i] = "2000".to_string();
        rows[3][4 + i] = "50000".to_string();
    }
    rows[24][0] = "Total Revenue".to_string();
    rows.iter().map(|r| r.join(",")).collect::<Vec<_>>().join("\n")
}

fn cogs_sheet() -> String {
    let mut rows = vec![vec![String::new(); 4]; 18];
    rows[15][2] = "0.25".to_string();
    rows[16][2] = "0.3".to_string();
    rows[17][2] = "0.2".to_string();
    rows.iter().map(|r| r.join(",")).collect::<Vec<_>>().join("\n")
}

fn write_fixture(dir: &Path) {
    write_fixture_with(dir, "", "");
}

/// The base fixture with extra B2B and overhead rows appended
fn write_fixture_with(dir: &Path, extra_customers: &str, extra_overheads: &str) {
    fs::write(dir.join("B2B.csv"), format!("{}{}", B2B, extra_customers)).unwrap();
    fs::write(dir.join("Overheads.csv"), format!("{}{}", OVERHEADS, extra_overheads)).unwrap();
    fs::write(dir.join("Fulfilment.csv"), FULFILMENT).unwrap();
    fs::write(dir.join("Amazon.csv"), AMAZON).unwrap();
    fs::write(dir.join("UK.csv"), dtc_sheet()).unwrap();
    fs::write(dir.join("UK P&L.csv"), cogs_sheet()).unwrap();
}

fn april() -> Month {
    Month::new(2026, 4).unwrap()
}

#[test]
fn test_fixture_loads_and_calculates() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let config = AppConfig::default();

    let data = load_workbook(dir.path(), &config).unwrap();
    assert_eq!(data.months.len(), 3);
    assert_eq!(data.customers.len(), 2);
    assert_eq!(data.cogs_rates.get(Channel::B2b), 0.3);

    let scenario = Scenario::baseline();
    let calc = PlCalculator::new(&data, &scenario)
        .with_default_fulfilment_rate(config.model.default_fulfilment_rate);
    let m = april();

    let uk = calc.territory_pl("UK");
    assert_eq!(uk.value(PlCategory::Revenue, "Total Revenue", m), 3400.0);
    assert_eq!(uk.value(PlCategory::CoGS, "Total CoGS", m), -880.0);
    assert_eq!(uk.value(PlCategory::CM1, "Total CM1", m), 2520.0);
    assert_eq!(uk.value(PlCategory::Fulfilment, "Total Fulfilment", m), -310.0);
    assert_eq!(uk.value(PlCategory::CM2, "Total CM2", m), 2210.0);
    assert_eq!(uk.value(PlCategory::Overheads, "Overheads", m), -300.0);
    assert_eq!(uk.value(PlCategory::EBITDA, "EBITDA", m), 1910.0);

    let combined = calc.combined_pl();
    assert_eq!(combined.value(PlCategory::Revenue, "B2B Revenue", m), 1500.0);
    assert_eq!(combined.value(PlCategory::Overheads, "Overheads", m), -400.0);
    assert_eq!(combined.value(PlCategory::EBITDA, "EBITDA", m), 2085.0);
}

#[test]
fn test_channels_sum_to_total_revenue() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();

    let scenario = Scenario::from_assignments(&["dtc_growth=12.5", "b2b_growth=-3", "mp_growth=7"]).unwrap();
    let calc = PlCalculator::new(&data, &scenario);
    let combined = calc.combined_pl();

    for m in &data.months {
        let channels: f64 = Channel::ALL
            .iter()
            .map(|c| combined.value(PlCategory::Revenue, &format!("{} Revenue", c.label()), *m))
            .sum();
        let total = combined.value(PlCategory::Revenue, "Total Revenue", *m);
        assert!((channels - total).abs() < 1e-9);
    }

    let report = ReconciliationEngine::new().reconcile(&calc);
    assert!(report.is_balanced(), "{}", report.summary());
}

#[test]
fn test_zero_scenario_matches_baseline() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();

    let baseline = Scenario::baseline();
    // Growth and change keys at zero, rate overrides at the workbook's own rates
    let zeroed = Scenario::from_assignments(&[
        "dtc_growth=0",
        "dtc_revenue_UK=0",
        "b2b_growth=0",
        "mp_growth=0",
        "cogs_change=0",
        "fulfilment_change=0",
        "overhead_change=0",
        "marketing_change=0",
        "cogs_rate_DTC=0.25",
        "cogs_rate_B2B=0.3",
        "cogs_rate_Marketplace=0.2",
        "fulfilment_rate_UK_DTC=-0.10",
    ])
    .unwrap();

    let a = PlCalculator::new(&data, &baseline).combined_pl();
    let b = PlCalculator::new(&data, &zeroed).combined_pl();
    assert_eq!(a, b);
}

#[test]
fn test_workbook_export_reloads_to_same_pl() {
    let source = tempfile::tempdir().unwrap();
    write_fixture(source.path());
    let config = AppConfig::default();
    let data = load_workbook(source.path(), &config).unwrap();

    let out = tempfile::tempdir().unwrap();
    let files = export_workbook(&data, out.path(), &config.workbook).unwrap();
    assert!(!files.is_empty());
    let reloaded = load_workbook(out.path(), &config).unwrap();

    let scenario = Scenario::baseline();
    for selection in [Selection::Combined, Selection::Territory("UK".to_string())] {
        let before = PlCalculator::new(&data, &scenario).pl(&selection);
        let after = PlCalculator::new(&reloaded, &scenario).pl(&selection);
        assert_eq!(before, after, "{} P&L changed after export", selection.label());
    }
}

#[test]
fn test_statement_csv_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();

    let scenario = Scenario::from_assignments(&["cogs_change=1.5", "fulfilment_change=-2"]).unwrap();
    let statement = PlCalculator::new(&data, &scenario).combined_pl();

    let mut buffer = Vec::new();
    write_statement_csv(&statement, &mut buffer).unwrap();
    let read_back = read_statement_csv(buffer.as_slice()).unwrap();
    assert_eq!(read_back, statement);
}

#[test]
fn test_unknown_territory_is_all_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();

    let scenario = Scenario::baseline();
    let statement = PlCalculator::new(&data, &scenario).territory_pl("Atlantis");
    assert!(statement.is_all_zero());
    assert_eq!(statement.months, data.months);
}

#[test]
fn test_long_marketplace_section_reloads_fully() {
    let source = tempfile::tempdir().unwrap();
    write_fixture(source.path());
    let config = AppConfig::default();
    let mut data = load_workbook(source.path(), &config).unwrap();

    for i in 1..=20 {
        data.marketplace.push(MarketplaceRow {
            territory: format!("Market {}", i),
            values: Series::from_pairs(data.months.iter().map(|m| (*m, i as f64 * 10.0))),
        });
    }
    assert_eq!(data.marketplace.len(), 21);

    let out = tempfile::tempdir().unwrap();
    export_workbook(&data, out.path(), &config.workbook).unwrap();
    let reloaded = load_workbook(out.path(), &config).unwrap();

    assert_eq!(reloaded.marketplace, data.marketplace);
    assert_eq!(reloaded.marketplace[20].territory, "Market 20");
}

#[test]
fn test_credit_rows_flow_through_with_their_sign() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_with(
        dir.path(),
        "Acme Credit,United Kingdom,UK,0,0,-1500,0,0\n",
        "UK,Finance,Rebate,Opex,Landlord,50,50,50\n",
    );
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();
    let scenario = Scenario::baseline();
    let calc = PlCalculator::new(&data, &scenario);
    let uk = calc.territory_pl("UK");
    let m = april();

    // B2B nets to -500 in April: CoGS stays a cost, fulfilment is reversed
    assert_eq!(uk.value(PlCategory::Revenue, "B2B Revenue", m), -500.0);
    assert_eq!(uk.value(PlCategory::CoGS, "B2B CoGS", m), -150.0);
    assert_eq!(uk.value(PlCategory::Fulfilment, "B2B Fulfilment", m), 25.0);
    assert_eq!(uk.value(PlCategory::Overheads, "Overheads", m), -250.0);
    assert_eq!(uk.value(PlCategory::EBITDA, "EBITDA", m), 685.0);

    // Months without the credit note are unchanged
    let may = Month::new(2026, 5).unwrap();
    assert_eq!(uk.value(PlCategory::EBITDA, "EBITDA", may), 1960.0);
}

#[test]
fn test_blank_selection_is_all_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_with(dir.path(), "", ",HR,Payroll,Opex,,-50,-50,-50\n");
    let data = load_workbook(dir.path(), &AppConfig::default()).unwrap();
    let scenario = Scenario::baseline();
    let calc = PlCalculator::new(&data, &scenario);

    let blank = Selection::parse("  ", &TerritoryRegistry::new());
    let statement = calc.pl(&blank);
    assert!(statement.is_all_zero());
    assert_eq!(statement.annual_total(PlCategory::EBITDA, "EBITDA"), 0.0);

    // The unassigned row is a group cost of the combined P&L
    let combined = calc.combined_pl();
    assert_eq!(combined.value(PlCategory::Overheads, "Overheads", april()), -450.0);
}
