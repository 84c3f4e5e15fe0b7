// 🌐 REST API with Axum
//
// Every response is wrapped as {success, data, error}. Responses computed
// from the budget carry the dataset fingerprint as their ETag.

use crate::config::AppConfig;
use crate::dashboard::{b2b_view, top_customers, B2bQuery, DashboardSummary};
use crate::data_quality::DataQualityEngine;
use crate::dtc::{project_dtc, DriverAdjustment};
use crate::error::{EditError, ScenarioError};
use crate::export::{
    marketing_to_csv_string, period_table_to_csv_string, statement_file_name, statement_to_csv_string,
};
use crate::marketing::{MarketingReport, MarketingScenario, DEFAULT_ASSUMED_ROI};
use crate::model::{BudgetData, Channel, DtcMetric, Month};
use crate::pl::{compare_scenarios, PeriodTable, PlCalculator, Period, Selection};
use crate::reconciliation::ReconciliationEngine;
use crate::scenario::{Scenario, ScenarioLibrary};
use crate::territory::{Region, TerritoryRegistry};
use crate::waterfall::{KeyMetrics, Waterfall};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Query keys that are not scenario adjustments
const RESERVED_KEYS: &[&str] = &[
    "period",
    "month",
    "selection",
    "limit",
    "change",
    "roi",
    "traffic",
    "conversion",
    "aov",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    data: Arc<Mutex<BudgetData>>,
    scenarios: Arc<Mutex<ScenarioLibrary>>,
    config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(data: BudgetData, config: AppConfig) -> Self {
        AppState {
            data: Arc::new(Mutex::new(data)),
            scenarios: Arc::new(Mutex::new(ScenarioLibrary::new())),
            config: Arc::new(config),
        }
    }

    // Edits are single assignments, so a poisoned lock still guards
    // consistent data
    fn data(&self) -> MutexGuard<'_, BudgetData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scenarios(&self) -> MutexGuard<'_, ScenarioLibrary> {
        self.scenarios.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    warn!(status = status.as_u16(), error = %message, "request failed");
    (status, Json(ApiResponse::err(message))).into_response()
}

fn with_etag(mut response: Response, fingerprint: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", fingerprint)) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

fn scenario_from_query(query: &BTreeMap<String, String>) -> Result<Scenario, ScenarioError> {
    let mut pairs = Vec::new();
    for (name, raw) in query {
        if RESERVED_KEYS.contains(&name.as_str()) {
            continue;
        }
        let value: f64 = raw.trim().parse().map_err(|_| ScenarioError::InvalidValue {
            name: name.clone(),
            value: raw.clone(),
        })?;
        pairs.push((name.as_str(), value));
    }
    Scenario::from_pairs(pairs)
}

fn scenario_from_map(map: BTreeMap<String, f64>) -> Result<Scenario, ScenarioError> {
    Scenario::try_from(map)
}

fn parse_period(query: &BTreeMap<String, String>) -> Result<Period, String> {
    match query.get("period") {
        None => Ok(Period::Monthly),
        Some(raw) => Period::parse(raw).ok_or_else(|| format!("unknown period '{}'", raw)),
    }
}

/// Path and query extractors have already percent-decoded `raw`
fn parse_selection(raw: &str) -> Result<Selection, Response> {
    if raw.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "selection is empty"));
    }
    Ok(Selection::parse(raw, &TerritoryRegistry::new()))
}

/// Optional finite number from the query string
fn query_number(query: &BTreeMap<String, String>, key: &str) -> Result<Option<f64>, Response> {
    match query.get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(fail(
                StatusCode::BAD_REQUEST,
                format!("{} must be a number, got '{}'", key, raw),
            )),
        },
    }
}

/// `attachment` with an ASCII-safe name and the exact name percent-encoded
fn attachment(file_name: &str, exact_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        file_name,
        urlencoding::encode(exact_name)
    )
}

fn calculator<'a>(data: &'a BudgetData, scenario: &'a Scenario, config: &AppConfig) -> PlCalculator<'a> {
    PlCalculator::new(data, scenario).with_default_fulfilment_rate(config.model.default_fulfilment_rate)
}

fn edit_failure(err: EditError) -> Response {
    let status = match err {
        EditError::UnknownCustomer(_) | EditError::UnknownOverheadRow(_) | EditError::UnknownTerritory(_) => {
            StatusCode::NOT_FOUND
        }
        EditError::UnknownMonth(_) | EditError::NotFinite(_) => StatusCode::BAD_REQUEST,
    };
    fail(status, err.to_string())
}

fn parse_month(raw: &str) -> Result<Month, Response> {
    Month::parse(raw).ok_or_else(|| fail(StatusCode::BAD_REQUEST, format!("invalid month '{}'", raw)))
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct TerritoryResponse {
    code: &'static str,
    country_name: &'static str,
    region: Region,
    has_dtc: bool,
}

#[derive(Serialize)]
struct PlResponse {
    selection: String,
    period: Period,
    scenario: Scenario,
    table: PeriodTable,
}

#[derive(Serialize)]
struct WaterfallResponse {
    selection: String,
    waterfall: Waterfall,
    metrics: KeyMetrics,
}

#[derive(Serialize)]
struct MarketingResponse {
    report: MarketingReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<MarketingScenario>,
}

#[derive(Serialize)]
struct EditResponse {
    fingerprint: String,
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct ScenarioRequest {
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub base: BTreeMap<String, f64>,
    #[serde(default)]
    pub scenario: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
pub struct SaveScenarioRequest {
    pub name: String,
    #[serde(default)]
    pub scenario: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
pub struct CustomerEdit {
    pub name: String,
    pub month: String,
    pub value: f64,
}

#[derive(Deserialize)]
pub struct OverheadEdit {
    pub index: usize,
    pub month: String,
    pub value: f64,
}

#[derive(Deserialize)]
pub struct DtcEdit {
    pub territory: String,
    pub metric: String,
    pub month: String,
    pub value: f64,
}

#[derive(Deserialize)]
pub struct FulfilmentEdit {
    pub country: String,
    pub channel: String,
    pub rate: f64,
}

#[derive(Deserialize)]
pub struct CogsEdit {
    pub channel: String,
    pub rate: f64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/territories - Territories with their region and DTC coverage
async fn get_territories(State(state): State<AppState>) -> Response {
    let data = state.data();
    let registry = TerritoryRegistry::new();
    let territories: Vec<TerritoryResponse> = registry
        .all()
        .iter()
        .map(|t| TerritoryResponse {
            code: t.code,
            country_name: t.country_name,
            region: t.region,
            has_dtc: data.dtc.contains_key(t.code),
        })
        .collect();
    ok(territories)
}

/// GET /api/pl/:selection?period=quarterly&b2b_growth=10 - P&L for a selection
async fn get_pl(
    State(state): State<AppState>,
    Path(selection): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let period = match parse_period(&query) {
        Ok(p) => p,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e),
    };
    let scenario = match scenario_from_query(&query) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let selection = match parse_selection(&selection) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let data = state.data();
    let statement = calculator(&data, &scenario, &state.config).pl(&selection);
    let table = statement.rollup(period, state.config.model.fiscal_year_start_month);

    let response = ok(PlResponse {
        selection: selection.label().to_string(),
        period,
        scenario,
        table,
    });
    with_etag(response, &data.fingerprint())
}

/// POST /api/scenario - Compare a scenario against a base (default: baseline)
async fn post_scenario(State(state): State<AppState>, Json(request): Json<ScenarioRequest>) -> Response {
    let base = match scenario_from_map(request.base) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let new = match scenario_from_map(request.scenario) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let selection = match request.selection.as_deref().map(parse_selection).transpose() {
        Ok(s) => s.unwrap_or(Selection::Combined),
        Err(response) => return response,
    };

    let data = state.data();
    let comparison = compare_scenarios(
        &data,
        &base,
        &new,
        &selection,
        state.config.model.default_fulfilment_rate,
    );
    with_etag(ok(comparison), &data.fingerprint())
}

/// GET /api/scenarios - Saved scenarios
async fn list_scenarios(State(state): State<AppState>) -> Response {
    let library = state.scenarios();
    ok(library.list().to_vec())
}

/// POST /api/scenarios - Save a named scenario
async fn save_scenario(State(state): State<AppState>, Json(request): Json<SaveScenarioRequest>) -> Response {
    if request.name.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "scenario name is empty");
    }
    let scenario = match scenario_from_map(request.scenario) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let mut library = state.scenarios();
    let saved = library.save(request.name.trim(), scenario).clone();
    info!(name = %saved.name, id = %saved.id, "scenario saved");
    (StatusCode::CREATED, Json(ApiResponse::ok(saved))).into_response()
}

/// GET /api/waterfall?selection=UK&month=2026-04 - Margin waterfall and KPIs
async fn get_waterfall(State(state): State<AppState>, Query(query): Query<BTreeMap<String, String>>) -> Response {
    let scenario = match scenario_from_query(&query) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let month = match query.get("month").map(|m| parse_month(m)).transpose() {
        Ok(m) => m,
        Err(response) => return response,
    };
    let selection = match query.get("selection").map(|s| parse_selection(s)).transpose() {
        Ok(s) => s.unwrap_or(Selection::Combined),
        Err(response) => return response,
    };

    let data = state.data();
    let statement = calculator(&data, &scenario, &state.config).pl(&selection);
    let response = ok(WaterfallResponse {
        selection: selection.label().to_string(),
        waterfall: Waterfall::from_statement(&statement, month),
        metrics: KeyMetrics::from_statement(&statement, month),
    });
    with_etag(response, &data.fingerprint())
}

/// GET /api/quality - Data quality report
async fn get_quality(State(state): State<AppState>) -> Response {
    let data = state.data();
    let report = DataQualityEngine::from_config(&state.config).validate(&data, &Scenario::baseline());
    with_etag(ok(report), &data.fingerprint())
}

/// GET /api/reconciliation - Revenue reconciliation of the combined P&L
async fn get_reconciliation(State(state): State<AppState>) -> Response {
    let data = state.data();
    let scenario = Scenario::baseline();
    let calc = calculator(&data, &scenario, &state.config);
    let report = ReconciliationEngine::from_config(&state.config.reconciliation).reconcile(&calc);
    with_etag(ok(report), &data.fingerprint())
}

/// GET /api/dashboard - Headline figures
async fn get_dashboard(State(state): State<AppState>) -> Response {
    let data = state.data();
    let scenario = Scenario::baseline();
    let calc = calculator(&data, &scenario, &state.config);
    let summary = DashboardSummary::build(&calc, &data);
    with_etag(ok(summary), &data.fingerprint())
}

/// GET /api/customers/top?limit=10 - Largest B2B customers
async fn get_top_customers(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let limit = match query.get("limit").map(|l| l.parse::<usize>()) {
        None => 10,
        Some(Ok(limit)) => limit,
        Some(Err(_)) => return fail(StatusCode::BAD_REQUEST, "limit must be a positive integer"),
    };
    let data = state.data();
    with_etag(ok(top_customers(&data, limit)), &data.fingerprint())
}

/// PUT /api/edit/customer - Set one month of a B2B customer
async fn edit_customer(State(state): State<AppState>, Json(edit): Json<CustomerEdit>) -> Response {
    let month = match parse_month(&edit.month) {
        Ok(m) => m,
        Err(response) => return response,
    };
    let mut data = state.data();
    match data.set_customer_value(&edit.name, month, edit.value) {
        Ok(()) => {
            info!(customer = %edit.name, month = %month, value = edit.value, "customer edited");
            edited(&data)
        }
        Err(e) => edit_failure(e),
    }
}

/// PUT /api/edit/overhead - Set one month of an overhead row
async fn edit_overhead(State(state): State<AppState>, Json(edit): Json<OverheadEdit>) -> Response {
    let month = match parse_month(&edit.month) {
        Ok(m) => m,
        Err(response) => return response,
    };
    let mut data = state.data();
    match data.set_overhead_value(edit.index, month, edit.value) {
        Ok(()) => {
            info!(row = edit.index, month = %month, value = edit.value, "overhead edited");
            edited(&data)
        }
        Err(e) => edit_failure(e),
    }
}

/// PUT /api/edit/dtc - Set one month of a DTC input
async fn edit_dtc(State(state): State<AppState>, Json(edit): Json<DtcEdit>) -> Response {
    let month = match parse_month(&edit.month) {
        Ok(m) => m,
        Err(response) => return response,
    };
    let Some(metric) = DtcMetric::parse(&edit.metric) else {
        return fail(StatusCode::BAD_REQUEST, format!("unknown DTC metric '{}'", edit.metric));
    };
    let territory = TerritoryRegistry::new()
        .canonical_code(&edit.territory)
        .map(|c| c.to_string())
        .unwrap_or(edit.territory);

    let mut data = state.data();
    match data.set_dtc_value(&territory, metric, month, edit.value) {
        Ok(()) => edited(&data),
        Err(e) => edit_failure(e),
    }
}

/// PUT /api/edit/fulfilment - Set a territory/channel fulfilment rate
async fn edit_fulfilment(State(state): State<AppState>, Json(edit): Json<FulfilmentEdit>) -> Response {
    let Some(channel) = Channel::parse(&edit.channel) else {
        return fail(StatusCode::BAD_REQUEST, format!("unknown channel '{}'", edit.channel));
    };
    let mut data = state.data();
    match data.set_fulfilment_rate(&edit.country, channel, edit.rate) {
        Ok(()) => edited(&data),
        Err(e) => edit_failure(e),
    }
}

/// PUT /api/edit/cogs - Set a channel CoGS rate
async fn edit_cogs(State(state): State<AppState>, Json(edit): Json<CogsEdit>) -> Response {
    let Some(channel) = Channel::parse(&edit.channel) else {
        return fail(StatusCode::BAD_REQUEST, format!("unknown channel '{}'", edit.channel));
    };
    let mut data = state.data();
    match data.set_cogs_rate(channel, edit.rate) {
        Ok(()) => edited(&data),
        Err(e) => edit_failure(e),
    }
}

fn edited(data: &BudgetData) -> Response {
    let fingerprint = data.fingerprint();
    with_etag(ok(EditResponse { fingerprint: fingerprint.clone() }), &fingerprint)
}

/// GET /api/export/:selection?period=annual - P&L as CSV
async fn export_csv(
    State(state): State<AppState>,
    Path(selection): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let period = match parse_period(&query) {
        Ok(p) => p,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e),
    };
    let scenario = match scenario_from_query(&query) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let selection = match parse_selection(&selection) {
        Ok(s) => s,
        Err(response) => return response,
    };

    let data = state.data();
    let statement = calculator(&data, &scenario, &state.config).pl(&selection);
    let csv = match period {
        Period::Monthly => statement_to_csv_string(&statement),
        _ => period_table_to_csv_string(&statement.rollup(period, state.config.model.fiscal_year_start_month)),
    };

    match csv {
        Ok(body) => {
            let disposition = attachment(
                &statement_file_name(&selection),
                &format!("pl_{}.csv", selection.label()),
            );
            let response = (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response();
            with_etag(response, &data.fingerprint())
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/marketing?change=10&roi=3 - Marketing spend, ROI and an optional
/// budget-change scenario
async fn get_marketing(State(state): State<AppState>, Query(query): Query<BTreeMap<String, String>>) -> Response {
    let scenario = match scenario_from_query(&query) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let (change, roi) = match (query_number(&query, "change"), query_number(&query, "roi")) {
        (Ok(change), Ok(roi)) => (change, roi.unwrap_or(DEFAULT_ASSUMED_ROI)),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    if roi < 0.0 {
        return fail(StatusCode::BAD_REQUEST, "roi must not be negative");
    }

    let data = state.data();
    let report = MarketingReport::build(&calculator(&data, &scenario, &state.config), &data);
    let response = ok(MarketingResponse {
        scenario: change.map(|c| report.scenario(c, roi)),
        report,
    });
    with_etag(response, &data.fingerprint())
}

/// GET /api/marketing/export - Marketing spend as CSV
async fn export_marketing(State(state): State<AppState>) -> Response {
    let data = state.data();
    let scenario = Scenario::baseline();
    let report = MarketingReport::build(&calculator(&data, &scenario, &state.config), &data);

    match marketing_to_csv_string(&report) {
        Ok(body) => {
            let name = "marketing_budget_data.csv";
            let response = (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, attachment(name, name)),
                ],
                body,
            )
                .into_response();
            with_etag(response, &data.fingerprint())
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/b2b?regions=UK,CE&search=acme&min_revenue=1000 - Filtered B2B
/// customers with summary figures
async fn get_b2b(State(state): State<AppState>, Query(query): Query<BTreeMap<String, String>>) -> Response {
    let mut regions = Vec::new();
    for raw in query.get("regions").map(|r| r.split(',')).into_iter().flatten() {
        if raw.trim().is_empty() {
            continue;
        }
        match Region::parse(raw) {
            Some(region) => regions.push(region),
            None => return fail(StatusCode::BAD_REQUEST, format!("unknown region '{}'", raw.trim())),
        }
    }
    let min_revenue = match query_number(&query, "min_revenue") {
        Ok(v) => v.unwrap_or(0.0),
        Err(response) => return response,
    };
    let b2b_query = B2bQuery {
        regions,
        search: query.get("search").cloned(),
        min_revenue,
    };

    let data = state.data();
    with_etag(ok(b2b_view(&data, &b2b_query)), &data.fingerprint())
}

/// GET /api/dtc/:territory/projection?traffic=10&conversion=5&aov=-3 -
/// DTC revenue under driver changes
async fn get_dtc_projection(
    State(state): State<AppState>,
    Path(territory): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let scenario = match scenario_from_query(&query) {
        Ok(s) => s,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let mut adjustment = DriverAdjustment::default();
    for (key, slot) in [
        ("traffic", &mut adjustment.traffic_pct),
        ("conversion", &mut adjustment.conversion_pct),
        ("aov", &mut adjustment.aov_pct),
    ] {
        match query_number(&query, key) {
            Ok(v) => *slot = v.unwrap_or(0.0),
            Err(response) => return response,
        }
    }

    let data = state.data();
    let calc = calculator(&data, &scenario, &state.config);
    match project_dtc(&calc, &data, &territory, adjustment) {
        Some(projection) => with_etag(ok(projection), &data.fingerprint()),
        None => fail(StatusCode::NOT_FOUND, format!("no DTC inputs for '{}'", territory)),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/territories", get(get_territories))
        .route("/pl/:selection", get(get_pl))
        .route("/scenario", post(post_scenario))
        .route("/scenarios", get(list_scenarios).post(save_scenario))
        .route("/waterfall", get(get_waterfall))
        .route("/quality", get(get_quality))
        .route("/reconciliation", get(get_reconciliation))
        .route("/dashboard", get(get_dashboard))
        .route("/customers/top", get(get_top_customers))
        .route("/b2b", get(get_b2b))
        .route("/marketing", get(get_marketing))
        .route("/marketing/export", get(export_marketing))
        .route("/dtc/:territory/projection", get(get_dtc_projection))
        .route("/edit/customer", put(edit_customer))
        .route("/edit/overhead", put(edit_overhead))
        .route("/edit/dtc", put(edit_dtc))
        .route("/edit/fulfilment", put(edit_fulfilment))
        .route("/edit/cogs", put(edit_cogs))
        .route("/export/:selection", get(export_csv))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
