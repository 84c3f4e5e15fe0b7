// Budget Planner - Web Server
// JSON API over one in-memory workbook

use anyhow::{Context, Result};
use budget_planner::api::{router, AppState};
use budget_planner::{load_workbook, AppConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Workbook directory used when no argument is given
const WORKBOOK_ENV: &str = "BUDGET_PLANNER_WORKBOOK";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    println!("🌐 Budget Planner - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load(None)?;
    let workbook = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(WORKBOOK_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));

    let data = load_workbook(&workbook, &config)
        .with_context(|| format!("Failed to load workbook from {}", workbook.display()))?;
    println!("✓ Workbook loaded: {} ({} months)", workbook.display(), data.months.len());

    let addr = config.server.bind.clone();
    let app = router(AppState::new(data, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/pl/combined", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
