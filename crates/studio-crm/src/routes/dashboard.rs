//! Dashboard aggregates. Nothing here is cached; each request reads the
//! current rows and derives the numbers from them.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use studio_finance::{DashboardStats, MonthlyRevenue, YearSelection};
use tracing::debug;

use crate::error::AppResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard/stats", get(stats))
        .route("/dashboard/monthly-revenue", get(monthly_revenue))
}

/// `year` stays a raw string so a malformed value falls back instead of
/// failing the request
#[derive(Debug, Deserialize)]
struct RevenueQuery {
    year: Option<String>,
}

async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Json<DashboardStats>> {
    let total_clients = state.db.count_clients().await?;
    let projects = state.db.all_projects().await?;
    let payments = state.db.list_payments(None).await?;

    let stats = studio_finance::dashboard_stats(
        total_clients.max(0) as u64,
        &projects,
        &payments,
        Utc::now().date_naive(),
    );

    Ok(Json(stats))
}

async fn monthly_revenue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RevenueQuery>,
) -> AppResult<Json<Vec<MonthlyRevenue>>> {
    let payments = state.db.list_payments(None).await?;

    let selection = YearSelection::from_query(query.year.as_deref());
    let year = studio_finance::resolve_year(selection, &payments, Utc::now().date_naive());
    debug!(?selection, year, "Computing monthly revenue");

    Ok(Json(studio_finance::monthly_revenue(year, &payments)))
}
