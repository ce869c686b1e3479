use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Datelike, Utc};
use serde_json::{json, Value};

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::schemas::{ExpiringLeasesQuery, PeriodQuery, TopPropertiesQuery};
use crate::services::advisor::{self, FinancialSnapshot};
use crate::services::dashboard;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/dashboard/overview", axum::routing::get(get_overview))
        .route("/dashboard/financial", axum::routing::get(get_financial))
        .route(
            "/dashboard/monthly-revenue",
            axum::routing::get(get_monthly_revenue),
        )
        .route(
            "/dashboard/top-properties",
            axum::routing::get(get_top_properties),
        )
        .route(
            "/dashboard/expiring-leases",
            axum::routing::get(get_expiring_leases),
        )
        .route(
            "/dashboard/overdue-invoices",
            axum::routing::get(get_overdue_invoices),
        )
        .route(
            "/dashboard/revenue-per-property",
            axum::routing::get(get_revenue_per_property),
        )
        .route(
            "/dashboard/expenses-breakdown",
            axum::routing::get(get_expenses_breakdown),
        )
        .route(
            "/dashboard/recent-activity",
            axum::routing::get(get_recent_activity),
        )
        .route("/dashboard/ai-analysis", axum::routing::get(get_ai_analysis))
}

fn current_period(query: &PeriodQuery) -> (i32, u32) {
    let today = Utc::now().date_naive();
    (
        query.year.unwrap_or_else(|| today.year()),
        query.month.unwrap_or_else(|| today.month()),
    )
}

async fn get_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let overview = dashboard::overview(pool, user_id).await?;
    Ok(Json(json!(overview)))
}

async fn get_financial(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let (year, month) = current_period(&query);
    let stats = dashboard::financial_stats(pool, user_id, year, month, today).await?;
    Ok(Json(json!(stats)))
}

async fn get_monthly_revenue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let points = dashboard::monthly_revenue(pool, user_id, today).await?;
    Ok(Json(json!({ "data": points })))
}

async fn get_top_properties(
    State(state): State<AppState>,
    Query(query): Query<TopPropertiesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let properties = dashboard::top_properties(pool, user_id, query.limit.unwrap_or(5)).await?;
    Ok(Json(json!({ "data": properties })))
}

async fn get_expiring_leases(
    State(state): State<AppState>,
    Query(query): Query<ExpiringLeasesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let leases =
        dashboard::expiring_leases(pool, user_id, query.days.unwrap_or(30), today).await?;
    Ok(Json(json!({ "data": leases })))
}

async fn get_overdue_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let invoices = dashboard::overdue_invoices(pool, user_id, today).await?;
    Ok(Json(json!({ "data": invoices })))
}

async fn get_revenue_per_property(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let (year, month) = current_period(&query);
    let revenue = dashboard::revenue_per_property(pool, user_id, year, month).await?;
    Ok(Json(json!({ "data": revenue })))
}

async fn get_expenses_breakdown(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let (year, month) = current_period(&query);
    let breakdown = dashboard::expenses_breakdown(pool, user_id, year, month).await?;
    Ok(Json(json!(breakdown)))
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RecentActivityQuery {
    limit: Option<i64>,
}

async fn get_recent_activity(
    State(state): State<AppState>,
    Query(query): Query<RecentActivityQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let activities =
        dashboard::recent_activity(pool, user_id, query.limit.unwrap_or(10)).await?;
    Ok(Json(json!({ "data": activities })))
}

/// Advisory read: assembles a financial snapshot and asks the external
/// text generator for recommendations. Always answers; the generator
/// degrades to a fallback message on failure.
async fn get_ai_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let overview = dashboard::overview(pool, user_id).await?;
    let stats =
        dashboard::financial_stats(pool, user_id, today.year(), today.month(), today).await?;

    let snapshot = FinancialSnapshot {
        collected_income: stats.collected_income,
        total_expenses: stats.total_expenses,
        occupancy_rate: overview.occupancy_rate,
        overdue_amount: stats.overdue_amount,
    };

    let analysis = advisor::generate_analysis(&state.http_client, &state.config, &snapshot).await;

    Ok(Json(json!({ "analysis": analysis })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
