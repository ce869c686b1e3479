use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::models::period::month_bounds;
use crate::models::Expense;
use crate::schemas::{clamp_limit_in_range, CreateExpenseInput, ExpensesQuery, UpdateExpenseInput};
use crate::services::ownership::{expense_for_owner, property_for_owner};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense)
                .patch(update_expense)
                .delete(delete_expense),
        )
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ExpensesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let period = match (query.year, query.month) {
        (Some(year), Some(month)) => Some(month_bounds(year, month).ok_or_else(|| {
            AppError::Validation("Invalid year/month period.".to_string())
        })?),
        _ => None,
    };
    let (period_start, period_end) = match period {
        Some((start, end)) => (Some(start), Some(end)),
        None => (None, None),
    };

    let expenses = sqlx::query_as::<_, Expense>(
        "SELECT e.* FROM expenses e
         JOIN properties p ON p.id = e.property_id
         WHERE p.owner_user_id = $1
           AND ($2::uuid IS NULL OR e.property_id = $2)
           AND ($3::date IS NULL OR e.expense_date >= $3)
           AND ($4::date IS NULL OR e.expense_date < $4)
         ORDER BY e.expense_date DESC
         LIMIT $5",
    )
    .bind(user_id)
    .bind(query.property_id)
    .bind(period_start)
    .bind(period_end)
    .bind(clamp_limit_in_range(query.limit, 1, 1000))
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let total: Decimal = expenses.iter().map(|expense| expense.amount).sum();

    Ok(Json(json!({ "data": expenses, "total": total })))
}

async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    if payload.amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Expense amount must be positive.".to_string(),
        ));
    }
    property_for_owner(pool, user_id, payload.property_id).await?;

    let expense = sqlx::query_as::<_, Expense>(
        "INSERT INTO expenses (property_id, category, amount, expense_date, description)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(payload.property_id)
    .bind(payload.category)
    .bind(payload.amount)
    .bind(payload.expense_date)
    .bind(&payload.description)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok((axum::http::StatusCode::CREATED, Json(expense)))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Expense>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let expense = expense_for_owner(pool, user_id, expense_id).await?;
    Ok(Json(expense))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateExpenseInput>,
) -> AppResult<Json<Expense>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    expense_for_owner(pool, user_id, expense_id).await?;

    if let Some(amount) = payload.amount {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Expense amount must be positive.".to_string(),
            ));
        }
    }

    let updated = sqlx::query_as::<_, Expense>(
        "UPDATE expenses
         SET category = COALESCE($1, category),
             amount = COALESCE($2, amount),
             expense_date = COALESCE($3, expense_date),
             description = COALESCE($4, description),
             updated_at = now()
         WHERE id = $5
         RETURNING *",
    )
    .bind(payload.category)
    .bind(payload.amount)
    .bind(payload.expense_date)
    .bind(&payload.description)
    .bind(expense_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let expense = expense_for_owner(pool, user_id, expense_id).await?;

    sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(expense_id)
        .execute(pool)
        .await
        .map_err(AppError::from_db)?;

    Ok(Json(json!({
        "message": "Expense deleted.",
        "expense": expense,
    })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
