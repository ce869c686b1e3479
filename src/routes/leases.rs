use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::models::{Invoice, Lease, LeaseStatus};
use crate::schemas::{
    clamp_limit_in_range, validate_input, CreateLeaseInput, ExpiringLeasesQuery, LeasesQuery,
    RenewLeaseInput, UpdateLeaseInput,
};
use crate::services::dashboard::expiring_leases;
use crate::services::lease_lifecycle::{self, LeaseTerms};
use crate::services::notifier::{self, NotificationEvent};
use crate::services::ownership::lease_for_owner;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/leases", axum::routing::get(list_leases).post(create_lease))
        .route("/leases/expiring", axum::routing::get(get_expiring_leases))
        .route(
            "/leases/{lease_id}",
            axum::routing::get(get_lease).patch(update_lease),
        )
        .route(
            "/leases/{lease_id}/terminate",
            axum::routing::post(terminate_lease),
        )
        .route("/leases/{lease_id}/renew", axum::routing::post(renew_lease))
}

#[derive(Debug, Clone, serde::Serialize)]
struct LeaseListItem {
    id: Uuid,
    unit_id: Uuid,
    tenant_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    monthly_rent: Decimal,
    payment_day: i16,
    status: LeaseStatus,
    tenant_name: String,
    unit_number: String,
    property_name: String,
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<LeasesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let rows = sqlx::query_as::<
        _,
        (
            Uuid,
            Uuid,
            Uuid,
            NaiveDate,
            NaiveDate,
            Decimal,
            i16,
            LeaseStatus,
            String,
            String,
            String,
        ),
    >(
        "SELECT l.id, l.unit_id, l.tenant_id, l.start_date, l.end_date, l.monthly_rent,
                l.payment_day, l.status, t.full_name, u.unit_number, p.name
         FROM leases l
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
           AND ($2::lease_status IS NULL OR l.status = $2)
         ORDER BY l.created_at DESC
         LIMIT $3",
    )
    .bind(user_id)
    .bind(query.status)
    .bind(clamp_limit_in_range(query.limit, 1, 1000))
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let leases = rows
        .into_iter()
        .map(
            |(
                id,
                unit_id,
                tenant_id,
                start_date,
                end_date,
                monthly_rent,
                payment_day,
                status,
                tenant_name,
                unit_number,
                property_name,
            )| LeaseListItem {
                id,
                unit_id,
                tenant_id,
                start_date,
                end_date,
                monthly_rent,
                payment_day,
                status,
                tenant_name,
                unit_number,
                property_name,
            },
        )
        .collect::<Vec<_>>();

    Ok(Json(json!({ "data": leases })))
}

async fn create_lease(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateLeaseInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let (lease, first_invoice) = lease_lifecycle::create_lease(
        pool,
        user_id,
        LeaseTerms {
            unit_id: payload.unit_id,
            tenant_id: payload.tenant_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            monthly_rent: payload.monthly_rent,
            security_deposit: payload.security_deposit,
            payment_day: payload.payment_day,
            notes: payload.notes,
        },
    )
    .await?;

    queue_invoice_issued_notice(pool, &lease, &first_invoice).await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "lease": lease,
            "first_invoice": first_invoice,
        })),
    ))
}

async fn get_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let lease = lease_for_owner(pool, user_id, lease_id).await?;

    let invoices = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE lease_id = $1 ORDER BY due_date DESC",
    )
    .bind(lease_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(json!({
        "lease": lease,
        "invoices": invoices,
    })))
}

async fn update_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateLeaseInput>,
) -> AppResult<Json<Lease>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let lease = lease_for_owner(pool, user_id, lease_id).await?;

    if let Some(rent) = payload.monthly_rent {
        if rent <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Monthly rent must be positive.".to_string(),
            ));
        }
    }
    if let Some(end_date) = payload.end_date {
        if end_date < lease.start_date {
            return Err(AppError::Validation(
                "Lease end date must be on or after the start date.".to_string(),
            ));
        }
    }

    let mut updated = sqlx::query_as::<_, Lease>(
        "UPDATE leases
         SET end_date = COALESCE($1, end_date),
             monthly_rent = COALESCE($2, monthly_rent),
             payment_day = COALESCE($3, payment_day),
             notes = COALESCE($4, notes),
             updated_at = now()
         WHERE id = $5
         RETURNING *",
    )
    .bind(payload.end_date)
    .bind(payload.monthly_rent)
    .bind(payload.payment_day)
    .bind(&payload.notes)
    .bind(lease_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    // Status changes go through the lifecycle so the occupancy cascade
    // and single-active-lease check apply.
    if let Some(new_status) = payload.status {
        updated = lease_lifecycle::change_status(pool, user_id, lease_id, new_status).await?;
    }

    Ok(Json(updated))
}

async fn terminate_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let lease = lease_lifecycle::terminate(pool, user_id, lease_id).await?;

    Ok(Json(json!({
        "message": "Lease terminated.",
        "lease": lease,
    })))
}

async fn renew_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RenewLeaseInput>,
) -> AppResult<Json<Lease>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let lease = lease_lifecycle::renew(
        pool,
        user_id,
        lease_id,
        payload.new_end_date,
        payload.new_rent,
    )
    .await?;

    Ok(Json(lease))
}

async fn get_expiring_leases(
    State(state): State<AppState>,
    Query(query): Query<ExpiringLeasesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let leases = expiring_leases(pool, user_id, query.days.unwrap_or(30), today).await?;

    Ok(Json(json!({ "data": leases })))
}

async fn queue_invoice_issued_notice(pool: &sqlx::PgPool, lease: &Lease, invoice: &Invoice) {
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT full_name, email FROM tenants WHERE id = $1",
    )
    .bind(lease.tenant_id)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten();

    let Some((tenant_name, Some(recipient))) = row else {
        return;
    };
    notifier::enqueue(
        pool,
        &recipient,
        &NotificationEvent::InvoiceIssued {
            tenant_name: &tenant_name,
            amount: invoice.amount,
            due_date: invoice.due_date,
        },
        Some(lease.id),
        Some(invoice.id),
    )
    .await;
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
