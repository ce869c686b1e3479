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
use crate::models::{Invoice, InvoiceStatus};
use crate::schemas::{
    clamp_limit_in_range, CreateInvoiceInput, CreatePaymentInput, InvoicesQuery, UpdateInvoiceInput,
};
use crate::services::dashboard::overdue_invoices;
use crate::services::ledger::{self, InvoiceChanges, NewPayment};
use crate::services::notifier::{self, NotificationEvent};
use crate::services::ownership::invoice_for_owner;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices",
            axum::routing::get(list_invoices).post(create_invoice),
        )
        .route("/invoices/overdue", axum::routing::get(get_overdue_invoices))
        .route(
            "/invoices/{invoice_id}",
            axum::routing::get(get_invoice).patch(update_invoice),
        )
        .route(
            "/invoices/{invoice_id}/cancel",
            axum::routing::post(cancel_invoice),
        )
        .route(
            "/invoices/{invoice_id}/payments",
            axum::routing::get(list_payments).post(record_payment),
        )
}

#[derive(Debug, Clone, serde::Serialize)]
struct InvoiceListItem {
    id: Uuid,
    lease_id: Uuid,
    invoice_number: String,
    amount: Decimal,
    paid_amount: Decimal,
    remaining_balance: Decimal,
    due_date: NaiveDate,
    status: InvoiceStatus,
    description: Option<String>,
    tenant_name: String,
    unit_number: String,
    property_name: String,
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoicesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = clamp_limit_in_range(query.limit, 1, 200);
    let offset = (page - 1) * limit;

    let rows = sqlx::query_as::<
        _,
        (
            Uuid,
            Uuid,
            String,
            Decimal,
            Decimal,
            NaiveDate,
            InvoiceStatus,
            Option<String>,
            String,
            String,
            String,
        ),
    >(
        "SELECT i.id, i.lease_id, i.invoice_number, i.amount, i.paid_amount, i.due_date,
                i.status, i.description, t.full_name, u.unit_number, p.name
         FROM invoices i
         JOIN leases l ON l.id = i.lease_id
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
           AND ($2::invoice_status IS NULL OR i.status = $2)
           AND ($3::uuid IS NULL OR i.lease_id = $3)
         ORDER BY i.due_date DESC
         LIMIT $4 OFFSET $5",
    )
    .bind(user_id)
    .bind(query.status)
    .bind(query.lease_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM invoices i
         JOIN leases l ON l.id = i.lease_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
           AND ($2::invoice_status IS NULL OR i.status = $2)
           AND ($3::uuid IS NULL OR i.lease_id = $3)",
    )
    .bind(user_id)
    .bind(query.status)
    .bind(query.lease_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    let invoices = rows
        .into_iter()
        .map(
            |(
                id,
                lease_id,
                invoice_number,
                amount,
                paid_amount,
                due_date,
                status,
                description,
                tenant_name,
                unit_number,
                property_name,
            )| InvoiceListItem {
                id,
                lease_id,
                invoice_number,
                amount,
                paid_amount,
                remaining_balance: amount - paid_amount,
                due_date,
                status,
                description,
                tenant_name,
                unit_number,
                property_name,
            },
        )
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "invoices": invoices,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInvoiceInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let invoice = ledger::issue_invoice(
        pool,
        user_id,
        payload.lease_id,
        payload.amount,
        payload.due_date,
        payload.description.as_deref(),
    )
    .await?;

    queue_invoice_notice(pool, &invoice).await;

    Ok((axum::http::StatusCode::CREATED, Json(invoice)))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let invoice = invoice_for_owner(pool, user_id, invoice_id).await?;
    let payments = ledger::payments_for_invoice(pool, user_id, invoice_id).await?;
    let remaining = invoice.remaining_balance();

    let today = Utc::now().date_naive();
    let days_overdue = invoice.days_overdue(today).max(0);

    Ok(Json(json!({
        "invoice": invoice,
        "remaining_balance": remaining,
        "days_overdue": days_overdue,
        "payments": payments,
    })))
}

async fn update_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateInvoiceInput>,
) -> AppResult<Json<Invoice>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let updated = ledger::update_invoice(
        pool,
        user_id,
        invoice_id,
        InvoiceChanges {
            amount: payload.amount,
            due_date: payload.due_date,
            description: payload.description,
            status: payload.status,
        },
    )
    .await?;

    Ok(Json(updated))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let invoice = ledger::cancel_invoice(pool, user_id, invoice_id).await?;

    Ok(Json(json!({
        "message": "Invoice cancelled.",
        "invoice": invoice,
    })))
}

async fn record_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let (payment, invoice) = ledger::record_payment(
        pool,
        user_id,
        user_id,
        invoice_id,
        NewPayment {
            amount: payload.amount,
            payment_date: payload.payment_date,
            method: payload.method,
            reference: payload.reference,
            notes: payload.notes,
        },
        today,
    )
    .await?;

    queue_payment_notice(pool, &invoice, payment.amount).await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "payment": payment,
            "invoice": invoice,
        })),
    ))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let payments = ledger::payments_for_invoice(pool, user_id, invoice_id).await?;
    Ok(Json(json!({ "data": payments })))
}

async fn get_overdue_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let invoices = overdue_invoices(pool, user_id, today).await?;

    Ok(Json(json!({ "data": invoices })))
}

async fn tenant_contact_for_lease(pool: &sqlx::PgPool, lease_id: Uuid) -> Option<(String, String)> {
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT t.full_name, t.email
         FROM leases l JOIN tenants t ON t.id = l.tenant_id
         WHERE l.id = $1",
    )
    .bind(lease_id)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten()?;
    match row {
        (name, Some(email)) => Some((name, email)),
        _ => None,
    }
}

async fn queue_invoice_notice(pool: &sqlx::PgPool, invoice: &Invoice) {
    let Some((tenant_name, recipient)) = tenant_contact_for_lease(pool, invoice.lease_id).await
    else {
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
        Some(invoice.lease_id),
        Some(invoice.id),
    )
    .await;
}

async fn queue_payment_notice(pool: &sqlx::PgPool, invoice: &Invoice, amount: Decimal) {
    let Some((tenant_name, recipient)) = tenant_contact_for_lease(pool, invoice.lease_id).await
    else {
        return;
    };
    notifier::enqueue(
        pool,
        &recipient,
        &NotificationEvent::PaymentConfirmed {
            tenant_name: &tenant_name,
            amount,
            invoice_number: &invoice.invoice_number,
        },
        Some(invoice.lease_id),
        Some(invoice.id),
    )
    .await;
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
