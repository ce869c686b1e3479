//! Recurring billing sweeps.
//!
//! Each sweep is idempotent: generation is keyed by the
//! `(lease_id, period_start)` uniqueness constraint, reclassification and
//! expiry are conditional updates. A failure on one record is logged and
//! the sweep moves on.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::Lease;
use crate::services::ledger::{generate_period_invoice, mark_overdue};
use crate::services::lease_lifecycle::expire_lease;
use crate::services::notifier::{self, NotificationEvent};

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BillingSweepResult {
    pub invoices_generated: u32,
    pub invoices_marked_overdue: u32,
    pub leases_expired: u32,
    pub errors: u32,
}

/// Run the daily billing sweep for the given calendar day. Safe to run
/// more than once per day.
pub async fn run_billing_sweep(pool: &PgPool, today: NaiveDate) -> BillingSweepResult {
    let mut result = BillingSweepResult::default();

    generate_due_invoices(pool, today, &mut result).await;
    reclassify_overdue_invoices(pool, today, &mut result).await;
    expire_ended_leases(pool, today, &mut result).await;

    info!(
        generated = result.invoices_generated,
        overdue = result.invoices_marked_overdue,
        expired = result.leases_expired,
        errors = result.errors,
        "Billing sweep completed"
    );

    result
}

/// Materialize this month's rent invoice for every active lease whose
/// payment day is today and whose term has not ended.
async fn generate_due_invoices(pool: &PgPool, today: NaiveDate, result: &mut BillingSweepResult) {
    let leases = match sqlx::query_as::<_, Lease>(
        "SELECT * FROM leases
         WHERE status = 'active' AND payment_day = $1 AND end_date >= $2",
    )
    .bind(today.day() as i16)
    .bind(today)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to fetch leases due for billing: {e}");
            result.errors += 1;
            return;
        }
    };

    for lease in leases {
        match generate_period_invoice(pool, &lease, today).await {
            Ok(Some(invoice)) => {
                result.invoices_generated += 1;
                queue_invoice_issued_notice(pool, &lease, invoice.amount, invoice.due_date).await;
            }
            Ok(None) => {} // already billed for this period
            Err(e) => {
                warn!(lease_id = %lease.id, "Failed to generate invoice: {e}");
                result.errors += 1;
            }
        }
    }
}

/// Pending → Overdue for every invoice past its due date.
async fn reclassify_overdue_invoices(
    pool: &PgPool,
    today: NaiveDate,
    result: &mut BillingSweepResult,
) {
    let rows = match sqlx::query_as::<_, (Uuid, Uuid, Decimal, Decimal, NaiveDate)>(
        "SELECT i.id, i.lease_id, i.amount, i.paid_amount, i.due_date
         FROM invoices i
         WHERE i.status = 'pending' AND i.due_date < $1",
    )
    .bind(today)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to fetch past-due invoices: {e}");
            result.errors += 1;
            return;
        }
    };

    for (invoice_id, lease_id, amount, paid_amount, due_date) in rows {
        match mark_overdue(pool, invoice_id, today).await {
            Ok(true) => {
                result.invoices_marked_overdue += 1;
                let remaining = amount - paid_amount;
                let days_overdue = (today - due_date).num_days();
                queue_overdue_notice(pool, lease_id, invoice_id, remaining, days_overdue).await;
            }
            Ok(false) => {} // lost the race to another sweep; nothing to do
            Err(e) => {
                warn!(invoice_id = %invoice_id, "Failed to mark invoice overdue: {e}");
                result.errors += 1;
            }
        }
    }
}

/// Active → Expired for every lease whose end date has passed; cascades
/// the occupancy update through the lifecycle.
async fn expire_ended_leases(pool: &PgPool, today: NaiveDate, result: &mut BillingSweepResult) {
    let lease_ids = match sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM leases WHERE status = 'active' AND end_date < $1",
    )
    .bind(today)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to fetch ended leases: {e}");
            result.errors += 1;
            return;
        }
    };

    for lease_id in lease_ids {
        match expire_lease(pool, lease_id).await {
            Ok(true) => result.leases_expired += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(lease_id = %lease_id, "Failed to expire lease: {e}");
                result.errors += 1;
            }
        }
    }
}

async fn queue_invoice_issued_notice(
    pool: &PgPool,
    lease: &Lease,
    amount: Decimal,
    due_date: NaiveDate,
) {
    let Some((tenant_name, recipient)) = tenant_contact(pool, lease.tenant_id).await else {
        return;
    };
    notifier::enqueue(
        pool,
        &recipient,
        &NotificationEvent::InvoiceIssued {
            tenant_name: &tenant_name,
            amount,
            due_date,
        },
        Some(lease.id),
        None,
    )
    .await;
}

async fn queue_overdue_notice(
    pool: &PgPool,
    lease_id: Uuid,
    invoice_id: Uuid,
    remaining: Decimal,
    days_overdue: i64,
) {
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT t.full_name, t.email
         FROM leases l JOIN tenants t ON t.id = l.tenant_id
         WHERE l.id = $1",
    )
    .bind(lease_id)
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
        &NotificationEvent::InvoiceOverdue {
            tenant_name: &tenant_name,
            remaining,
            days_overdue,
        },
        Some(lease_id),
        Some(invoice_id),
    )
    .await;
}

async fn tenant_contact(pool: &PgPool, tenant_id: Uuid) -> Option<(String, String)> {
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT full_name, email FROM tenants WHERE id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten()?;
    match row {
        (name, Some(email)) => Some((name, email)),
        _ => None,
    }
}
