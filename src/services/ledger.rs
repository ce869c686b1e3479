//! Invoice ledger: issuing invoices, applying payments, deriving status.
//!
//! Payment application is serialized per invoice with a row lock so two
//! concurrent payments can never both pass the overpayment check against a
//! stale `paid_amount`.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::period::month_start;
use crate::models::{Invoice, InvoiceStatus, Lease, Payment, PaymentMethod};
use crate::services::ownership::{invoice_for_owner, lease_for_owner};

/// Opaque unique invoice token. Uniqueness is enforced by the database
/// constraint, not by generation; collisions are retried once.
fn new_invoice_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("INV-{millis}-{suffix}")
}

fn is_token_collision(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_error) = error {
        return db_error.is_unique_violation()
            && db_error.constraint() == Some("invoices_invoice_number_key");
    }
    false
}

/// Insert an invoice inside the caller's transaction/connection, retrying
/// once with a fresh token on a token collision.
pub(crate) async fn insert_invoice_on_conn(
    conn: &mut PgConnection,
    lease_id: Uuid,
    amount: Decimal,
    due_date: NaiveDate,
    period_start: Option<NaiveDate>,
    description: Option<&str>,
) -> AppResult<Invoice> {
    for attempt in 0..2 {
        let result = sqlx::query_as::<_, Invoice>(
            "INSERT INTO invoices (lease_id, invoice_number, amount, paid_amount, due_date, period_start, status, description)
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(lease_id)
        .bind(new_invoice_number())
        .bind(amount)
        .bind(due_date)
        .bind(period_start)
        .bind(InvoiceStatus::Pending)
        .bind(description)
        .fetch_one(&mut *conn)
        .await;

        match result {
            Ok(invoice) => return Ok(invoice),
            Err(error) if attempt == 0 && is_token_collision(&error) => {
                tracing::warn!(lease_id = %lease_id, "Invoice token collision, retrying");
                continue;
            }
            Err(error) => return Err(AppError::from_db(error)),
        }
    }
    Err(AppError::Conflict(
        "Could not allocate a unique invoice number.".to_string(),
    ))
}

/// Manually issue an invoice against an owned lease.
pub async fn issue_invoice(
    pool: &PgPool,
    owner_id: Uuid,
    lease_id: Uuid,
    amount: Decimal,
    due_date: NaiveDate,
    description: Option<&str>,
) -> AppResult<Invoice> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Invoice amount must be positive.".to_string(),
        ));
    }
    lease_for_owner(pool, owner_id, lease_id).await?;

    let mut conn = pool.acquire().await.map_err(AppError::from_db)?;
    insert_invoice_on_conn(&mut conn, lease_id, amount, due_date, None, description).await
}

/// Materialize the recurring invoice for the billing period containing
/// `today`. Returns `None` when that period is already billed; the
/// `(lease_id, period_start)` uniqueness constraint makes this idempotent
/// even across concurrent sweeps.
pub async fn generate_period_invoice(
    pool: &PgPool,
    lease: &Lease,
    today: NaiveDate,
) -> AppResult<Option<Invoice>> {
    let period_start = month_start(today);
    let description = format!("Monthly rent — {}", today.format("%B %Y"));

    for attempt in 0..2 {
        let result = sqlx::query_as::<_, Invoice>(
            "INSERT INTO invoices (lease_id, invoice_number, amount, paid_amount, due_date, period_start, status, description)
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7)
             ON CONFLICT (lease_id, period_start) WHERE period_start IS NOT NULL DO NOTHING
             RETURNING *",
        )
        .bind(lease.id)
        .bind(new_invoice_number())
        .bind(lease.monthly_rent)
        .bind(today)
        .bind(period_start)
        .bind(InvoiceStatus::Pending)
        .bind(&description)
        .fetch_optional(pool)
        .await;

        match result {
            Ok(invoice) => return Ok(invoice),
            Err(error) if attempt == 0 && is_token_collision(&error) => {
                tracing::warn!(lease_id = %lease.id, "Invoice token collision, retrying");
                continue;
            }
            Err(error) => return Err(AppError::from_db(error)),
        }
    }
    Err(AppError::Conflict(
        "Could not allocate a unique invoice number.".to_string(),
    ))
}

pub struct InvoiceChanges {
    pub amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub status: Option<InvoiceStatus>,
}

/// Apply an authorized edit. Cancelled invoices reject every change. An
/// amount change recomputes the status; otherwise an explicit `status` is
/// taken verbatim as a manual override.
pub async fn update_invoice(
    pool: &PgPool,
    owner_id: Uuid,
    invoice_id: Uuid,
    changes: InvoiceChanges,
) -> AppResult<Invoice> {
    let invoice = invoice_for_owner(pool, owner_id, invoice_id).await?;
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(AppError::Conflict(
            "Cancelled invoices cannot be modified.".to_string(),
        ));
    }

    let amount = match changes.amount {
        Some(value) if value <= Decimal::ZERO => {
            return Err(AppError::Validation(
                "Invoice amount must be positive.".to_string(),
            ));
        }
        Some(value) => value,
        None => invoice.amount,
    };

    let status = if changes.amount.is_some() {
        InvoiceStatus::after_amount_edit(amount, invoice.paid_amount)
    } else {
        changes.status.unwrap_or(invoice.status)
    };

    sqlx::query_as::<_, Invoice>(
        "UPDATE invoices
         SET amount = $1,
             due_date = $2,
             description = COALESCE($3, description),
             status = $4,
             updated_at = now()
         WHERE id = $5
         RETURNING *",
    )
    .bind(amount)
    .bind(changes.due_date.unwrap_or(invoice.due_date))
    .bind(changes.description)
    .bind(status)
    .bind(invoice_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)
}

/// Cancel an invoice that has no recorded payments. Terminal: a cancelled
/// invoice accepts no further payments or automatic status changes.
pub async fn cancel_invoice(pool: &PgPool, owner_id: Uuid, invoice_id: Uuid) -> AppResult<Invoice> {
    let invoice = invoice_for_owner(pool, owner_id, invoice_id).await?;
    if invoice.status == InvoiceStatus::Cancelled {
        return Ok(invoice);
    }
    if invoice.paid_amount > Decimal::ZERO {
        return Err(AppError::Conflict(
            "An invoice with recorded payments cannot be cancelled.".to_string(),
        ));
    }

    sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(InvoiceStatus::Cancelled)
    .bind(invoice_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)
}

pub struct NewPayment {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Record a payment against an owned invoice.
///
/// The invoice row is locked for the duration of the transaction, so the
/// overpayment check and the paid-amount increment are atomic per invoice.
pub async fn record_payment(
    pool: &PgPool,
    owner_id: Uuid,
    recorder_id: Uuid,
    invoice_id: Uuid,
    payment: NewPayment,
    today: NaiveDate,
) -> AppResult<(Payment, Invoice)> {
    if payment.amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Payment amount must be positive.".to_string(),
        ));
    }
    invoice_for_owner(pool, owner_id, invoice_id).await?;

    let mut tx = pool.begin().await.map_err(AppError::from_db)?;

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from_db)?;

    match invoice.status {
        InvoiceStatus::Cancelled => {
            return Err(AppError::Conflict(
                "Payments cannot be recorded on a cancelled invoice.".to_string(),
            ));
        }
        InvoiceStatus::Paid => {
            return Err(AppError::Conflict(
                "The invoice is already fully paid.".to_string(),
            ));
        }
        _ => {}
    }

    let remaining = invoice.remaining_balance();
    if payment.amount > remaining {
        return Err(AppError::Conflict(format!(
            "Payment exceeds the remaining balance of {remaining}."
        )));
    }

    let created = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (invoice_id, amount, payment_date, method, reference, notes, recorded_by_user_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(invoice_id)
    .bind(payment.amount)
    .bind(payment.payment_date)
    .bind(payment.method)
    .bind(payment.reference)
    .bind(payment.notes)
    .bind(recorder_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_db)?;

    let new_paid = invoice.paid_amount + payment.amount;
    let new_status = InvoiceStatus::derive(invoice.amount, new_paid, invoice.due_date, today);

    let updated = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET paid_amount = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
    )
    .bind(new_paid)
    .bind(new_status)
    .bind(invoice_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_db)?;

    tx.commit().await.map_err(AppError::from_db)?;
    Ok((created, updated))
}

/// Pending → Overdue once the due date has passed. Conditional update:
/// partial, paid, and cancelled invoices are never touched, and repeated
/// runs are no-ops.
pub async fn mark_overdue(pool: &PgPool, invoice_id: Uuid, today: NaiveDate) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, updated_at = now()
         WHERE id = $2 AND status = $3 AND due_date < $4",
    )
    .bind(InvoiceStatus::Overdue)
    .bind(invoice_id)
    .bind(InvoiceStatus::Pending)
    .bind(today)
    .execute(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(result.rows_affected() > 0)
}

pub async fn payments_for_invoice(
    pool: &PgPool,
    owner_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<Vec<Payment>> {
    invoice_for_owner(pool, owner_id, invoice_id).await?;
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY payment_date DESC, created_at DESC",
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)
}

#[cfg(test)]
mod tests {
    use super::new_invoice_number;

    #[test]
    fn invoice_numbers_have_token_shape() {
        let token = new_invoice_number();
        let parts = token.split('-').collect::<Vec<_>>();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn invoice_numbers_differ_across_calls() {
        assert_ne!(new_invoice_number(), new_invoice_number());
    }
}
