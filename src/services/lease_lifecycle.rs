//! Lease lifecycle state machine.
//!
//! Pending → Active → {Expired, Terminated}, with renewal as an
//! Active → Active self-loop that extends the end date. Every transition
//! that touches occupancy runs in one transaction holding the unit row
//! lock, so per-unit activation/termination is serialized and the
//! single-active-lease invariant holds under concurrent requests. The
//! store backs the same invariant with a partial unique index.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::period::{first_invoice_due_date, month_start};
use crate::models::{Invoice, Lease, LeaseStatus, Unit, UnitStatus};
use crate::services::ledger::insert_invoice_on_conn;
use crate::services::occupancy::{set_occupied, set_vacant};
use crate::services::ownership::{lease_for_owner, tenant_for_owner, unit_for_owner};

pub struct LeaseTerms {
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    pub security_deposit: Option<Decimal>,
    pub payment_day: i16,
    pub notes: Option<String>,
}

/// Create a lease as immediately active: occupy the unit and issue the
/// first invoice, all in one transaction.
pub async fn create_lease(
    pool: &PgPool,
    owner_id: Uuid,
    terms: LeaseTerms,
) -> AppResult<(Lease, Invoice)> {
    if terms.end_date < terms.start_date {
        return Err(AppError::Validation(
            "Lease end date must be on or after the start date.".to_string(),
        ));
    }
    if terms.monthly_rent <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Monthly rent must be positive.".to_string(),
        ));
    }
    if !(1..=28).contains(&terms.payment_day) {
        return Err(AppError::Validation(
            "Payment day must be between 1 and 28.".to_string(),
        ));
    }

    unit_for_owner(pool, owner_id, terms.unit_id).await?;
    tenant_for_owner(pool, owner_id, terms.tenant_id).await?;

    let mut tx = pool.begin().await.map_err(AppError::from_db)?;

    // Serialize lease activation per unit.
    let unit = sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE id = $1 FOR UPDATE")
        .bind(terms.unit_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from_db)?;

    if unit.status == UnitStatus::Occupied {
        return Err(AppError::Conflict(
            "The unit is already occupied.".to_string(),
        ));
    }
    if count_active_leases(&mut tx, terms.unit_id, None).await? > 0 {
        return Err(AppError::Conflict(
            "An active lease already exists for this unit.".to_string(),
        ));
    }

    let lease = sqlx::query_as::<_, Lease>(
        "INSERT INTO leases (unit_id, tenant_id, start_date, end_date, monthly_rent, security_deposit, payment_day, status, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(terms.unit_id)
    .bind(terms.tenant_id)
    .bind(terms.start_date)
    .bind(terms.end_date)
    .bind(terms.monthly_rent)
    .bind(terms.security_deposit)
    .bind(terms.payment_day)
    .bind(LeaseStatus::Active)
    .bind(terms.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_db)?;

    set_occupied(&mut tx, terms.unit_id).await?;

    let due_date = first_invoice_due_date(terms.start_date, terms.payment_day as u32);
    let description = format!("Monthly rent — {}", terms.start_date.format("%B %Y"));
    let invoice = insert_invoice_on_conn(
        &mut tx,
        lease.id,
        terms.monthly_rent,
        due_date,
        Some(month_start(due_date)),
        Some(&description),
    )
    .await?;

    tx.commit().await.map_err(AppError::from_db)?;
    Ok((lease, invoice))
}

/// Explicit status edit. Activation re-checks the single-active-lease
/// rule; leaving the active state rechecks occupancy.
pub async fn change_status(
    pool: &PgPool,
    owner_id: Uuid,
    lease_id: Uuid,
    new_status: LeaseStatus,
) -> AppResult<Lease> {
    let lease = lease_for_owner(pool, owner_id, lease_id).await?;
    if lease.status == new_status {
        return Ok(lease);
    }

    let mut tx = pool.begin().await.map_err(AppError::from_db)?;
    lock_unit(&mut tx, lease.unit_id).await?;

    if new_status == LeaseStatus::Active
        && count_active_leases(&mut tx, lease.unit_id, Some(lease_id)).await? > 0
    {
        return Err(AppError::Conflict(
            "Another active lease already exists for this unit.".to_string(),
        ));
    }

    let updated = set_lease_status(&mut tx, lease_id, new_status).await?;

    match new_status {
        LeaseStatus::Active => {
            set_occupied(&mut tx, lease.unit_id).await?;
        }
        LeaseStatus::Terminated | LeaseStatus::Expired => {
            set_vacant(&mut tx, lease.unit_id, Some(lease_id)).await?;
        }
        LeaseStatus::Pending => {}
    }

    tx.commit().await.map_err(AppError::from_db)?;
    Ok(updated)
}

/// Force-terminate a lease and vacate its unit (no other active lease can
/// exist for the unit, so termination always vacates).
pub async fn terminate(pool: &PgPool, owner_id: Uuid, lease_id: Uuid) -> AppResult<Lease> {
    let lease = lease_for_owner(pool, owner_id, lease_id).await?;

    let mut tx = pool.begin().await.map_err(AppError::from_db)?;
    lock_unit(&mut tx, lease.unit_id).await?;

    let updated = set_lease_status(&mut tx, lease_id, LeaseStatus::Terminated).await?;
    set_vacant(&mut tx, lease.unit_id, Some(lease_id)).await?;

    tx.commit().await.map_err(AppError::from_db)?;
    Ok(updated)
}

/// Extend a lease: push the end date forward, force the status back to
/// active, optionally update the rent. The lease is already the unit's
/// occupancy record, so no cross-lease re-validation happens here; the
/// store's unique index still rejects a second concurrent activation.
pub async fn renew(
    pool: &PgPool,
    owner_id: Uuid,
    lease_id: Uuid,
    new_end_date: NaiveDate,
    new_rent: Option<Decimal>,
) -> AppResult<Lease> {
    if let Some(rent) = new_rent {
        if rent <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Monthly rent must be positive.".to_string(),
            ));
        }
    }
    let lease = lease_for_owner(pool, owner_id, lease_id).await?;
    if new_end_date < lease.start_date {
        return Err(AppError::Validation(
            "The new end date must be on or after the lease start date.".to_string(),
        ));
    }

    let mut tx = pool.begin().await.map_err(AppError::from_db)?;
    lock_unit(&mut tx, lease.unit_id).await?;

    let updated = sqlx::query_as::<_, Lease>(
        "UPDATE leases
         SET end_date = $1,
             monthly_rent = COALESCE($2, monthly_rent),
             status = $3,
             updated_at = now()
         WHERE id = $4
         RETURNING *",
    )
    .bind(new_end_date)
    .bind(new_rent)
    .bind(LeaseStatus::Active)
    .bind(lease_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_db)?;

    set_occupied(&mut tx, lease.unit_id).await?;

    tx.commit().await.map_err(AppError::from_db)?;
    Ok(updated)
}

/// Scheduler path: transition an active lease whose end date has passed
/// to expired. Conditional on the current status, so repeated sweeps
/// cannot double-apply. Returns whether the transition happened.
pub async fn expire_lease(pool: &PgPool, lease_id: Uuid) -> AppResult<bool> {
    let mut tx = pool.begin().await.map_err(AppError::from_db)?;

    let unit_id = sqlx::query_scalar::<_, Uuid>("SELECT unit_id FROM leases WHERE id = $1")
        .bind(lease_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from_db)?;
    let Some(unit_id) = unit_id else {
        return Ok(false);
    };

    // Unit lock first, matching every other transition's lock order.
    lock_unit(&mut tx, unit_id).await?;

    let expired = sqlx::query(
        "UPDATE leases SET status = $1, updated_at = now()
         WHERE id = $2 AND status = $3",
    )
    .bind(LeaseStatus::Expired)
    .bind(lease_id)
    .bind(LeaseStatus::Active)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from_db)?;

    if expired.rows_affected() == 0 {
        return Ok(false);
    }

    set_vacant(&mut tx, unit_id, Some(lease_id)).await?;

    tx.commit().await.map_err(AppError::from_db)?;
    Ok(true)
}

async fn lock_unit(conn: &mut PgConnection, unit_id: Uuid) -> AppResult<()> {
    sqlx::query("SELECT id FROM units WHERE id = $1 FOR UPDATE")
        .bind(unit_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::from_db)?;
    Ok(())
}

async fn count_active_leases(
    conn: &mut PgConnection,
    unit_id: Uuid,
    excluding_lease: Option<Uuid>,
) -> AppResult<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM leases
         WHERE unit_id = $1 AND status = $2 AND ($3::uuid IS NULL OR id <> $3)",
    )
    .bind(unit_id)
    .bind(LeaseStatus::Active)
    .bind(excluding_lease)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from_db)
}

async fn set_lease_status(
    conn: &mut PgConnection,
    lease_id: Uuid,
    status: LeaseStatus,
) -> AppResult<Lease> {
    sqlx::query_as::<_, Lease>(
        "UPDATE leases SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(lease_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from_db)
}
