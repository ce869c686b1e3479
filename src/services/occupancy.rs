//! Unit occupancy tracker.
//!
//! These two functions are the only code that writes a unit's `status`
//! column. Both take a `&mut PgConnection` so they always execute inside
//! the caller's transaction, keeping the lease-status change and the
//! occupancy update atomic.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{LeaseStatus, UnitStatus};

pub async fn set_occupied(conn: &mut PgConnection, unit_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE units SET status = $1, updated_at = now() WHERE id = $2")
        .bind(UnitStatus::Occupied)
        .bind(unit_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from_db)?;
    Ok(())
}

/// Vacate a unit unless another active lease still references it.
/// `excluding_lease` is the lease whose exit triggered the recheck.
/// Returns whether the unit actually became vacant.
pub async fn set_vacant(
    conn: &mut PgConnection,
    unit_id: Uuid,
    excluding_lease: Option<Uuid>,
) -> AppResult<bool> {
    let remaining_active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leases
         WHERE unit_id = $1 AND status = $2 AND ($3::uuid IS NULL OR id <> $3)",
    )
    .bind(unit_id)
    .bind(LeaseStatus::Active)
    .bind(excluding_lease)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from_db)?;

    if remaining_active > 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE units SET status = $1, updated_at = now() WHERE id = $2")
        .bind(UnitStatus::Vacant)
        .bind(unit_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from_db)?;
    Ok(true)
}
