//! Owner-scoped record lookups.
//!
//! Every fetch joins up to the owning user and reports a plain `NotFound`
//! on a miss, whether the record is absent or simply belongs to someone
//! else.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Expense, Invoice, Lease, Property, Tenant, Unit};

pub async fn property_for_owner(
    pool: &PgPool,
    owner_id: Uuid,
    property_id: Uuid,
) -> AppResult<Property> {
    sqlx::query_as::<_, Property>(
        "SELECT * FROM properties WHERE id = $1 AND owner_user_id = $2 AND is_active",
    )
    .bind(property_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Property not found.".to_string()))
}

pub async fn unit_for_owner(pool: &PgPool, owner_id: Uuid, unit_id: Uuid) -> AppResult<Unit> {
    sqlx::query_as::<_, Unit>(
        "SELECT u.* FROM units u
         JOIN properties p ON p.id = u.property_id
         WHERE u.id = $1 AND u.is_active AND p.is_active AND p.owner_user_id = $2",
    )
    .bind(unit_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Unit not found.".to_string()))
}

pub async fn tenant_for_owner(pool: &PgPool, owner_id: Uuid, tenant_id: Uuid) -> AppResult<Tenant> {
    sqlx::query_as::<_, Tenant>(
        "SELECT * FROM tenants WHERE id = $1 AND owner_user_id = $2 AND is_active",
    )
    .bind(tenant_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Tenant not found.".to_string()))
}

pub async fn lease_for_owner(pool: &PgPool, owner_id: Uuid, lease_id: Uuid) -> AppResult<Lease> {
    sqlx::query_as::<_, Lease>(
        "SELECT l.* FROM leases l
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE l.id = $1 AND p.owner_user_id = $2",
    )
    .bind(lease_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Lease not found.".to_string()))
}

pub async fn invoice_for_owner(
    pool: &PgPool,
    owner_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(
        "SELECT i.* FROM invoices i
         JOIN leases l ON l.id = i.lease_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE i.id = $1 AND p.owner_user_id = $2",
    )
    .bind(invoice_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))
}

pub async fn expense_for_owner(
    pool: &PgPool,
    owner_id: Uuid,
    expense_id: Uuid,
) -> AppResult<Expense> {
    sqlx::query_as::<_, Expense>(
        "SELECT e.* FROM expenses e
         JOIN properties p ON p.id = e.property_id
         WHERE e.id = $1 AND p.owner_user_id = $2",
    )
    .bind(expense_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Expense not found.".to_string()))
}
