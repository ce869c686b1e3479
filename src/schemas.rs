use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{ExpenseCategory, InvoiceStatus, LeaseStatus, PaymentMethod, UnitStatus};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::Validation(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(max.min(100)).clamp(min, max)
}

fn default_payment_day() -> i16 {
    1
}
fn default_expense_category() -> ExpenseCategory {
    ExpenseCategory::Other
}

// ── Properties ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

// ── Units ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUnitInput {
    pub property_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub unit_number: String,
    pub floor: Option<i32>,
    pub bedrooms: Option<i16>,
    pub area: Option<Decimal>,
    pub market_rent: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUnitInput {
    #[validate(length(min = 1, max = 50))]
    pub unit_number: Option<String>,
    pub floor: Option<i32>,
    pub bedrooms: Option<i16>,
    pub area: Option<Decimal>,
    pub market_rent: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitStatusInput {
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitsQuery {
    pub property_id: Option<Uuid>,
    pub limit: Option<i64>,
}

// ── Tenants ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

// ── Leases ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeaseInput {
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    pub security_deposit: Option<Decimal>,
    #[validate(range(min = 1, max = 28))]
    #[serde(default = "default_payment_day")]
    pub payment_day: i16,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateLeaseInput {
    pub status: Option<LeaseStatus>,
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Option<Decimal>,
    #[validate(range(min = 1, max = 28))]
    pub payment_day: Option<i16>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenewLeaseInput {
    pub new_end_date: NaiveDate,
    pub new_rent: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeasesQuery {
    pub status: Option<LeaseStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiringLeasesQuery {
    pub days: Option<i64>,
}

// ── Invoices & payments ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceInput {
    pub lease_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInvoiceInput {
    pub amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
    /// Manual override escape hatch; ignored when `amount` is supplied.
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentInput {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<InvoiceStatus>,
    pub lease_id: Option<Uuid>,
}

// ── Expenses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExpenseInput {
    pub property_id: Uuid,
    #[serde(default = "default_expense_category")]
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateExpenseInput {
    pub category: Option<ExpenseCategory>,
    pub amount: Option<Decimal>,
    pub expense_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpensesQuery {
    pub property_id: Option<Uuid>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub limit: Option<i64>,
}

// ── Dashboard ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopPropertiesQuery {
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::{clamp_limit_in_range, validate_input, CreateLeaseInput};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 100);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(9000), 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(25), 1, 500), 25);
    }

    #[test]
    fn rejects_payment_day_outside_calendar_safe_range() {
        let input = CreateLeaseInput {
            unit_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            monthly_rent: dec!(1000),
            security_deposit: None,
            payment_day: 29,
            notes: None,
        };
        assert!(validate_input(&input).is_err());

        let input = CreateLeaseInput {
            payment_day: 28,
            ..input
        };
        assert!(validate_input(&input).is_ok());
    }
}
