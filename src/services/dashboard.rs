//! Read-only dashboard rollups over the ledger and lifecycle state.
//!
//! Every query joins up to the owning user, so records that fail the
//! ownership join are silently excluded rather than erroring.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::period::{month_bounds, month_start, subtract_months};
use crate::models::{ExpenseCategory, InvoiceStatus};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardOverview {
    pub total_properties: i64,
    pub total_units: i64,
    pub occupied_units: i64,
    pub vacant_units: i64,
    pub occupancy_rate: f64,
    pub active_leases: i64,
}

pub async fn overview(pool: &PgPool, owner_id: Uuid) -> AppResult<DashboardOverview> {
    let total_properties: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM properties WHERE owner_user_id = $1 AND is_active",
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    let (total_units, occupied_units, vacant_units): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COUNT(*) FILTER (WHERE u.status = 'occupied'),
                COUNT(*) FILTER (WHERE u.status = 'vacant')
         FROM units u
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1 AND u.is_active AND p.is_active",
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    let active_leases: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leases l
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE l.status = 'active' AND p.owner_user_id = $1",
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(DashboardOverview {
        total_properties,
        total_units,
        occupied_units,
        vacant_units,
        occupancy_rate: occupancy_rate_percent(occupied_units, total_units),
        active_leases,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialStats {
    pub year: i32,
    pub month: u32,
    pub expected_income: Decimal,
    pub collected_income: Decimal,
    pub pending_payments: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
    pub overdue_amount: Decimal,
    pub overdue_count: i64,
    pub collection_rate: f64,
}

/// Financial totals for one calendar month of invoices and expenses.
pub async fn financial_stats(
    pool: &PgPool,
    owner_id: Uuid,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> AppResult<FinancialStats> {
    let (period_start, period_end) = month_bounds(year, month)
        .ok_or_else(|| AppError::Validation("Invalid year/month period.".to_string()))?;

    let invoices = sqlx::query_as::<_, (Decimal, Decimal, InvoiceStatus, NaiveDate)>(
        "SELECT i.amount, i.paid_amount, i.status, i.due_date
         FROM invoices i
         JOIN leases l ON l.id = i.lease_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1 AND i.due_date >= $2 AND i.due_date < $3",
    )
    .bind(owner_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let mut expected_income = Decimal::ZERO;
    let mut collected_income = Decimal::ZERO;
    let mut overdue_amount = Decimal::ZERO;
    let mut overdue_count = 0i64;

    for (amount, paid_amount, status, due_date) in &invoices {
        expected_income += *amount;
        collected_income += *paid_amount;

        let past_due_pending = *status == InvoiceStatus::Pending && *due_date < today;
        if *status == InvoiceStatus::Overdue || past_due_pending {
            overdue_amount += *amount - *paid_amount;
            overdue_count += 1;
        }
    }

    let total_expenses: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(e.amount), 0)
         FROM expenses e
         JOIN properties p ON p.id = e.property_id
         WHERE p.owner_user_id = $1 AND e.expense_date >= $2 AND e.expense_date < $3",
    )
    .bind(owner_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(FinancialStats {
        year,
        month,
        expected_income,
        collected_income,
        pending_payments: expected_income - collected_income,
        total_expenses,
        net_income: collected_income - total_expenses,
        overdue_amount,
        overdue_count,
        collection_rate: ratio_percent(collected_income, expected_income),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRevenuePoint {
    pub month: String,
    pub income: Decimal,
    pub expenses: Decimal,
}

/// Collected income vs expenses over the last 12 months.
pub async fn monthly_revenue(
    pool: &PgPool,
    owner_id: Uuid,
    today: NaiveDate,
) -> AppResult<Vec<MonthlyRevenuePoint>> {
    let mut points = Vec::with_capacity(12);
    for months_back in (0..12).rev() {
        let period = subtract_months(month_start(today), months_back);
        let stats = financial_stats(pool, owner_id, period.year(), period.month(), today).await?;
        points.push(MonthlyRevenuePoint {
            month: format!("{}-{:02}", period.year(), period.month()),
            income: stats.collected_income,
            expenses: stats.total_expenses,
        });
    }
    Ok(points)
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyOccupancy {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub total_units: i64,
    pub occupied_units: i64,
    pub occupancy_rate: f64,
}

/// Properties ranked by occupancy rate.
pub async fn top_properties(
    pool: &PgPool,
    owner_id: Uuid,
    limit: i64,
) -> AppResult<Vec<PropertyOccupancy>> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, i64, i64)>(
        "SELECT p.id, p.name, p.city,
                COUNT(u.id) FILTER (WHERE u.is_active),
                COUNT(u.id) FILTER (WHERE u.is_active AND u.status = 'occupied')
         FROM properties p
         LEFT JOIN units u ON u.property_id = p.id
         WHERE p.owner_user_id = $1 AND p.is_active
         GROUP BY p.id, p.name, p.city",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let mut properties = rows
        .into_iter()
        .map(|(id, name, city, total_units, occupied_units)| PropertyOccupancy {
            id,
            name,
            city,
            total_units,
            occupied_units,
            occupancy_rate: occupancy_rate_percent(occupied_units, total_units),
        })
        .collect::<Vec<_>>();

    properties.sort_by(|left, right| {
        right
            .occupancy_rate
            .partial_cmp(&left.occupancy_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    properties.truncate(limit.max(0) as usize);
    Ok(properties)
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringLease {
    pub lease_id: Uuid,
    pub end_date: NaiveDate,
    pub days_remaining: i64,
    pub monthly_rent: Decimal,
    pub tenant_name: String,
    pub tenant_phone: Option<String>,
    pub unit_number: String,
    pub property_name: String,
}

/// Active leases ending within the next `days` days.
pub async fn expiring_leases(
    pool: &PgPool,
    owner_id: Uuid,
    days: i64,
    today: NaiveDate,
) -> AppResult<Vec<ExpiringLease>> {
    let horizon = today + chrono::Duration::days(days.max(0));

    let rows = sqlx::query_as::<_, (Uuid, NaiveDate, Decimal, String, Option<String>, String, String)>(
        "SELECT l.id, l.end_date, l.monthly_rent, t.full_name, t.phone, u.unit_number, p.name
         FROM leases l
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
           AND l.status = 'active'
           AND l.end_date >= $2 AND l.end_date <= $3
         ORDER BY l.end_date ASC",
    )
    .bind(owner_id)
    .bind(today)
    .bind(horizon)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(rows
        .into_iter()
        .map(
            |(lease_id, end_date, monthly_rent, tenant_name, tenant_phone, unit_number, property_name)| {
                ExpiringLease {
                    lease_id,
                    end_date,
                    days_remaining: (end_date - today).num_days(),
                    monthly_rent,
                    tenant_name,
                    tenant_phone,
                    unit_number,
                    property_name,
                }
            },
        )
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_balance: Decimal,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub status: InvoiceStatus,
    pub tenant_name: String,
    pub unit_number: String,
    pub property_name: String,
}

/// Invoices that are overdue, or past due while still pending/partial.
pub async fn overdue_invoices(
    pool: &PgPool,
    owner_id: Uuid,
    today: NaiveDate,
) -> AppResult<Vec<OverdueInvoice>> {
    let rows = sqlx::query_as::<
        _,
        (
            Uuid,
            String,
            Decimal,
            Decimal,
            NaiveDate,
            InvoiceStatus,
            String,
            String,
            String,
        ),
    >(
        "SELECT i.id, i.invoice_number, i.amount, i.paid_amount, i.due_date, i.status,
                t.full_name, u.unit_number, p.name
         FROM invoices i
         JOIN leases l ON l.id = i.lease_id
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
           AND (i.status = 'overdue'
                OR (i.status IN ('pending', 'partial') AND i.due_date < $2))
         ORDER BY i.due_date ASC",
    )
    .bind(owner_id)
    .bind(today)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(rows
        .into_iter()
        .map(
            |(invoice_id, invoice_number, amount, paid_amount, due_date, status, tenant_name, unit_number, property_name)| {
                OverdueInvoice {
                    invoice_id,
                    invoice_number,
                    amount,
                    paid_amount,
                    remaining_balance: amount - paid_amount,
                    due_date,
                    days_overdue: (today - due_date).num_days(),
                    status,
                    tenant_name,
                    unit_number,
                    property_name,
                }
            },
        )
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyRevenue {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub total_revenue: Decimal,
    pub collected_revenue: Decimal,
    pub outstanding_balance: Decimal,
}

/// Invoiced vs collected revenue per property for one calendar month.
pub async fn revenue_per_property(
    pool: &PgPool,
    owner_id: Uuid,
    year: i32,
    month: u32,
) -> AppResult<Vec<PropertyRevenue>> {
    let (period_start, period_end) = month_bounds(year, month)
        .ok_or_else(|| AppError::Validation("Invalid year/month period.".to_string()))?;

    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, Decimal, Decimal)>(
        "SELECT p.id, p.name, p.city,
                COALESCE(SUM(i.amount), 0),
                COALESCE(SUM(i.paid_amount), 0)
         FROM properties p
         LEFT JOIN units u ON u.property_id = p.id
         LEFT JOIN leases l ON l.unit_id = u.id
         LEFT JOIN invoices i
                ON i.lease_id = l.id AND i.due_date >= $2 AND i.due_date < $3
         WHERE p.owner_user_id = $1 AND p.is_active
         GROUP BY p.id, p.name, p.city
         ORDER BY p.name ASC",
    )
    .bind(owner_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(rows
        .into_iter()
        .map(|(id, name, city, total_revenue, collected_revenue)| PropertyRevenue {
            id,
            name,
            city,
            total_revenue,
            collected_revenue,
            outstanding_balance: total_revenue - collected_revenue,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpensesBreakdown {
    pub year: i32,
    pub month: u32,
    pub total: Decimal,
    pub count: i64,
    pub breakdown: Vec<CategoryBreakdown>,
}

/// Expense distribution by category for one calendar month.
pub async fn expenses_breakdown(
    pool: &PgPool,
    owner_id: Uuid,
    year: i32,
    month: u32,
) -> AppResult<ExpensesBreakdown> {
    let (period_start, period_end) = month_bounds(year, month)
        .ok_or_else(|| AppError::Validation("Invalid year/month period.".to_string()))?;

    let rows = sqlx::query_as::<_, (ExpenseCategory, Decimal, i64)>(
        "SELECT e.category, COALESCE(SUM(e.amount), 0), COUNT(*)
         FROM expenses e
         JOIN properties p ON p.id = e.property_id
         WHERE p.owner_user_id = $1 AND e.expense_date >= $2 AND e.expense_date < $3
         GROUP BY e.category",
    )
    .bind(owner_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let total: Decimal = rows.iter().map(|(_, amount, _)| *amount).sum();
    let count: i64 = rows.iter().map(|(_, _, n)| *n).sum();

    let mut breakdown = rows
        .into_iter()
        .map(|(category, amount, _)| CategoryBreakdown {
            category,
            amount,
            percentage: ratio_percent(amount, total),
        })
        .collect::<Vec<_>>();
    breakdown.sort_by(|left, right| right.amount.cmp(&left.amount));

    Ok(ExpensesBreakdown {
        year,
        month,
        total,
        count,
        breakdown,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub kind: &'static str,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    pub entity_id: Uuid,
}

/// The most recent lifecycle events across the portfolio: payments
/// recorded, expenses added, leases signed.
pub async fn recent_activity(
    pool: &PgPool,
    owner_id: Uuid,
    limit: i64,
) -> AppResult<Vec<ActivityEntry>> {
    let payments = sqlx::query_as::<_, (Uuid, Decimal, String, DateTime<Utc>)>(
        "SELECT pay.id, pay.amount, t.full_name, pay.created_at
         FROM payments pay
         JOIN invoices i ON i.id = pay.invoice_id
         JOIN leases l ON l.id = i.lease_id
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
         ORDER BY pay.created_at DESC
         LIMIT 5",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let expenses = sqlx::query_as::<_, (Uuid, ExpenseCategory, Decimal, DateTime<Utc>)>(
        "SELECT e.id, e.category, e.amount, e.created_at
         FROM expenses e
         JOIN properties p ON p.id = e.property_id
         WHERE p.owner_user_id = $1
         ORDER BY e.created_at DESC
         LIMIT 5",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let leases = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
        "SELECT l.id, t.full_name, u.unit_number, l.created_at
         FROM leases l
         JOIN tenants t ON t.id = l.tenant_id
         JOIN units u ON u.id = l.unit_id
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1
         ORDER BY l.created_at DESC
         LIMIT 5",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    let mut activities = Vec::new();
    for (id, amount, tenant_name, created_at) in payments {
        activities.push(ActivityEntry {
            kind: "payment",
            message: format!("Payment of {amount} received from {tenant_name}"),
            occurred_at: created_at,
            entity_id: id,
        });
    }
    for (id, category, amount, created_at) in expenses {
        activities.push(ActivityEntry {
            kind: "expense",
            message: format!("Expense recorded ({}): {amount}", category.as_str()),
            occurred_at: created_at,
            entity_id: id,
        });
    }
    for (id, tenant_name, unit_number, created_at) in leases {
        activities.push(ActivityEntry {
            kind: "lease",
            message: format!("New lease signed with {tenant_name} for unit {unit_number}"),
            occurred_at: created_at,
            entity_id: id,
        });
    }

    activities.sort_by(|left, right| right.occurred_at.cmp(&left.occurred_at));
    activities.truncate(limit.max(0) as usize);
    Ok(activities)
}

/// `occupied / total` as a percentage rounded to one decimal; zero when
/// there are no units.
fn occupancy_rate_percent(occupied: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round1(occupied as f64 / total as f64 * 100.0)
}

fn ratio_percent(part: Decimal, whole: Decimal) -> f64 {
    if whole <= Decimal::ZERO {
        return 0.0;
    }
    let part = part.to_f64().unwrap_or(0.0);
    let whole = whole.to_f64().unwrap_or(0.0);
    if whole == 0.0 {
        return 0.0;
    }
    round1(part / whole * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::{occupancy_rate_percent, ratio_percent};
    use rust_decimal_macros::dec;

    #[test]
    fn occupancy_rate_handles_empty_portfolio() {
        assert_eq!(occupancy_rate_percent(0, 0), 0.0);
        assert_eq!(occupancy_rate_percent(5, 0), 0.0);
    }

    #[test]
    fn occupancy_rate_rounds_to_one_decimal() {
        assert_eq!(occupancy_rate_percent(1, 3), 33.3);
        assert_eq!(occupancy_rate_percent(2, 3), 66.7);
        assert_eq!(occupancy_rate_percent(3, 3), 100.0);
    }

    #[test]
    fn collection_rate_guards_division_by_zero() {
        assert_eq!(ratio_percent(dec!(500), dec!(0)), 0.0);
        assert_eq!(ratio_percent(dec!(500), dec!(1000)), 50.0);
        assert_eq!(ratio_percent(dec!(1), dec!(3)), 33.3);
    }
}
