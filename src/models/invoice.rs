use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// Non-cancelled invoice status as a pure function of the ledger state.
    ///
    /// `Cancelled` is sticky and handled by the callers; it is never an
    /// output of derivation.
    pub fn derive(amount: Decimal, paid_amount: Decimal, due_date: NaiveDate, today: NaiveDate) -> Self {
        if paid_amount >= amount {
            Self::Paid
        } else if paid_amount > Decimal::ZERO {
            Self::Partial
        } else if due_date < today {
            Self::Overdue
        } else {
            Self::Pending
        }
    }

    /// Status after an authorized amount edit. Deliberately ignores the due
    /// date: a past-due unpaid invoice reverts to `Pending` and the next
    /// billing sweep reclassifies it.
    pub fn after_amount_edit(new_amount: Decimal, paid_amount: Decimal) -> Self {
        if paid_amount == Decimal::ZERO {
            Self::Pending
        } else if paid_amount >= new_amount {
            Self::Paid
        } else {
            Self::Partial
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub due_date: NaiveDate,
    /// First day of the billing month for recurring invoices; `None` for
    /// manually issued ones.
    pub period_start: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn remaining_balance(&self) -> Decimal {
        self.amount - self.paid_amount
    }

    /// Whole days past due; only meaningful when positive.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::InvoiceStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn unpaid_before_due_is_pending() {
        let status = InvoiceStatus::derive(
            dec!(1000),
            dec!(0),
            date(2025, 1, 5),
            date(2025, 1, 1),
        );
        assert_eq!(status, InvoiceStatus::Pending);
    }

    #[test]
    fn unpaid_on_due_date_is_still_pending() {
        let status = InvoiceStatus::derive(
            dec!(1000),
            dec!(0),
            date(2025, 1, 5),
            date(2025, 1, 5),
        );
        assert_eq!(status, InvoiceStatus::Pending);
    }

    #[test]
    fn unpaid_past_due_is_overdue() {
        let status = InvoiceStatus::derive(
            dec!(1000),
            dec!(0),
            date(2025, 1, 5),
            date(2025, 1, 6),
        );
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn partially_paid_is_partial_even_past_due() {
        let status = InvoiceStatus::derive(
            dec!(1000),
            dec!(600),
            date(2025, 1, 5),
            date(2025, 2, 1),
        );
        assert_eq!(status, InvoiceStatus::Partial);
    }

    #[test]
    fn fully_paid_is_paid() {
        let status = InvoiceStatus::derive(
            dec!(1000),
            dec!(1000),
            date(2025, 1, 5),
            date(2025, 1, 1),
        );
        assert_eq!(status, InvoiceStatus::Paid);
        let over = InvoiceStatus::derive(
            dec!(1000),
            dec!(1200),
            date(2025, 1, 5),
            date(2025, 1, 1),
        );
        assert_eq!(over, InvoiceStatus::Paid);
    }

    #[test]
    fn amount_edit_recomputes_three_way() {
        assert_eq!(
            InvoiceStatus::after_amount_edit(dec!(500), dec!(0)),
            InvoiceStatus::Pending
        );
        assert_eq!(
            InvoiceStatus::after_amount_edit(dec!(500), dec!(500)),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceStatus::after_amount_edit(dec!(500), dec!(600)),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceStatus::after_amount_edit(dec!(500), dec!(100)),
            InvoiceStatus::Partial
        );
    }
}
