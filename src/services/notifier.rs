//! Best-effort notification sender.
//!
//! Business operations only *enqueue* rows into the `notification_logs`
//! outbox; the scheduler drains it and delivers by email. A delivery
//! failure never rolls back the operation that triggered it.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{NotificationLog, NotificationStatus};

const MAX_DELIVERY_ATTEMPTS: i16 = 3;
const EMAIL_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug)]
pub enum NotificationEvent<'a> {
    InvoiceIssued {
        tenant_name: &'a str,
        amount: Decimal,
        due_date: NaiveDate,
    },
    PaymentConfirmed {
        tenant_name: &'a str,
        amount: Decimal,
        invoice_number: &'a str,
    },
    InvoiceOverdue {
        tenant_name: &'a str,
        remaining: Decimal,
        days_overdue: i64,
    },
    LeaseExpiring {
        tenant_name: &'a str,
        end_date: NaiveDate,
        days_remaining: i64,
    },
}

impl NotificationEvent<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvoiceIssued { .. } => "invoice_issued",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
            Self::InvoiceOverdue { .. } => "invoice_overdue",
            Self::LeaseExpiring { .. } => "lease_expiring",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::InvoiceIssued { .. } => "A new invoice has been issued".to_string(),
            Self::PaymentConfirmed { .. } => "Payment received".to_string(),
            Self::InvoiceOverdue { .. } => "Reminder: invoice overdue".to_string(),
            Self::LeaseExpiring { .. } => "Your lease is approaching its end date".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::InvoiceIssued {
                tenant_name,
                amount,
                due_date,
            } => format!(
                "Hello {tenant_name},\n\nA new rent invoice of {amount} has been issued. \
                 It is due on {due_date}.\n\nPlease arrange payment before the due date."
            ),
            Self::PaymentConfirmed {
                tenant_name,
                amount,
                invoice_number,
            } => format!(
                "Hello {tenant_name},\n\nWe received your payment of {amount} against \
                 invoice {invoice_number}. Thank you."
            ),
            Self::InvoiceOverdue {
                tenant_name,
                remaining,
                days_overdue,
            } => format!(
                "Hello {tenant_name},\n\nYour invoice is {days_overdue} day(s) overdue with \
                 {remaining} outstanding. Please settle the balance as soon as possible."
            ),
            Self::LeaseExpiring {
                tenant_name,
                end_date,
                days_remaining,
            } => format!(
                "Hello {tenant_name},\n\nYour lease ends on {end_date} — {days_remaining} \
                 day(s) from now. Contact your property manager to discuss a renewal."
            ),
        }
    }
}

/// Queue a notification. Errors are logged and swallowed: the outbox is
/// advisory and must never fail the triggering business operation.
pub async fn enqueue(
    pool: &PgPool,
    recipient: &str,
    event: &NotificationEvent<'_>,
    lease_id: Option<Uuid>,
    invoice_id: Option<Uuid>,
) {
    let result = sqlx::query(
        "INSERT INTO notification_logs (recipient, event_kind, subject, body, status, lease_id, invoice_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(recipient)
    .bind(event.kind())
    .bind(event.subject())
    .bind(event.body())
    .bind(NotificationStatus::Queued)
    .bind(lease_id)
    .bind(invoice_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(event = event.kind(), "Failed to queue notification: {e}");
    }
}

/// Deliver queued notifications (and retry failed ones up to the attempt
/// cap). Returns (sent, failed).
pub async fn drain_outbox(
    pool: &PgPool,
    http_client: &reqwest::Client,
    config: &AppConfig,
) -> (u32, u32) {
    if config.resend_api_key.is_none() {
        debug!("Notifier: no email API key configured, outbox left queued");
        return (0, 0);
    }

    let pending = match sqlx::query_as::<_, NotificationLog>(
        "SELECT * FROM notification_logs
         WHERE status = $1 OR (status = $2 AND retry_count < $3)
         ORDER BY created_at ASC
         LIMIT 100",
    )
    .bind(NotificationStatus::Queued)
    .bind(NotificationStatus::Failed)
    .bind(MAX_DELIVERY_ATTEMPTS)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Notifier: failed to fetch outbox: {e}");
            return (0, 0);
        }
    };

    let mut sent = 0u32;
    let mut failed = 0u32;

    for entry in pending {
        match deliver(http_client, config, &entry).await {
            Ok(()) => {
                sent += 1;
                let _ = sqlx::query(
                    "UPDATE notification_logs SET status = $1, updated_at = now() WHERE id = $2",
                )
                .bind(NotificationStatus::Sent)
                .bind(entry.id)
                .execute(pool)
                .await;
            }
            Err(reason) => {
                failed += 1;
                warn!(notification_id = %entry.id, reason, "Notifier: delivery failed");
                let _ = sqlx::query(
                    "UPDATE notification_logs
                     SET status = $1, retry_count = retry_count + 1, updated_at = now()
                     WHERE id = $2",
                )
                .bind(NotificationStatus::Failed)
                .bind(entry.id)
                .execute(pool)
                .await;
            }
        }
    }

    (sent, failed)
}

async fn deliver(
    http_client: &reqwest::Client,
    config: &AppConfig,
    entry: &NotificationLog,
) -> Result<(), String> {
    let api_key = config
        .resend_api_key
        .as_deref()
        .ok_or_else(|| "email API key is not configured".to_string())?;

    let payload = serde_json::json!({
        "from": config.email_from_address,
        "to": [entry.recipient],
        "subject": entry.subject,
        "text": entry.body,
    });

    let response = http_client
        .post(EMAIL_API_URL)
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|e| format!("email request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("email API returned {}", response.status()));
    }
    Ok(())
}

/// Queue an expiry notice for every active lease ending exactly
/// `notice_days` from today. Running once per day means each lease is
/// noticed once.
pub async fn queue_lease_expiry_notices(
    pool: &PgPool,
    today: NaiveDate,
    notice_days: i64,
) -> u32 {
    let target = today + Duration::days(notice_days);

    let rows = match sqlx::query_as::<_, (Uuid, NaiveDate, String, Option<String>)>(
        "SELECT l.id, l.end_date, t.full_name, t.email
         FROM leases l
         JOIN tenants t ON t.id = l.tenant_id
         WHERE l.status = 'active' AND l.end_date = $1",
    )
    .bind(target)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Notifier: failed to fetch expiring leases: {e}");
            return 0;
        }
    };

    let mut queued = 0u32;
    for (lease_id, end_date, tenant_name, email) in rows {
        let Some(recipient) = email else { continue };
        enqueue(
            pool,
            &recipient,
            &NotificationEvent::LeaseExpiring {
                tenant_name: &tenant_name,
                end_date,
                days_remaining: notice_days,
            },
            Some(lease_id),
            None,
        )
        .await;
        queued += 1;
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::NotificationEvent;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn events_render_subject_and_body() {
        let event = NotificationEvent::InvoiceIssued {
            tenant_name: "Sara",
            amount: dec!(1000),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        };
        assert_eq!(event.kind(), "invoice_issued");
        assert!(event.body().contains("Sara"));
        assert!(event.body().contains("1000"));
        assert!(event.body().contains("2025-01-05"));

        let overdue = NotificationEvent::InvoiceOverdue {
            tenant_name: "Omar",
            remaining: dec!(400),
            days_overdue: 7,
        };
        assert_eq!(overdue.kind(), "invoice_overdue");
        assert!(overdue.body().contains("7 day(s)"));
        assert!(overdue.body().contains("400"));
    }
}
