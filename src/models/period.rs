//! Calendar arithmetic for billing periods and due dates.

#![allow(dead_code)]

use chrono::{Datelike, Months, NaiveDate};

/// Due date of a lease's first invoice: the `payment_day` of the start
/// month, or the start date itself when that day has already passed.
pub fn first_invoice_due_date(start_date: NaiveDate, payment_day: u32) -> NaiveDate {
    // payment_day is constrained to 1–28, so every month has it.
    let candidate = NaiveDate::from_ymd_opt(start_date.year(), start_date.month(), payment_day)
        .unwrap_or(start_date);
    if candidate < start_date {
        start_date
    } else {
        candidate
    }
}

/// First day of the month containing `date`; the identity of a billing
/// period.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Half-open [start, end) bounds of a calendar month, or `None` for an
/// invalid year/month pair.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?;
    Some((start, end))
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

pub fn subtract_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::{add_months, first_invoice_due_date, month_bounds, month_start};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn first_due_date_uses_payment_day_when_still_ahead() {
        assert_eq!(
            first_invoice_due_date(date(2025, 1, 1), 5),
            date(2025, 1, 5)
        );
    }

    #[test]
    fn first_due_date_falls_back_to_start_when_day_passed() {
        assert_eq!(
            first_invoice_due_date(date(2025, 1, 10), 5),
            date(2025, 1, 10)
        );
    }

    #[test]
    fn first_due_date_on_the_payment_day_itself() {
        assert_eq!(
            first_invoice_due_date(date(2025, 1, 5), 5),
            date(2025, 1, 5)
        );
    }

    #[test]
    fn month_bounds_are_half_open() {
        let (start, end) = month_bounds(2025, 1).expect("valid month");
        assert_eq!(start, date(2025, 1, 1));
        assert_eq!(end, date(2025, 2, 1));

        let (start, end) = month_bounds(2024, 12).expect("valid month");
        assert_eq!(start, date(2024, 12, 1));
        assert_eq!(end, date(2025, 1, 1));
    }

    #[test]
    fn month_start_truncates() {
        assert_eq!(month_start(date(2025, 3, 17)), date(2025, 3, 1));
    }

    #[test]
    fn add_months_clamps_end_of_month() {
        assert_eq!(add_months(date(2025, 1, 31), 1), date(2025, 2, 28));
        assert_eq!(add_months(date(2025, 11, 30), 3), date(2026, 2, 28));
    }
}
